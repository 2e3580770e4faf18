//! `topogap` binary
//!
//! See the crate documentation for commands and exit codes.

use clap::Parser;
use topogap_cli::{logging, run_cli, GapCli};

#[tokio::main]
async fn main() {
    let cli = GapCli::parse();
    logging::init(cli.verbose, cli.quiet, cli.log_format);

    let exit_code = run_cli(cli).await;
    std::process::exit(exit_code.into());
}
