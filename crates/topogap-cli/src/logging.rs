//! Log subscriber setup
//!
//! Logs go to stderr so JSON and YAML reports on stdout stay parseable.
//! `RUST_LOG` directives are honored on top of the verbosity flags.

use clap::ValueEnum;
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Level selected by `-v` count and `--quiet`
pub fn level(verbose: u8, quiet: bool) -> Level {
    if quiet {
        return Level::ERROR;
    }
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Install the global subscriber; a second call is a no-op
pub fn init(verbose: u8, quiet: bool, format: LogFormat) {
    let filter = EnvFilter::from_default_env().add_directive(level(verbose, quiet).into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let installed = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = installed {
        eprintln!("Logging already initialized: {}", e);
    }
}
