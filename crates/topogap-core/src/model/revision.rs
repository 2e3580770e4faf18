//! Model revision
//!
//! Projects a set of fixes onto a topology, yielding a new validated model.
//! The original is never touched; the next verification pass analyzes the
//! revision while the old model is kept only for diffing.

use std::collections::BTreeSet;

use super::{
    CapabilityId, Component, ComponentId, ContractSlot, FieldId, Fix, FixAction, FixTarget,
    Subject, Topology,
};
use crate::error::{GapError, Result};

impl Topology {
    /// Return a copy of this topology with `fixes` applied in order
    pub fn revised(&self, fixes: &[Fix]) -> Result<Topology> {
        let mut next = self.clone();
        for fix in fixes {
            next.apply_fix(fix)?;
        }
        next.validate()?;
        Ok(next)
    }

    fn apply_fix(&mut self, fix: &Fix) -> Result<()> {
        if !fix.is_well_formed() {
            return Err(GapError::schema(format!(
                "fix '{}' puts a {} into the {} slot",
                fix,
                if fix.subject.is_field() { "field" } else { "capability" },
                fix.effective_slot()
            )));
        }
        if let FixTarget::Transition(transition) = &fix.target {
            if !self.has_transition(transition) {
                return Err(GapError::schema(format!(
                    "fix targets unknown transition {}",
                    transition
                )));
            }
        }

        let slot = fix.effective_slot();
        let source = fix.target.component().clone();

        match &fix.action {
            FixAction::Add => {
                edit(self.existing_mut(&source)?, slot, &fix.subject, true);
            }
            FixAction::Remove => {
                edit(self.existing_mut(&source)?, slot, &fix.subject, false);
            }
            FixAction::Relocate { to } => {
                self.existing_mut(to)?;
                edit(self.existing_mut(&source)?, slot, &fix.subject, false);
                edit(self.existing_mut(to)?, slot, &fix.subject, true);
            }
        }
        Ok(())
    }

    fn existing_mut(&mut self, id: &ComponentId) -> Result<&mut Component> {
        self.component_mut(id)
            .ok_or_else(|| GapError::schema(format!("fix references unknown component '{}'", id)))
    }
}

fn edit(component: &mut Component, slot: ContractSlot, subject: &Subject, insert: bool) {
    match subject {
        Subject::Field(field) => {
            let set: &mut BTreeSet<FieldId> = match slot {
                ContractSlot::Reads => &mut component.reads,
                ContractSlot::Writes => &mut component.writes,
                ContractSlot::Passthrough => &mut component.passthrough,
                ContractSlot::Capabilities | ContractSlot::Invokes => return,
            };
            toggle(set, field, insert);
        }
        Subject::Capability(capability) => {
            let set: &mut BTreeSet<CapabilityId> = match slot {
                ContractSlot::Capabilities => &mut component.capabilities,
                ContractSlot::Invokes => &mut component.invokes,
                ContractSlot::Reads | ContractSlot::Writes | ContractSlot::Passthrough => return,
            };
            toggle(set, capability, insert);
        }
    }
}

fn toggle<T: Ord + Clone>(set: &mut BTreeSet<T>, item: &T, insert: bool) {
    if insert {
        set.insert(item.clone());
    } else {
        set.remove(item);
    }
}
