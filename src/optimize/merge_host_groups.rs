//! Host group deduplication.
//!
//! Instantiating the same runbook several times against equivalent targets
//! produces distinct host groups that mean the same thing. This pass keeps
//! one binding per structurally distinct group so the plan does not repeat
//! the same play.

use std::collections::HashMap;

use tracing::info;

use super::Optimizer;
use crate::error::{DecibelError, Result};
use crate::session::Session;
use crate::units::{dedup_by_key, Attributes, HostGroup, HostGroupId, HostGroupKey};

/// Collapses each unit's host bindings by [`HostGroup::structural_key`].
#[derive(Debug, Clone, Default)]
pub struct MergeHostGroups {
    removed: usize,
}

impl MergeHostGroups {
    pub const NAME: &'static str = "merge_host_groups";

    pub fn new() -> Self {
        Self::default()
    }

    /// Takes no settings.
    pub fn from_settings(settings: &Attributes) -> Result<Self> {
        if let Some(key) = settings.keys().next() {
            return Err(DecibelError::invalid(format!(
                "{}: unknown setting '{}'",
                Self::NAME,
                key
            )));
        }
        Ok(Self::new())
    }

    /// Bindings removed by the last run.
    pub fn removed(&self) -> usize {
        self.removed
    }
}

fn structural_keys(groups: &[HostGroup]) -> HashMap<HostGroupId, HostGroupKey> {
    groups
        .iter()
        .map(|group| (group.id(), group.structural_key()))
        .collect()
}

impl Optimizer for MergeHostGroups {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn optimize_run(&mut self, session: &mut Session) -> Result<()> {
        let keys = structural_keys(&session.host_groups);
        self.removed = 0;

        for unit in &mut session.runnables {
            let before = unit.host_groups.len();
            unit.host_groups = dedup_by_key(&unit.host_groups, |id| keys.get(id).cloned());
            let removed = before - unit.host_groups.len();
            if removed > 0 {
                info!(
                    "Optimized host groups for {}, reduced by {}",
                    unit.name(),
                    removed
                );
                self.removed += removed;
            }
        }
        Ok(())
    }
}
