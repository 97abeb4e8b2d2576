//! Plan output.
//!
//! A [`Plan`] is the ordered list of plays handed to the automation engine:
//! one [`Play`] per work unit and host group it is bound to.

use serde::Serialize;

use crate::error::{DecibelError, Result};
use crate::units::{Attributes, HostGroup, Runnable};

/// Keys a play sets itself; settings with these names are dropped.
const RESERVED: [&str; 4] = ["name", "hosts", "vars", "tasks"];

/// One block of the plan: a unit's records for one host group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Play {
    /// Qualified name of the originating unit
    pub name: String,

    /// Target pattern of the host group
    pub hosts: String,

    /// Unit play settings overlaid by host group settings
    #[serde(flatten)]
    pub settings: Attributes,

    /// Host group vars overlaid by unit vars
    pub vars: Attributes,

    /// Rendered step records created under this group
    pub tasks: Vec<Attributes>,
}

impl Play {
    /// Render `unit`'s records for `group`.
    pub fn new(group: &HostGroup, unit: &Runnable) -> Self {
        let mut settings = unit.play_settings().clone();
        for (key, value) in group.settings() {
            settings.insert(key.clone(), value.clone());
        }
        settings.retain(|key, _| !RESERVED.contains(&key.as_str()));

        let mut vars = group.vars().clone();
        for (key, value) in unit.vars() {
            vars.insert(key.clone(), value.clone());
        }

        let tasks = unit
            .tasks_for(group.id())
            .map(|task| task.render(unit.task_settings()))
            .collect();

        Self {
            name: unit.name().to_string(),
            hosts: group.pattern().to_string(),
            settings,
            vars,
            tasks,
        }
    }
}

/// The ordered plays of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Plan {
    plays: Vec<Play>,
}

impl Plan {
    pub fn new(plays: Vec<Play>) -> Self {
        Self { plays }
    }

    /// Plays in execution order.
    pub fn plays(&self) -> &[Play] {
        &self.plays
    }

    pub fn len(&self) -> usize {
        self.plays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plays.is_empty()
    }

    pub fn into_plays(self) -> Vec<Play> {
        self.plays
    }

    /// Serialize as a YAML playbook.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| DecibelError::Serialization {
            message: e.to_string(),
        })
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DecibelError::Serialization {
            message: e.to_string(),
        })
    }
}
