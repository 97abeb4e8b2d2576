//! Host groups.
//!
//! A [`HostGroup`] is a target pattern plus play settings and vars. Work
//! units register themselves with whichever group is active when they are
//! invoked. Groups are compared by id everywhere except in the merge
//! optimizer, which passes [`HostGroup::structural_key`] to
//! [`dedup_by_key`].

use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;

use indexmap::IndexSet;
use serde_yaml::Value;

use super::{Attributes, RunnableId};

/// Opaque handle for a host group within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostGroupId(pub usize);

impl fmt::Display for HostGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "hosts#{}", self.0)
    }
}

/// A target pattern with settings, vars and registered members.
#[derive(Debug, Clone)]
pub struct HostGroup {
    id: HostGroupId,
    pattern: String,
    pub(crate) settings: Attributes,
    pub(crate) vars: Attributes,
    pub(crate) members: IndexSet<RunnableId>,
}

impl HostGroup {
    pub(crate) fn new(id: HostGroupId, pattern: String, settings: Attributes) -> Self {
        Self {
            id,
            pattern,
            settings,
            vars: Attributes::new(),
            members: IndexSet::new(),
        }
    }

    pub fn id(&self) -> HostGroupId {
        self.id
    }

    /// Target pattern, emitted as the play's `hosts`.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn settings(&self) -> &Attributes {
        &self.settings
    }

    pub fn vars(&self) -> &Attributes {
        &self.vars
    }

    /// Units registered against this group, in registration order.
    pub fn members(&self) -> &IndexSet<RunnableId> {
        &self.members
    }

    /// Set or replace a play setting.
    pub fn set_setting(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.settings.insert(key.into(), value.into());
    }

    /// Set or replace a group variable.
    pub fn set_var(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Key under which structurally identical groups compare equal: same
    /// pattern, settings, vars and members regardless of map order.
    pub fn structural_key(&self) -> HostGroupKey {
        HostGroupKey {
            pattern: self.pattern.clone(),
            settings: sorted_entries(&self.settings),
            vars: sorted_entries(&self.vars),
            members: {
                let mut members: Vec<RunnableId> = self.members.iter().copied().collect();
                members.sort();
                members
            },
        }
    }
}

fn sorted_entries(attrs: &Attributes) -> Vec<(String, Value)> {
    let mut entries: Vec<(String, Value)> = attrs
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Structural identity of a host group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostGroupKey {
    pattern: String,
    settings: Vec<(String, Value)>,
    vars: Vec<(String, Value)>,
    members: Vec<RunnableId>,
}

/// Keep the first item for each distinct key, preserving order.
pub fn dedup_by_key<T, K, F>(items: &[T], mut key: F) -> Vec<T>
where
    T: Clone,
    K: Eq + Hash,
    F: FnMut(&T) -> K,
{
    let mut seen = HashSet::new();
    items
        .iter()
        .filter(|item| seen.insert(key(*item)))
        .cloned()
        .collect()
}
