//! Work units.
//!
//! A [`Runnable`] wraps one step closure. It is declared once, gets a
//! [`RunnableId`], and may then be invoked any number of times under
//! different host groups. Ordering constraints are collected raw here and
//! only checked when the dependency graph is built.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use indexmap::IndexSet;
use serde_yaml::Value;
use tracing::debug;

use super::{Attributes, HostGroupId};
use crate::error::{DecibelError, Result};
use crate::session::Session;
use crate::steps::Task;

/// The closure a work unit runs when invoked.
pub type Body = Rc<dyn Fn(&mut Session) -> Result<()>>;

/// Opaque handle for a declared work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunnableId(pub usize);

impl fmt::Display for RunnableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "runnable#{}", self.0)
    }
}

/// An ordering reference: a declared unit, or a sibling name resolved when
/// the enclosing runbook is instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UnitRef {
    Unit(RunnableId),
    Named(String),
}

impl From<RunnableId> for UnitRef {
    fn from(id: RunnableId) -> Self {
        UnitRef::Unit(id)
    }
}

impl From<&str> for UnitRef {
    fn from(name: &str) -> Self {
        UnitRef::Named(name.to_string())
    }
}

impl From<String> for UnitRef {
    fn from(name: String) -> Self {
        UnitRef::Named(name)
    }
}

impl fmt::Display for UnitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitRef::Unit(id) => write!(f, "{}", id),
            UnitRef::Named(name) => write!(f, "'{}'", name),
        }
    }
}

/// Declaration of a work unit before it is registered with a session.
pub struct RunnableDecl {
    pub(crate) name: String,
    pub(crate) body: Body,
    pub(crate) before: Vec<UnitRef>,
    pub(crate) after: Vec<UnitRef>,
    pub(crate) task_settings: Attributes,
    pub(crate) play_settings: Attributes,
    pub(crate) vars: Attributes,
}

impl RunnableDecl {
    /// Declare a unit with the given name and body.
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut Session) -> Result<()> + 'static,
    {
        Self {
            name: name.into(),
            body: Rc::new(body),
            before: Vec::new(),
            after: Vec::new(),
            task_settings: Attributes::new(),
            play_settings: Attributes::new(),
            vars: Attributes::new(),
        }
    }

    /// This unit must run before `unit`.
    pub fn before(mut self, unit: impl Into<UnitRef>) -> Self {
        self.before.push(unit.into());
        self
    }

    /// This unit must run after `unit`.
    pub fn after(mut self, unit: impl Into<UnitRef>) -> Self {
        self.after.push(unit.into());
        self
    }

    /// Tags applied to every step record of this unit.
    pub fn tags<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<Value> = tags.into_iter().map(|t| Value::String(t.into())).collect();
        self.task_setting("tags", Value::Sequence(tags))
    }

    /// Default setting merged under every step record.
    pub fn task_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.task_settings.insert(key.into(), value.into());
        self
    }

    /// Play-level setting, overridden by host-group settings on conflict.
    pub fn play_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.play_settings.insert(key.into(), value.into());
        self
    }

    /// Unit-level variable, overriding host-group vars on conflict.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// The declared (unqualified) name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for RunnableDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnableDecl")
            .field("name", &self.name)
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

/// A declared work unit.
pub struct Runnable {
    id: RunnableId,
    name: String,
    body: Body,
    pub(crate) host_groups: Vec<HostGroupId>,
    pub(crate) tasks: Vec<Task>,
    pub(crate) before: IndexSet<UnitRef>,
    pub(crate) after: IndexSet<UnitRef>,
    pub(crate) task_settings: Attributes,
    pub(crate) play_settings: Attributes,
    pub(crate) vars: Attributes,
    invocations: usize,
}

impl Runnable {
    pub(crate) fn from_decl(id: RunnableId, name: String, decl: RunnableDecl) -> Self {
        Self {
            id,
            name,
            body: decl.body,
            host_groups: Vec::new(),
            tasks: Vec::new(),
            before: decl.before.into_iter().collect(),
            after: decl.after.into_iter().collect(),
            task_settings: decl.task_settings,
            play_settings: decl.play_settings,
            vars: decl.vars,
            invocations: 0,
        }
    }

    pub fn id(&self) -> RunnableId {
        self.id
    }

    /// Qualified display name, e.g. `SetupOS.run_agents`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without the runbook prefix; the default record tag.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    /// Host groups this unit was invoked under, one entry per invocation.
    pub fn host_groups(&self) -> &[HostGroupId] {
        &self.host_groups
    }

    /// Every step record produced across all invocations.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Step records produced while `group` was the active host group.
    pub fn tasks_for(&self, group: HostGroupId) -> impl Iterator<Item = &Task> {
        self.tasks
            .iter()
            .filter(move |t| t.host_group() == Some(group))
    }

    /// Units this one must run before.
    pub fn successors(&self) -> &IndexSet<UnitRef> {
        &self.before
    }

    /// Units this one must run after.
    pub fn predecessors(&self) -> &IndexSet<UnitRef> {
        &self.after
    }

    pub fn task_settings(&self) -> &Attributes {
        &self.task_settings
    }

    pub fn play_settings(&self) -> &Attributes {
        &self.play_settings
    }

    pub fn vars(&self) -> &Attributes {
        &self.vars
    }

    /// How many times the unit has been invoked.
    pub fn invocations(&self) -> usize {
        self.invocations
    }

    /// Add a successor constraint.
    pub fn add_before(&mut self, unit: impl Into<UnitRef>) {
        self.before.insert(unit.into());
    }

    /// Add a predecessor constraint.
    pub fn add_after(&mut self, unit: impl Into<UnitRef>) {
        self.after.insert(unit.into());
    }

    /// Graph node for this unit.
    pub fn handle(&self) -> UnitHandle {
        UnitHandle {
            id: self.id,
            name: Rc::from(self.name.as_str()),
        }
    }
}

impl fmt::Debug for Runnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runnable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host_groups", &self.host_groups)
            .field("tasks", &self.tasks.len())
            .field("before", &self.before)
            .field("after", &self.after)
            .finish_non_exhaustive()
    }
}

/// Graph node: a unit id with its display name. Equality and hashing use the
/// id only.
#[derive(Debug, Clone)]
pub struct UnitHandle {
    id: RunnableId,
    name: Rc<str>,
}

impl UnitHandle {
    pub fn id(&self) -> RunnableId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for UnitHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for UnitHandle {}

impl Hash for UnitHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for UnitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Session {
    /// Register a free-standing work unit.
    pub fn declare(&mut self, decl: RunnableDecl) -> RunnableId {
        let name = decl.name.clone();
        self.declare_qualified(name, decl)
    }

    pub(crate) fn declare_qualified(&mut self, name: String, decl: RunnableDecl) -> RunnableId {
        let id = RunnableId(self.runnables.len());
        debug!("Declared work unit {} as {}", name, id);
        self.runnables.push(Runnable::from_decl(id, name, decl));
        id
    }

    /// Invoke a work unit under the active host group.
    ///
    /// The unit is bound to the group, its body runs with the unit as the
    /// active runnable, and the previous scopes are restored afterwards
    /// whether or not the body succeeded.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` if no host group is active
    /// - `DanglingGuard` if the body left guard conditions open
    /// - whatever the body returned
    pub fn invoke(&mut self, id: RunnableId) -> Result<()> {
        let name = self.unit(id)?.name().to_string();
        let group = self.current_host_group().ok_or_else(|| {
            DecibelError::invalid(format!(
                "work unit '{}' invoked outside of a host group",
                name
            ))
        })?;

        let runnable = &mut self.runnables[id.0];
        runnable.host_groups.push(group);
        runnable.invocations += 1;
        let body = Rc::clone(&runnable.body);
        self.host_groups[group.0].members.insert(id);

        debug!("Invoking {} under {}", name, group);
        let guard_depth = self.scopes.guards.depth();
        let floor = std::mem::replace(&mut self.guard_floor, guard_depth);
        let result = {
            let mut scope = self.enter_runnable(id);
            body(&mut *scope)
        };
        self.guard_floor = floor;
        let open = self.scopes.guards.unwind_to(guard_depth);
        result?;

        if open > 0 {
            return Err(DecibelError::DanglingGuard { unit: name, open });
        }
        Ok(())
    }
}
