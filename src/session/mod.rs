//! Automation sessions.
//!
//! A [`Session`] is the explicit context object every declaration goes
//! through. It owns the declared work units, runbooks and host groups, the
//! scope stacks that say where new declarations land, and the optimizer
//! pipeline used when the plan is built.
//!
//! Scopes are entered through methods returning a [`ScopeGuard`]. The guard
//! dereferences to the session and restores the previous scope when dropped,
//! so scopes nest like the blocks that hold the guards.
//!
//! # Example
//!
//! ```
//! use decibel::config::SessionSettings;
//! use decibel::session::Session;
//! use decibel::units::{Attributes, RunnableDecl};
//!
//! let mut session = Session::new(SessionSettings::default()).unwrap();
//! let ping = session.declare(RunnableDecl::new("ping", |s| {
//!     s.task("ping", "")?;
//!     Ok(())
//! }));
//!
//! {
//!     let mut active = session.enter();
//!     let group = active.hosts(None, Attributes::new()).unwrap();
//!     let mut hosts = active.enter_host_group(group).unwrap();
//!     hosts.invoke(ping).unwrap();
//! }
//!
//! let plan = session.plan().unwrap();
//! assert_eq!(plan.plays().last().unwrap().name, "ping");
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};

use serde_yaml::Value;
use tracing::debug;

use crate::config::{validate_settings, SessionSettings};
use crate::context::{ScopeKind, Scopes, SessionId};
use crate::error::{DecibelError, Result};
use crate::optimize::{Optimizer, OptimizerRegistry};
use crate::units::{
    Attributes, HostGroup, HostGroupId, InstanceId, Runnable, RunbookDef, RunbookInstance,
    RunnableId,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Pattern forced onto every host group in localhost-only mode.
pub const LOCALHOST: &str = "localhost";

/// An automation session: declarations, scopes and the optimizer pipeline.
pub struct Session {
    id: SessionId,
    settings: SessionSettings,
    pub(crate) runnables: Vec<Runnable>,
    pub(crate) runbooks: Vec<RunbookDef>,
    pub(crate) instances: Vec<RunbookInstance>,
    pub(crate) host_groups: Vec<HostGroup>,
    pub(crate) scopes: Scopes,
    pub(crate) optimizers: Vec<Box<dyn Optimizer>>,
    pub(crate) next_register: usize,
    pub(crate) guard_floor: usize,
}

impl Session {
    /// Create a session whose optimizer pipeline comes from the settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the settings are inconsistent or
    /// name an unknown optimizer.
    pub fn new(settings: SessionSettings) -> Result<Self> {
        let optimizers = OptimizerRegistry::with_builtins().pipeline(&settings.optimizers)?;
        Self::with_optimizers(settings, optimizers)
    }

    /// Create a session with an explicit optimizer pipeline, ignoring the
    /// `optimizers` list in the settings.
    pub fn with_optimizers(
        settings: SessionSettings,
        optimizers: Vec<Box<dyn Optimizer>>,
    ) -> Result<Self> {
        validate_settings(&settings)?;
        Ok(Self {
            id: SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed)),
            settings,
            runnables: Vec::new(),
            runbooks: Vec::new(),
            instances: Vec::new(),
            host_groups: Vec::new(),
            scopes: Scopes::new(),
            optimizers,
            next_register: 1,
            guard_floor: 0,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// The scope stacks, for inspection.
    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// Names of the configured optimizers, in pipeline order.
    pub fn optimizer_names(&self) -> Vec<&str> {
        self.optimizers.iter().map(|o| o.name()).collect()
    }

    /// Enter the session scope. Host groups can only be declared while a
    /// session scope is active.
    pub fn enter(&mut self) -> ScopeGuard<'_> {
        let id = self.id;
        self.scopes.sessions.enter(id);
        debug!("Entered {}", id);
        ScopeGuard::new(self, ScopeKind::Session)
    }

    /// Whether a session scope is active.
    pub fn is_active(&self) -> bool {
        self.scopes.sessions.current().is_some()
    }

    /// Declare a host group.
    ///
    /// In localhost-only mode the pattern is replaced by `localhost` and the
    /// group gets `connection: local`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` outside an entered session, or when no
    /// pattern is given and localhost-only mode is off.
    pub fn hosts(&mut self, pattern: Option<&str>, settings: Attributes) -> Result<HostGroupId> {
        if !self.is_active() {
            return Err(DecibelError::invalid(
                "host groups must be declared inside an entered session",
            ));
        }

        let mut settings = settings;
        let pattern = if self.settings.localhost_only {
            settings.insert("connection".to_string(), Value::from("local"));
            LOCALHOST.to_string()
        } else {
            match pattern {
                Some(p) if !p.trim().is_empty() => p.to_string(),
                _ => {
                    return Err(DecibelError::invalid(
                        "localhost_only is false and hosts was empty",
                    ))
                }
            }
        };

        let id = HostGroupId(self.host_groups.len());
        debug!("Declared host group {} for '{}'", id, pattern);
        self.host_groups.push(HostGroup::new(id, pattern, settings));
        Ok(id)
    }

    /// Declare a host group with the same pattern and settings as `source`
    /// but no vars and no members.
    pub(crate) fn copy_host_group(&mut self, source: HostGroupId) -> Result<HostGroupId> {
        let group = self.host_group(source).ok_or_else(|| {
            DecibelError::invalid(format!("unknown host group {}", source))
        })?;
        let pattern = group.pattern().to_string();
        let settings = group.settings().clone();
        self.hosts(Some(&pattern), settings)
    }

    /// Make `id` the active host group.
    pub fn enter_host_group(&mut self, id: HostGroupId) -> Result<ScopeGuard<'_>> {
        if self.host_group(id).is_none() {
            return Err(DecibelError::invalid(format!("unknown host group {}", id)));
        }
        self.scopes.host_groups.enter(id);
        Ok(ScopeGuard::new(self, ScopeKind::HostGroup))
    }

    /// Declare a host group and run `f` with it active.
    pub fn with_hosts<T, F>(
        &mut self,
        pattern: Option<&str>,
        settings: Attributes,
        f: F,
    ) -> Result<T>
    where
        F: FnOnce(&mut Session) -> Result<T>,
    {
        let id = self.hosts(pattern, settings)?;
        let mut scope = self.enter_host_group(id)?;
        f(&mut *scope)
    }

    pub(crate) fn enter_runnable(&mut self, id: RunnableId) -> ScopeGuard<'_> {
        self.scopes.runnables.enter(id);
        ScopeGuard::new(self, ScopeKind::Runnable)
    }

    pub(crate) fn enter_instance(&mut self, id: InstanceId) -> ScopeGuard<'_> {
        self.scopes.runbooks.enter(id);
        ScopeGuard::new(self, ScopeKind::Runbook)
    }

    pub fn current_host_group(&self) -> Option<HostGroupId> {
        self.scopes.host_groups.current().copied()
    }

    pub fn current_runnable(&self) -> Option<RunnableId> {
        self.scopes.runnables.current().copied()
    }

    pub fn current_instance(&self) -> Option<InstanceId> {
        self.scopes.runbooks.current().copied()
    }

    /// A variable of the active runbook instance.
    pub fn var(&self, name: &str) -> Option<&Value> {
        let instance = self.current_instance()?;
        self.instances.get(instance.0)?.vars().get(name)
    }

    pub fn host_group(&self, id: HostGroupId) -> Option<&HostGroup> {
        self.host_groups.get(id.0)
    }

    pub fn host_group_mut(&mut self, id: HostGroupId) -> Option<&mut HostGroup> {
        self.host_groups.get_mut(id.0)
    }

    /// All host groups in declaration order.
    pub fn host_groups(&self) -> &[HostGroup] {
        &self.host_groups
    }

    pub fn runnable(&self, id: RunnableId) -> Option<&Runnable> {
        self.runnables.get(id.0)
    }

    pub fn runnable_mut(&mut self, id: RunnableId) -> Option<&mut Runnable> {
        self.runnables.get_mut(id.0)
    }

    /// All declared work units in declaration order.
    pub fn runnables(&self) -> &[Runnable] {
        &self.runnables
    }

    pub(crate) fn unit(&self, id: RunnableId) -> Result<&Runnable> {
        self.runnable(id)
            .ok_or_else(|| DecibelError::invalid(format!("unknown work unit {}", id)))
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("settings", &self.settings)
            .field("runnables", &self.runnables.len())
            .field("runbooks", &self.runbooks.len())
            .field("host_groups", &self.host_groups.len())
            .field("optimizers", &self.optimizer_names())
            .finish()
    }
}

/// An entered scope. Dereferences to the session; leaves the scope on drop.
pub struct ScopeGuard<'a> {
    session: &'a mut Session,
    kind: ScopeKind,
}

impl<'a> ScopeGuard<'a> {
    pub(crate) fn new(session: &'a mut Session, kind: ScopeKind) -> Self {
        Self { session, kind }
    }

    /// Which scope this guard holds.
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }
}

impl Deref for ScopeGuard<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.session.scopes.exit(self.kind);
    }
}
