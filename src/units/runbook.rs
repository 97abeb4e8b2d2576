//! Runbooks.
//!
//! A runbook groups work units declared together. Declaration happens in two
//! phases: a [`RunbookBuilder`] collects members by name, and
//! [`RunbookBuilder::register`] turns them into work units. Name-valued
//! ordering references (`.after("run_backup_key")`) are resolved against
//! the member map each time the runbook is instantiated, so members may
//! reference siblings declared later.
//!
//! Instantiating a runbook ([`Session::instantiate`]) copies the active host
//! group, inherits ordering constraints from the enclosing runbook (and the
//! active work unit, if any), runs the setup hook and invokes every member.

use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use serde_yaml::Value;
use tracing::debug;

use super::{Attributes, HostGroupId, RunnableDecl, RunnableId, UnitRef};
use crate::error::{DecibelError, Result};
use crate::session::Session;

/// Hook run when a runbook is instantiated, before its members.
pub type SetupHook = Rc<dyn Fn(&mut Session) -> Result<()>>;

/// Handle for a registered runbook definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunbookId(pub usize);

/// Handle for one instantiation of a runbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(pub usize);

/// A registered runbook: its name, setup hook and members.
pub struct RunbookDef {
    id: RunbookId,
    name: String,
    setup: Option<SetupHook>,
    members: IndexMap<String, RunnableId>,
}

impl RunbookDef {
    pub fn id(&self) -> RunbookId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a member by its declared name.
    pub fn member(&self, name: &str) -> Option<RunnableId> {
        self.members.get(name).copied()
    }

    /// Members in declaration order.
    pub fn members(&self) -> &IndexMap<String, RunnableId> {
        &self.members
    }

    /// Replace every named reference with the sibling it names.
    fn resolve(&self, unit: &str, refs: &IndexSet<UnitRef>) -> Result<IndexSet<UnitRef>> {
        refs.iter()
            .map(|r| match r {
                UnitRef::Unit(_) => Ok(r.clone()),
                UnitRef::Named(name) => self.member(name).map(UnitRef::Unit).ok_or_else(|| {
                    DecibelError::UnresolvedReference {
                        runbook: self.name.clone(),
                        unit: unit.to_string(),
                        reference: name.clone(),
                    }
                }),
            })
            .collect()
    }
}

impl fmt::Debug for RunbookDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunbookDef")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("members", &self.members)
            .finish_non_exhaustive()
    }
}

/// One instantiation of a runbook.
#[derive(Debug, Clone)]
pub struct RunbookInstance {
    id: InstanceId,
    runbook: RunbookId,
    host_group: HostGroupId,
    vars: Attributes,
    before: IndexSet<RunnableId>,
    after: IndexSet<RunnableId>,
}

impl RunbookInstance {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn runbook(&self) -> RunbookId {
        self.runbook
    }

    /// The private host group copy members bind to.
    pub fn host_group(&self) -> HostGroupId {
        self.host_group
    }

    pub fn vars(&self) -> &Attributes {
        &self.vars
    }

    /// Units every member must run before.
    pub fn successors(&self) -> &IndexSet<RunnableId> {
        &self.before
    }

    /// Units every member must run after.
    pub fn predecessors(&self) -> &IndexSet<RunnableId> {
        &self.after
    }
}

/// Collects the members of a runbook before registration.
pub struct RunbookBuilder<'a> {
    session: &'a mut Session,
    name: String,
    setup: Option<SetupHook>,
    members: Vec<RunnableDecl>,
}

impl<'a> RunbookBuilder<'a> {
    pub(crate) fn new(session: &'a mut Session, name: String) -> Self {
        Self {
            session,
            name,
            setup: None,
            members: Vec::new(),
        }
    }

    /// Hook run on instantiation before any member.
    pub fn setup<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Session) -> Result<()> + 'static,
    {
        self.setup = Some(Rc::new(hook));
        self
    }

    /// Add a member work unit.
    pub fn member(mut self, decl: RunnableDecl) -> Self {
        self.members.push(decl);
        self
    }

    /// Register the runbook and declare its members as work units named
    /// `Runbook.member`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if two members share a name.
    pub fn register(self) -> Result<RunbookId> {
        let mut seen = IndexSet::new();
        for decl in &self.members {
            if !seen.insert(decl.name.as_str()) {
                return Err(DecibelError::invalid(format!(
                    "runbook '{}' declares member '{}' more than once",
                    self.name, decl.name
                )));
            }
        }

        let mut members = IndexMap::new();
        for decl in self.members {
            let member = decl.name.clone();
            let qualified = format!("{}.{}", self.name, member);
            let id = self.session.declare_qualified(qualified, decl);
            members.insert(member, id);
        }

        let id = RunbookId(self.session.runbooks.len());
        debug!("Registered runbook {} with {} member(s)", self.name, members.len());
        self.session.runbooks.push(RunbookDef {
            id,
            name: self.name,
            setup: self.setup,
            members,
        });
        Ok(id)
    }
}

impl Session {
    /// Start declaring a runbook.
    pub fn runbook(&mut self, name: impl Into<String>) -> RunbookBuilder<'_> {
        RunbookBuilder::new(self, name.into())
    }

    /// Look up a registered runbook.
    pub fn runbook_def(&self, id: RunbookId) -> Option<&RunbookDef> {
        self.runbooks.get(id.0)
    }

    /// Look up a member unit of a registered runbook.
    pub fn member(&self, runbook: RunbookId, name: &str) -> Result<RunnableId> {
        let def = self
            .runbook_def(runbook)
            .ok_or_else(|| DecibelError::invalid(format!("unknown runbook {:?}", runbook)))?;
        def.member(name).ok_or_else(|| {
            DecibelError::invalid(format!("runbook '{}' has no member '{}'", def.name, name))
        })
    }

    pub fn instance(&self, id: InstanceId) -> Option<&RunbookInstance> {
        self.instances.get(id.0)
    }

    /// Instantiate a runbook under the active host group.
    ///
    /// # Errors
    ///
    /// - `InvalidConfiguration` if no host group is active
    /// - `UnresolvedReference` if a member names a sibling that does not exist
    /// - anything raised by the setup hook or a member body
    pub fn instantiate<I, K, V>(&mut self, runbook: RunbookId, vars: I) -> Result<InstanceId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let name = self
            .runbook_def(runbook)
            .map(|def| def.name.clone())
            .ok_or_else(|| DecibelError::invalid(format!("unknown runbook {:?}", runbook)))?;
        let parent = self.current_host_group().ok_or_else(|| {
            DecibelError::invalid(format!(
                "runbook '{}' instantiated outside of a host group",
                name
            ))
        })?;

        let vars: Attributes = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let host_group = self.copy_host_group(parent)?;
        self.host_groups[host_group.0].vars = vars.clone();

        let (before, mut after) = match self.current_instance() {
            Some(outer) => {
                let outer = &self.instances[outer.0];
                (outer.before.clone(), outer.after.clone())
            }
            None => (IndexSet::new(), IndexSet::new()),
        };
        if let Some(unit) = self.current_runnable() {
            after.insert(unit);
        }

        let id = InstanceId(self.instances.len());
        self.instances.push(RunbookInstance {
            id,
            runbook,
            host_group,
            vars,
            before,
            after,
        });
        debug!("Instantiating runbook {} as {:?} on {}", name, id, host_group);

        let mut in_runbook = self.enter_instance(id);
        let mut hosts = in_runbook.enter_host_group(host_group)?;
        hosts.populate(id)?;
        Ok(id)
    }

    fn populate(&mut self, id: InstanceId) -> Result<()> {
        let instance = self.instances[id.0].clone();
        let def = &self.runbooks[instance.runbook.0];
        let setup = def.setup.clone();
        let members: Vec<RunnableId> = def.members.values().copied().collect();

        if let Some(setup) = setup {
            setup(self)?;
        }

        for member in members {
            let def = &self.runbooks[instance.runbook.0];
            let unit = &self.runnables[member.0];
            let mut before = def.resolve(unit.name(), &unit.before)?;
            let mut after = def.resolve(unit.name(), &unit.after)?;
            before.extend(instance.before.iter().copied().map(UnitRef::Unit));
            after.extend(instance.after.iter().copied().map(UnitRef::Unit));

            let unit = &mut self.runnables[member.0];
            unit.before = before;
            unit.after = after;
            self.invoke(member)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionSettings;
    use crate::steps::kwargs;

    fn session() -> Session {
        Session::with_optimizers(SessionSettings::default(), Vec::new()).unwrap()
    }

    fn noop(name: &str) -> RunnableDecl {
        RunnableDecl::new(name, |_| Ok(()))
    }

    fn instantiate_once(session: &mut Session, runbook: RunbookId) -> Result<InstanceId> {
        let mut active = session.enter();
        let group = active.hosts(None, Attributes::new())?;
        let mut hosts = active.enter_host_group(group)?;
        hosts.instantiate(runbook, [("datacenter", "dh2")])
    }

    #[test]
    fn register_qualifies_member_names() {
        let mut session = session();
        let rb = session
            .runbook("SetupOS")
            .member(noop("run_a"))
            .member(noop("run_b"))
            .register()
            .unwrap();

        let def = session.runbook_def(rb).unwrap();
        let names: Vec<&str> = def.members().keys().map(String::as_str).collect();
        assert_eq!(names, vec!["run_a", "run_b"]);
        let a = session.member(rb, "run_a").unwrap();
        assert_eq!(session.runnable(a).unwrap().name(), "SetupOS.run_a");
    }

    #[test]
    fn duplicate_member_names_rejected() {
        let mut session = session();
        let err = session
            .runbook("Dup")
            .member(noop("run_a"))
            .member(noop("run_a"))
            .register()
            .unwrap_err();
        assert!(matches!(err, DecibelError::InvalidConfiguration { .. }));
    }

    #[test]
    fn unknown_member_lookup_fails() {
        let mut session = session();
        let rb = session.runbook("Empty").register().unwrap();
        let err = session.member(rb, "run_nothing").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: runbook 'Empty' has no member 'run_nothing'"
        );
    }

    #[test]
    fn forward_reference_resolves_to_later_sibling() {
        let mut session = session();
        let rb = session
            .runbook("Forward")
            .member(noop("m1").after("m2"))
            .member(noop("m2"))
            .register()
            .unwrap();
        instantiate_once(&mut session, rb).unwrap();

        let m1 = session.member(rb, "m1").unwrap();
        let m2 = session.member(rb, "m2").unwrap();
        let unit = session.runnable(m1).unwrap();
        assert!(unit.predecessors().contains(&UnitRef::Unit(m2)));
        assert!(!unit
            .predecessors()
            .iter()
            .any(|r| matches!(r, UnitRef::Named(_))));
    }

    #[test]
    fn unresolved_reference_names_runbook_and_member() {
        let mut session = session();
        let rb = session
            .runbook("Broken")
            .member(noop("run_dir").after("run_missing"))
            .register()
            .unwrap();

        let err = instantiate_once(&mut session, rb).unwrap_err();
        match err {
            DecibelError::UnresolvedReference {
                runbook,
                unit,
                reference,
            } => {
                assert_eq!(runbook, "Broken");
                assert_eq!(unit, "Broken.run_dir");
                assert_eq!(reference, "run_missing");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(session.scopes().is_unwound());
    }

    #[test]
    fn instantiate_outside_host_group_fails() {
        let mut session = session();
        let rb = session.runbook("Lonely").register().unwrap();
        let mut active = session.enter();
        let err = active
            .instantiate(rb, Vec::<(String, String)>::new())
            .unwrap_err();
        assert!(err.to_string().contains("outside of a host group"));
    }

    #[test]
    fn members_bind_to_a_private_copy_of_the_host_group() {
        let mut session = session();
        let rb = session.runbook("Copy").member(noop("run_a")).register().unwrap();

        let mut active = session.enter();
        let mut settings = Attributes::new();
        settings.insert("become".into(), Value::Bool(true));
        let outer = active.hosts(None, settings).unwrap();
        let mut hosts = active.enter_host_group(outer).unwrap();
        let instance = hosts.instantiate(rb, [("region", "eu-north")]).unwrap();
        let copy = hosts.instance(instance).unwrap().host_group();

        assert_ne!(copy, outer);
        let copied = hosts.host_group(copy).unwrap();
        assert_eq!(copied.pattern(), "localhost");
        assert_eq!(copied.settings().get("become"), Some(&Value::Bool(true)));
        assert_eq!(copied.vars().get("region"), Some(&Value::from("eu-north")));
        assert!(hosts.host_group(outer).unwrap().members().is_empty());

        let a = hosts.member(rb, "run_a").unwrap();
        assert_eq!(hosts.runnable(a).unwrap().host_groups(), &[copy]);
    }

    #[test]
    fn members_read_instance_vars() {
        let mut session = session();
        let rb = session
            .runbook("Vars")
            .member(RunnableDecl::new("run_a", |s| {
                let dc = s.var("datacenter").cloned();
                assert_eq!(dc, Some(Value::from("dh2")));
                Ok(())
            }))
            .register()
            .unwrap();
        instantiate_once(&mut session, rb).unwrap();
    }

    #[test]
    fn setup_hook_runs_before_members() {
        let mut session = session();
        let first = session.declare(RunnableDecl::new("setup_user", |s| {
            s.task("set_fact", kwargs([("ansible_user", "ubuntu")]))?;
            Ok(())
        }));
        let rb = session
            .runbook("Ordered")
            .setup(move |s| s.invoke(first))
            .member(RunnableDecl::new("run_a", move |s| {
                let setup = s.runnable(first).map(|r| r.invocations()).unwrap_or(0);
                assert_eq!(setup, 1);
                Ok(())
            }))
            .register()
            .unwrap();
        instantiate_once(&mut session, rb).unwrap();
    }

    #[test]
    fn nested_runbook_runs_after_invoking_unit() {
        let mut session = session();
        let inner = session
            .runbook("ConsulAgent")
            .member(noop("run_do"))
            .register()
            .unwrap();
        let outer = session
            .runbook("SetupOS")
            .member(RunnableDecl::new("run_setup_agents", move |s| {
                s.instantiate(inner, [("datacenter", "dh2")])?;
                Ok(())
            }))
            .register()
            .unwrap();
        instantiate_once(&mut session, outer).unwrap();

        let agents = session.member(outer, "run_setup_agents").unwrap();
        let run_do = session.member(inner, "run_do").unwrap();
        assert!(session
            .runnable(run_do)
            .unwrap()
            .predecessors()
            .contains(&UnitRef::Unit(agents)));
    }

    #[test]
    fn nested_runbook_inherits_outer_constraints() {
        let mut session = session();
        let inner = session
            .runbook("Inner")
            .member(noop("run_x"))
            .register()
            .unwrap();
        let outer = session
            .runbook("Outer")
            .member(RunnableDecl::new("run_m", move |s| {
                s.instantiate(inner, Vec::<(String, Value)>::new())?;
                Ok(())
            }))
            .register()
            .unwrap();
        let runner = session.declare(RunnableDecl::new("runner", move |s| {
            s.instantiate(outer, Vec::<(String, Value)>::new())?;
            Ok(())
        }));

        {
            let mut active = session.enter();
            let group = active.hosts(None, Attributes::new()).unwrap();
            let mut hosts = active.enter_host_group(group).unwrap();
            hosts.invoke(runner).unwrap();
        }

        let run_m = session.member(outer, "run_m").unwrap();
        let run_x = session.member(inner, "run_x").unwrap();
        let after = session.runnable(run_x).unwrap().predecessors();
        assert!(after.contains(&UnitRef::Unit(run_m)));
        assert!(after.contains(&UnitRef::Unit(runner)));
    }
}
