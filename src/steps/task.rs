//! Step records.
//!
//! A [`Task`] is one action emitted by a work unit body. The core treats it
//! as opaque apart from two things: the host group that was active when it
//! was created (used to split a unit's records per play) and the settings
//! it inherits from active guard conditions.

use std::fmt;

use serde_yaml::Value;

use crate::context::ScopeKind;
use crate::error::{DecibelError, Result};
use crate::session::{ScopeGuard, Session};
use crate::units::{Attributes, HostGroupId};

/// A condition applied as `when:` to every record created while it is open.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GuardCondition(pub String);

impl fmt::Display for GuardCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build keyword arguments for [`Session::task`].
pub fn kwargs<I, K, V>(pairs: I) -> Value
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    Value::Mapping(
        pairs
            .into_iter()
            .map(|(k, v)| (Value::String(k.into()), v.into()))
            .collect(),
    )
}

/// One step record.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    action: String,
    args: Value,
    settings: Attributes,
    vars: Attributes,
    register: String,
    host_group: Option<HostGroupId>,
}

impl Task {
    pub fn action(&self) -> &str {
        &self.action
    }

    /// Free-form (scalar) or keyword (mapping) arguments.
    pub fn args(&self) -> &Value {
        &self.args
    }

    pub fn settings(&self) -> &Attributes {
        &self.settings
    }

    pub fn vars(&self) -> &Attributes {
        &self.vars
    }

    /// Host group active when the record was created.
    pub fn host_group(&self) -> Option<HostGroupId> {
        self.host_group
    }

    /// Name of the variable the record's result is registered as.
    pub fn var(&self) -> &str {
        &self.register
    }

    pub fn with_setting(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Replace the record's condition.
    pub fn when(&mut self, condition: impl Into<String>) -> &mut Self {
        self.with_setting("when", condition.into())
    }

    pub fn run_once(&mut self) -> &mut Self {
        self.with_setting("run_once", true)
    }

    /// Delegate to a single target.
    pub fn on(&mut self, target: impl Into<String>) -> &mut Self {
        self.with_setting("delegate_to", target.into())
    }

    /// Delegate to every item of `targets`.
    pub fn on_all(&mut self, targets: impl Into<String>) -> &mut Self {
        self.with_setting("delegate_to", "{{ item }}")
            .with_setting("loop", targets.into())
    }

    /// Expose another record's registered result as `key`.
    pub fn where_var(&mut self, key: impl Into<String>, register: &str) -> &mut Self {
        self.vars
            .insert(key.into(), Value::String(format!("{{{{ {} }}}}", register)));
        self
    }

    /// Display form used as the emitted `name`, e.g. `apt(name=vault)`.
    pub fn label(&self) -> String {
        format!("{}({})", self.action, format_args_list(&self.args))
    }

    /// Render the record for a play, with `defaults` underneath its own
    /// settings.
    pub fn render(&self, defaults: &Attributes) -> Attributes {
        let mut out = defaults.clone();
        for (key, value) in &self.settings {
            out.insert(key.clone(), value.clone());
        }
        out.insert(self.action.clone(), self.args.clone());
        if !self.vars.is_empty() {
            out.insert("vars".to_string(), to_value(&self.vars));
        }
        out.insert("name".to_string(), Value::String(self.label()));
        out
    }
}

fn to_value(attrs: &Attributes) -> Value {
    Value::Mapping(
        attrs
            .iter()
            .map(|(k, v)| (Value::String(k.clone()), v.clone()))
            .collect(),
    )
}

fn format_args_list(args: &Value) -> String {
    match args {
        Value::Mapping(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", display(k), escape(&display(v))))
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => String::new(),
        other => escape(&display(other)),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "None".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

fn escape(text: &str) -> String {
    text.replace('{', "[").replace('}', "]")
}

impl Session {
    /// Record a step in the active work unit.
    ///
    /// The record gets a fresh register variable, the unit's tags (or the
    /// unit name) and a `when` list built from every open guard condition.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` when no work unit is active.
    pub fn task(&mut self, action: impl Into<String>, args: impl Into<Value>) -> Result<&mut Task> {
        let action = action.into();
        let unit = self.current_runnable().ok_or_else(|| {
            DecibelError::invalid(format!("step '{}' declared outside of a work unit", action))
        })?;

        let register = format!("runvar{:04}", self.next_register);
        self.next_register += 1;

        let mut settings = Attributes::new();
        settings.insert("register".to_string(), Value::String(register.clone()));
        let runnable = &self.runnables[unit.0];
        let tags = runnable
            .task_settings
            .get("tags")
            .cloned()
            .unwrap_or_else(|| {
                Value::Sequence(vec![Value::String(runnable.short_name().to_string())])
            });
        settings.insert("tags".to_string(), tags);

        if !self.scopes.guards.is_empty() {
            let conditions: Vec<Value> = self
                .scopes
                .guards
                .iter()
                .map(|g| Value::String(g.0.clone()))
                .collect();
            settings.insert("when".to_string(), Value::Sequence(conditions));
        }

        let task = Task {
            action,
            args: args.into(),
            settings,
            vars: Attributes::new(),
            register,
            host_group: self.current_host_group(),
        };
        let tasks = &mut self.runnables[unit.0].tasks;
        tasks.push(task);
        let last = tasks.len() - 1;
        Ok(&mut tasks[last])
    }

    /// Open a guard condition for the lifetime of the returned guard.
    pub fn when(&mut self, condition: impl Into<String>) -> ScopeGuard<'_> {
        self.scopes.guards.enter(GuardCondition(condition.into()));
        ScopeGuard::new(self, ScopeKind::Guard)
    }

    /// Open a guard condition that must be closed with
    /// [`close_guard`](Session::close_guard) before the enclosing work unit
    /// returns.
    pub fn open_guard(&mut self, condition: impl Into<String>) {
        self.scopes.guards.enter(GuardCondition(condition.into()));
    }

    /// Close the innermost guard condition.
    ///
    /// Inside a work unit only guards opened by that unit can be closed.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if the innermost guard belongs to a caller of
    /// the active work unit.
    ///
    /// # Panics
    ///
    /// Panics if no guard condition is open.
    pub fn close_guard(&mut self) -> Result<GuardCondition> {
        let depth = self.scopes.guards.depth();
        if depth > 0 && depth <= self.guard_floor {
            let unit = self
                .current_runnable()
                .and_then(|id| self.runnable(id))
                .map(|r| r.name().to_string())
                .unwrap_or_default();
            return Err(DecibelError::invalid(format!(
                "work unit '{}' cannot close guard condition '{}' opened by its caller",
                unit,
                self.scopes.guards.current().map(|g| g.0.as_str()).unwrap_or_default()
            )));
        }
        Ok(self.scopes.guards.exit())
    }

    /// Conditions currently applied to new records, outermost first.
    pub fn active_guards(&self) -> Vec<&GuardCondition> {
        self.scopes.guards.iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionSettings;
    use crate::units::RunnableDecl;

    fn run(body: impl Fn(&mut Session) -> Result<()> + 'static) -> (Session, Vec<Task>) {
        let mut session = Session::with_optimizers(SessionSettings::default(), Vec::new()).unwrap();
        let unit = session.declare(RunnableDecl::new("SetupOS.run_siteops", body));
        {
            let mut active = session.enter();
            let group = active.hosts(None, Attributes::new()).unwrap();
            let mut hosts = active.enter_host_group(group).unwrap();
            hosts.invoke(unit).unwrap();
        }
        let tasks = session.runnable(unit).unwrap().tasks().to_vec();
        (session, tasks)
    }

    #[test]
    fn task_outside_work_unit_fails() {
        let mut session = Session::with_optimizers(SessionSettings::default(), Vec::new()).unwrap();
        let err = session.task("ping", "").unwrap_err();
        assert!(err.to_string().contains("outside of a work unit"));
    }

    #[test]
    fn task_gets_register_and_default_tags() {
        let (_, tasks) = run(|s| {
            s.task("file", kwargs([("path", "/localhome"), ("state", "directory")]))?;
            s.task("command", "whoami")?;
            Ok(())
        });

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].var(), "runvar0001");
        assert_eq!(tasks[1].var(), "runvar0002");
        assert_eq!(
            tasks[0].settings().get("tags"),
            Some(&serde_yaml::to_value(vec!["run_siteops"]).unwrap())
        );
        assert!(tasks[0].settings().get("when").is_none());
    }

    #[test]
    fn task_records_active_host_group() {
        let (session, tasks) = run(|s| {
            s.task("ping", "")?;
            Ok(())
        });
        assert_eq!(tasks[0].host_group(), Some(session.host_groups()[0].id()));
    }

    #[test]
    fn guards_become_when_list() {
        let (_, tasks) = run(|s| {
            let mut outer = s.when("usr.changed");
            {
                let mut inner = outer.when("ansible_os_family == 'Debian'");
                inner.task("copy", kwargs([("src", "/home/ubuntu.ssh")]))?;
            }
            outer.task("command", "true")?;
            Ok(())
        });

        assert_eq!(
            tasks[0].settings().get("when"),
            Some(
                &serde_yaml::to_value(vec!["usr.changed", "ansible_os_family == 'Debian'"])
                    .unwrap()
            )
        );
        assert_eq!(
            tasks[1].settings().get("when"),
            Some(&serde_yaml::to_value(vec!["usr.changed"]).unwrap())
        );
    }

    #[test]
    fn builder_methods_set_settings() {
        let (_, tasks) = run(|s| {
            let key = s.task("openssh_keypair", kwargs([("size", 4096)]))?.var().to_string();
            s.task("get_file", kwargs([("src", "files/siteops_sudoers")]))?
                .run_once()
                .on("{{ groups.trafficlb_nodes }}")
                .where_var("backup_pubkey", &key);
            s.task("user", kwargs([("name", "tier")]))?
                .on_all("{{ groups.seedvault_nodes }}");
            Ok(())
        });

        let settings = tasks[1].settings();
        assert_eq!(settings.get("run_once"), Some(&Value::Bool(true)));
        assert_eq!(
            settings.get("delegate_to"),
            Some(&Value::from("{{ groups.trafficlb_nodes }}"))
        );
        assert_eq!(
            tasks[1].vars().get("backup_pubkey"),
            Some(&Value::from("{{ runvar0001 }}"))
        );
        assert_eq!(
            tasks[2].settings().get("loop"),
            Some(&Value::from("{{ groups.seedvault_nodes }}"))
        );
        assert_eq!(tasks[2].settings().get("delegate_to"), Some(&Value::from("{{ item }}")));
    }

    #[test]
    fn label_formats_keyword_arguments() {
        let (_, tasks) = run(|s| {
            s.task("apt", kwargs([("name", "consul"), ("state", "installed")]))?;
            s.task("command", "mv {{ keyfile.path }} /root")?;
            s.task("meta", Value::Null)?;
            Ok(())
        });
        assert_eq!(tasks[0].label(), "apt(name=consul, state=installed)");
        assert_eq!(tasks[1].label(), "command(mv [[ keyfile.path ]] /root)");
        assert_eq!(tasks[2].label(), "meta()");
    }

    #[test]
    fn render_layers_defaults_under_record_settings() {
        let (_, tasks) = run(|s| {
            s.task("apt", kwargs([("name", "vault")]))?
                .with_setting("become", true);
            Ok(())
        });

        let mut defaults = Attributes::new();
        defaults.insert("tags".into(), serde_yaml::to_value(vec!["ignored"]).unwrap());
        defaults.insert("ignore_errors".into(), Value::Bool(true));
        let rendered = tasks[0].render(&defaults);

        let keys: Vec<&str> = rendered.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            vec!["tags", "ignore_errors", "register", "become", "apt", "name"]
        );
        assert_eq!(
            rendered["tags"],
            serde_yaml::to_value(vec!["run_siteops"]).unwrap()
        );
        assert_eq!(rendered["name"], Value::from("apt(name=vault)"));
    }

    #[test]
    fn close_guard_returns_condition() {
        let mut session = Session::with_optimizers(SessionSettings::default(), Vec::new()).unwrap();
        session.open_guard("a");
        session.open_guard("b");
        assert_eq!(session.active_guards().len(), 2);
        assert_eq!(session.close_guard().unwrap(), GuardCondition("b".into()));
        assert_eq!(session.close_guard().unwrap(), GuardCondition("a".into()));
    }

    #[test]
    #[should_panic(expected = "never entered")]
    fn close_guard_without_open_panics() {
        let mut session = Session::with_optimizers(SessionSettings::default(), Vec::new()).unwrap();
        let _ = session.close_guard();
    }
}
