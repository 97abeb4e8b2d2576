//! Shared fact gathering.
//!
//! Instead of every play gathering facts on its own, one synthetic unit runs
//! `setup` once against every host and is ordered ahead of everything else.

use serde_yaml::Value;
use tracing::{debug, info};

use super::Optimizer;
use crate::error::{DecibelError, Result};
use crate::plan::DependencyGraph;
use crate::session::Session;
use crate::units::{Attributes, RunnableDecl, UnitHandle};

/// Declares `gather_facts_once` and anchors it before every root of the
/// graph. Every host group gets `gather_facts: false`.
#[derive(Debug, Clone)]
pub struct FactGathering {
    hosts: String,
    become_root: bool,
    unit: Option<UnitHandle>,
}

impl FactGathering {
    pub const NAME: &'static str = "fact_gathering";

    /// Name of the synthetic unit.
    pub const UNIT_NAME: &'static str = "gather_facts_once";

    pub fn new() -> Self {
        Self {
            hosts: "all".to_string(),
            become_root: true,
            unit: None,
        }
    }

    /// Build from the optimizer's settings map. Accepts `hosts` (string) and
    /// `become` (bool).
    pub fn from_settings(settings: &Attributes) -> Result<Self> {
        let mut optimizer = Self::new();
        for (key, value) in settings {
            match (key.as_str(), value) {
                ("hosts", Value::String(hosts)) => optimizer.hosts = hosts.clone(),
                ("become", Value::Bool(become_root)) => optimizer.become_root = *become_root,
                ("hosts", _) | ("become", _) => {
                    return Err(DecibelError::invalid(format!(
                        "{}: setting '{}' has the wrong type",
                        Self::NAME,
                        key
                    )))
                }
                _ => {
                    return Err(DecibelError::invalid(format!(
                        "{}: unknown setting '{}'",
                        Self::NAME,
                        key
                    )))
                }
            }
        }
        Ok(optimizer)
    }

    /// The synthetic unit, once the run phase has declared it.
    pub fn unit(&self) -> Option<&UnitHandle> {
        self.unit.as_ref()
    }
}

impl Default for FactGathering {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer for FactGathering {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn optimize_run(&mut self, session: &mut Session) -> Result<()> {
        if self.unit.is_some() {
            return Ok(());
        }

        let unit = session.declare(RunnableDecl::new(Self::UNIT_NAME, |s| {
            s.task("setup", "")?;
            Ok(())
        }));

        let mut settings = Attributes::new();
        settings.insert("become".to_string(), Value::Bool(self.become_root));
        session.with_hosts(Some(self.hosts.as_str()), settings, |s| s.invoke(unit))?;

        for group in &mut session.host_groups {
            group.set_setting("gather_facts", false);
        }

        self.unit = Some(session.unit(unit)?.handle());
        debug!("Declared {} for hosts '{}'", Self::UNIT_NAME, self.hosts);
        Ok(())
    }

    fn optimize_graph(&mut self, graph: &mut DependencyGraph<UnitHandle>) -> Result<()> {
        let Some(unit) = self.unit.clone() else {
            return Ok(());
        };

        let roots: Vec<UnitHandle> = graph
            .independent_nodes()
            .into_iter()
            .filter(|node| *node != unit)
            .collect();
        for root in &roots {
            graph.add_edge(unit.clone(), root.clone())?;
        }
        info!("Anchored {} before {} root unit(s)", unit, roots.len());
        Ok(())
    }
}
