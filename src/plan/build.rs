//! Graph construction and scheduling for a session.

use tracing::{debug, info};

use super::{DependencyGraph, Play, Plan};
use crate::error::{DecibelError, Result};
use crate::optimize::Optimizer;
use crate::session::Session;
use crate::units::{Runnable, UnitHandle, UnitRef};

impl Session {
    /// Graph of every bound unit and its ordering constraints, without
    /// running any optimizer.
    ///
    /// # Errors
    ///
    /// - `CycleIntroduced` if the constraints are circular
    /// - `UnresolvedReference` if a unit outside any runbook names another
    pub fn dependency_graph(&self) -> Result<DependencyGraph<UnitHandle>> {
        let mut graph = DependencyGraph::new();

        for group in self.host_groups() {
            for id in group.members() {
                let unit = self.unit(*id)?;
                let node = unit.handle();
                graph.add_node(node.clone());
                for successor in unit.successors() {
                    graph.add_edge(node.clone(), self.resolve_ref(unit, successor)?)?;
                }
                for predecessor in unit.predecessors() {
                    graph.add_edge(self.resolve_ref(unit, predecessor)?, node.clone())?;
                }
            }
        }

        debug!("Built dependency graph with {} units", graph.len());
        Ok(graph)
    }

    /// Run the optimizer pipeline and build the dependency graph.
    ///
    /// Run-phase passes see an entered session so they can declare host
    /// groups; graph-phase passes run on the built graph in the same order.
    ///
    /// # Errors
    ///
    /// `InvalidConfiguration` if guard conditions are still open, since
    /// they would condition the steps optimizers declare.
    pub fn build_graph(&mut self) -> Result<DependencyGraph<UnitHandle>> {
        if !self.scopes.guards.is_empty() {
            return Err(DecibelError::invalid(format!(
                "{} guard condition(s) still open when building the plan",
                self.scopes.guards.depth()
            )));
        }
        let mut optimizers = std::mem::take(&mut self.optimizers);
        let result = self.optimize_and_build(&mut optimizers);
        self.optimizers = optimizers;
        result
    }

    fn optimize_and_build(
        &mut self,
        optimizers: &mut [Box<dyn Optimizer>],
    ) -> Result<DependencyGraph<UnitHandle>> {
        {
            let mut active = self.enter();
            for optimizer in optimizers.iter_mut() {
                info!("Optimizing run with {}", optimizer.name());
                optimizer.optimize_run(&mut active)?;
            }
        }

        let mut graph = self.dependency_graph()?;
        for optimizer in optimizers.iter_mut() {
            info!("Optimizing graph with {}", optimizer.name());
            optimizer.optimize_graph(&mut graph)?;
        }
        Ok(graph)
    }

    /// Build the plan: optimize, sort, then emit one play per unit and
    /// bound host group. Units without step records are skipped.
    ///
    /// # Errors
    ///
    /// Any graph or optimizer error. No partial plan is produced.
    pub fn plan(&mut self) -> Result<Plan> {
        let graph = self.build_graph()?;
        let order = graph.topological_sort()?;

        let mut plays = Vec::new();
        for node in &order {
            let unit = self.unit(node.id())?;
            if unit.tasks().is_empty() {
                debug!("Skipping {} with no steps", unit.name());
                continue;
            }
            for group in unit.host_groups() {
                let group = self.host_group(*group).ok_or_else(|| {
                    DecibelError::invalid(format!("unknown host group {}", group))
                })?;
                plays.push(Play::new(group, unit));
            }
        }

        info!("Planned {} plays from {} units", plays.len(), order.len());
        Ok(Plan::new(plays))
    }

    fn resolve_ref(&self, unit: &Runnable, reference: &UnitRef) -> Result<UnitHandle> {
        match reference {
            UnitRef::Unit(id) => Ok(self.unit(*id)?.handle()),
            UnitRef::Named(name) => Err(DecibelError::UnresolvedReference {
                runbook: unit
                    .name()
                    .rsplit_once('.')
                    .map(|(runbook, _)| runbook.to_string())
                    .unwrap_or_else(|| "(none)".to_string()),
                unit: unit.name().to_string(),
                reference: name.clone(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::SessionSettings;
    use crate::error::{DecibelError, Result};
    use crate::optimize::FactGathering;
    use crate::session::Session;
    use crate::units::{Attributes, RunnableDecl, RunnableId};

    fn session() -> Session {
        Session::with_optimizers(SessionSettings::default(), Vec::new()).unwrap()
    }

    fn step(name: &str) -> RunnableDecl {
        let action = name.to_string();
        RunnableDecl::new(name, move |s| {
            s.task(action.as_str(), "")?;
            Ok(())
        })
    }

    fn invoke_all(session: &mut Session, units: &[RunnableId]) -> Result<()> {
        let mut active = session.enter();
        let group = active.hosts(None, Attributes::new())?;
        let mut hosts = active.enter_host_group(group)?;
        for unit in units {
            hosts.invoke(*unit)?;
        }
        Ok(())
    }

    #[test]
    fn constraints_become_edges() {
        let mut s = session();
        let a = s.declare(step("a"));
        let b = s.declare(step("b").after(a));
        let c = s.declare(step("c").after(b));
        invoke_all(&mut s, &[c, b, a]).unwrap();

        let graph = s.dependency_graph().unwrap();
        let names: Vec<String> = graph
            .topological_sort()
            .unwrap()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn before_constraint_points_forward() {
        let mut s = session();
        let late = s.declare(step("late"));
        let early = s.declare(step("early").before(late));
        invoke_all(&mut s, &[late, early]).unwrap();

        let plan = s.plan().unwrap();
        let names: Vec<&str> = plan.plays().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn circular_constraints_fail() {
        let mut s = session();
        let a = s.declare(step("a"));
        let b = s.declare(step("b").after(a).before(a));
        invoke_all(&mut s, &[a, b]).unwrap();

        let err = s.plan().unwrap_err();
        assert!(matches!(err, DecibelError::CycleIntroduced { .. }));
    }

    #[test]
    fn named_reference_outside_runbook_is_unresolved() {
        let mut s = session();
        let a = s.declare(step("a").after("b"));
        invoke_all(&mut s, &[a]).unwrap();

        match s.dependency_graph().unwrap_err() {
            DecibelError::UnresolvedReference {
                runbook,
                unit,
                reference,
            } => {
                assert_eq!(runbook, "(none)");
                assert_eq!(unit, "a");
                assert_eq!(reference, "b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn units_without_steps_are_skipped() {
        let mut s = session();
        let empty = s.declare(RunnableDecl::new("empty", |_| Ok(())));
        let full = s.declare(step("full").after(empty));
        invoke_all(&mut s, &[empty, full]).unwrap();

        assert_eq!(s.dependency_graph().unwrap().len(), 2);
        let plan = s.plan().unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.plays()[0].name, "full");
    }

    #[test]
    fn one_play_per_binding() {
        let mut s = session();
        let unit = s.declare(step("twice"));
        invoke_all(&mut s, &[unit, unit]).unwrap();

        let plan = s.plan().unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan.plays()[0].tasks.len(), 2);
    }

    #[test]
    fn open_guard_at_plan_time_fails_before_optimizing() {
        let mut s = Session::with_optimizers(
            SessionSettings::default(),
            vec![Box::new(FactGathering::new())],
        )
        .unwrap();
        let a = s.declare(step("a"));
        s.open_guard("stale");
        invoke_all(&mut s, &[a]).unwrap();

        let err = s.plan().unwrap_err();
        assert!(matches!(err, DecibelError::InvalidConfiguration { ref message }
            if message.contains("guard condition")));
        assert_eq!(s.runnables().len(), 1);

        s.close_guard().unwrap();
        let plan = s.plan().unwrap();
        assert_eq!(plan.plays()[0].name, "gather_facts_once");
        assert!(plan.plays()[0].tasks[0].get("when").is_none());
    }

    #[test]
    fn optimizers_survive_plan() {
        let mut s = Session::with_optimizers(
            SessionSettings::default(),
            vec![Box::new(FactGathering::new())],
        )
        .unwrap();
        let a = s.declare(step("a"));
        invoke_all(&mut s, &[a]).unwrap();

        let plan = s.plan().unwrap();
        assert_eq!(s.optimizer_names(), vec!["fact_gathering"]);
        let names: Vec<&str> = plan.plays().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["gather_facts_once", "a"]);
        assert!(s.scopes().is_unwound());
    }
}
