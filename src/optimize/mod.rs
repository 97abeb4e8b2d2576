//! Optimizer pipeline.
//!
//! Optimizers rewrite a session before its dependency graph is built and
//! the graph before it is sorted. They run in the order listed in
//! [`SessionSettings::optimizers`](crate::config::SessionSettings), and each
//! pass sees the effects of the ones before it.
//!
//! - [`FactGathering`] - one shared fact-gathering step ahead of everything
//! - [`MergeHostGroups`] - collapse structurally identical host bindings

mod fact_gathering;
mod merge_host_groups;
mod registry;

pub use fact_gathering::FactGathering;
pub use merge_host_groups::MergeHostGroups;
pub use registry::{OptimizerFactory, OptimizerRegistry};

use crate::error::Result;
use crate::plan::DependencyGraph;
use crate::session::Session;
use crate::units::UnitHandle;

/// A pass over the declared session and the built graph.
pub trait Optimizer {
    /// Name used in settings and logs.
    fn name(&self) -> &str;

    /// Rewrite the declarations before the graph is built. Runs inside an
    /// entered session scope.
    fn optimize_run(&mut self, session: &mut Session) -> Result<()> {
        let _ = session;
        Ok(())
    }

    /// Rewrite the graph before it is sorted.
    fn optimize_graph(&mut self, graph: &mut DependencyGraph<UnitHandle>) -> Result<()> {
        let _ = graph;
        Ok(())
    }
}
