//! Schedulable units and the groups they bind to.
//!
//! - [`runnable`] - Work units: a step closure plus ordering constraints
//! - [`runbook`] - Runbooks: named groups of work units with shared vars
//! - [`host_group`] - Target patterns with settings, and structural dedup

pub mod host_group;
pub mod runbook;
pub mod runnable;

pub use host_group::{dedup_by_key, HostGroup, HostGroupId, HostGroupKey};
pub use runbook::{InstanceId, RunbookBuilder, RunbookDef, RunbookId, RunbookInstance};
pub use runnable::{Body, Runnable, RunnableDecl, RunnableId, UnitHandle, UnitRef};

/// Ordered string-keyed settings, vars and step arguments.
pub type Attributes = indexmap::IndexMap<String, serde_yaml::Value>;
