//! Step records emitted by work unit bodies.
//!
//! This is the boundary with the automation engine: the scheduler never
//! interprets a record beyond the host group it was created under.

mod files;
mod task;

pub use files::{get_file, BUNDLE_DIR};
pub use task::{kwargs, GuardCondition, Task};
