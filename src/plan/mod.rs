//! From declarations to an ordered plan.
//!
//! - [`dependency`] - The acyclic graph and its deterministic sort
//! - [`emit`] - Plays and their YAML/JSON output
//!
//! [`Session::plan`](crate::session::Session::plan) ties them together with
//! the optimizer pipeline.

mod build;
pub mod dependency;
pub mod emit;

pub use dependency::DependencyGraph;
pub use emit::{Play, Plan};
