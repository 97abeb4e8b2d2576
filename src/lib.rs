//! Decibel - declare infrastructure automation steps as Rust closures and
//! compile them into an ordered, host-grouped playbook.
//!
//! Steps live in work units. Units are invoked under host groups, ordered
//! with `before`/`after` constraints and grouped into runbooks. Building the
//! plan runs the optimizer pipeline, sorts the units topologically and emits
//! one play per unit and host group.
//!
//! # Modules
//!
//! - [`config`] - Session settings: schema, loading, validation
//! - [`context`] - Scope stacks tracking where declarations land
//! - [`error`] - Error types and result aliases
//! - [`logging`] - Tracing subscriber setup
//! - [`optimize`] - Optimizer pipeline and built-in passes
//! - [`plan`] - Dependency graph, scheduling and plan output
//! - [`session`] - The session context object
//! - [`steps`] - Step records and guard conditions
//! - [`units`] - Work units, runbooks and host groups
//!
//! # Example
//!
//! ```
//! use decibel::config::SessionSettings;
//! use decibel::session::Session;
//! use decibel::units::{Attributes, RunnableDecl};
//!
//! let settings = SessionSettings {
//!     optimizers: Vec::new(),
//!     ..Default::default()
//! };
//! let mut session = Session::new(settings).unwrap();
//! let a = session.declare(RunnableDecl::new("a", |s| {
//!     s.task("command", "echo a")?;
//!     Ok(())
//! }));
//! let b = session.declare(RunnableDecl::new("b", |s| {
//!     s.task("command", "echo b")?;
//!     Ok(())
//! }).after(a));
//!
//! {
//!     let mut active = session.enter();
//!     let group = active.hosts(None, Attributes::new()).unwrap();
//!     let mut hosts = active.enter_host_group(group).unwrap();
//!     hosts.invoke(b).unwrap();
//!     hosts.invoke(a).unwrap();
//! }
//!
//! let plan = session.plan().unwrap();
//! let names: Vec<&str> = plan.plays().iter().map(|p| p.name.as_str()).collect();
//! assert_eq!(names, vec!["a", "b"]);
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod optimize;
pub mod plan;
pub mod session;
pub mod steps;
pub mod units;

pub use error::{DecibelError, Result};
