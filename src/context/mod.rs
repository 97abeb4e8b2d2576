//! Declaration context.
//!
//! Tracks the nested scopes (session, host group, runbook, runnable, guard)
//! that decide where a declaration lands.

pub mod scope;

pub use scope::{ScopeKind, ScopeStack, Scopes, SessionId};
