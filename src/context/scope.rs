//! Nested scope stacks.
//!
//! A [`ScopeStack`] records "where am I declaring this" for one kind of
//! scope. [`Scopes`] bundles the five kinds a session tracks. Stacks are
//! never touched directly by declaration code: the session hands out
//! [`ScopeGuard`](crate::session::ScopeGuard)s that pop on drop.

use std::fmt;

use crate::steps::GuardCondition;
use crate::units::{HostGroupId, InstanceId, RunnableId};

/// The five scope kinds tracked during declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// An entered automation session.
    Session,
    /// The host group new work units bind to.
    HostGroup,
    /// The runbook instance currently being populated.
    Runbook,
    /// The work unit whose body is running.
    Runnable,
    /// Guard conditions applied to new step records.
    Guard,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Session => write!(f, "session"),
            ScopeKind::HostGroup => write!(f, "host group"),
            ScopeKind::Runbook => write!(f, "runbook"),
            ScopeKind::Runnable => write!(f, "runnable"),
            ScopeKind::Guard => write!(f, "guard"),
        }
    }
}

/// A stack of saved scope values. The top is the current value.
#[derive(Debug, Clone)]
pub struct ScopeStack<T> {
    kind: ScopeKind,
    frames: Vec<T>,
}

impl<T> ScopeStack<T> {
    /// Create an empty stack for the given scope kind.
    pub fn new(kind: ScopeKind) -> Self {
        Self {
            kind,
            frames: Vec::new(),
        }
    }

    /// Make `value` current, saving the previous value.
    pub fn enter(&mut self, value: T) {
        self.frames.push(value);
    }

    /// Restore the previous value, returning the one being left.
    ///
    /// # Panics
    ///
    /// Panics if the scope was never entered; the nesting is already broken.
    pub fn exit(&mut self) -> T {
        match self.frames.pop() {
            Some(value) => value,
            None => panic!("exited {} scope that was never entered", self.kind),
        }
    }

    /// The innermost unexited value.
    pub fn current(&self) -> Option<&T> {
        self.frames.last()
    }

    /// Number of unexited entries.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing is entered.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// All unexited values, outermost first.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.frames.iter()
    }

    /// Discard every entry above `depth`, returning how many were dropped.
    pub fn unwind_to(&mut self, depth: usize) -> usize {
        let dropped = self.frames.len().saturating_sub(depth);
        self.frames.truncate(depth);
        dropped
    }
}

/// Identifies one entered session for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// All scope stacks of one session.
#[derive(Debug, Clone)]
pub struct Scopes {
    pub sessions: ScopeStack<SessionId>,
    pub host_groups: ScopeStack<HostGroupId>,
    pub runbooks: ScopeStack<InstanceId>,
    pub runnables: ScopeStack<RunnableId>,
    pub guards: ScopeStack<GuardCondition>,
}

impl Scopes {
    pub fn new() -> Self {
        Self {
            sessions: ScopeStack::new(ScopeKind::Session),
            host_groups: ScopeStack::new(ScopeKind::HostGroup),
            runbooks: ScopeStack::new(ScopeKind::Runbook),
            runnables: ScopeStack::new(ScopeKind::Runnable),
            guards: ScopeStack::new(ScopeKind::Guard),
        }
    }

    /// Leave the innermost scope of the given kind.
    pub fn exit(&mut self, kind: ScopeKind) {
        match kind {
            ScopeKind::Session => {
                self.sessions.exit();
            }
            ScopeKind::HostGroup => {
                self.host_groups.exit();
            }
            ScopeKind::Runbook => {
                self.runbooks.exit();
            }
            ScopeKind::Runnable => {
                self.runnables.exit();
            }
            ScopeKind::Guard => {
                self.guards.exit();
            }
        }
    }

    /// Whether every stack is empty.
    pub fn is_unwound(&self) -> bool {
        self.sessions.is_empty()
            && self.host_groups.is_empty()
            && self.runbooks.is_empty()
            && self.runnables.is_empty()
            && self.guards.is_empty()
    }
}

impl Default for Scopes {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stack_has_no_current() {
        let stack: ScopeStack<u32> = ScopeStack::new(ScopeKind::HostGroup);
        assert!(stack.current().is_none());
        assert!(stack.is_empty());
    }

    #[test]
    fn enter_and_exit_nest_like_parentheses() {
        let mut stack = ScopeStack::new(ScopeKind::HostGroup);
        stack.enter(1);
        stack.enter(2);
        stack.enter(3);
        assert_eq!(stack.current(), Some(&3));
        assert_eq!(stack.exit(), 3);
        assert_eq!(stack.current(), Some(&2));
        stack.enter(4);
        assert_eq!(stack.exit(), 4);
        assert_eq!(stack.exit(), 2);
        assert_eq!(stack.exit(), 1);
        assert!(stack.current().is_none());
    }

    #[test]
    fn unwind_restores_value_before_first_enter() {
        let mut stack = ScopeStack::new(ScopeKind::Runnable);
        stack.enter("outer");
        let before = stack.current().copied();

        stack.enter("a");
        stack.enter("b");
        stack.exit();
        stack.enter("c");
        stack.exit();
        stack.exit();

        assert_eq!(stack.current().copied(), before);
    }

    #[test]
    #[should_panic(expected = "exited guard scope that was never entered")]
    fn exit_without_enter_panics() {
        let mut stack: ScopeStack<u8> = ScopeStack::new(ScopeKind::Guard);
        stack.exit();
    }

    #[test]
    fn unwind_to_drops_entries_above_depth() {
        let mut stack = ScopeStack::new(ScopeKind::Guard);
        stack.enter('a');
        let depth = stack.depth();
        stack.enter('b');
        stack.enter('c');

        assert_eq!(stack.unwind_to(depth), 2);
        assert_eq!(stack.current(), Some(&'a'));
        assert_eq!(stack.unwind_to(depth), 0);
    }

    #[test]
    fn scopes_exit_targets_one_kind() {
        let mut scopes = Scopes::new();
        scopes.sessions.enter(SessionId(1));
        scopes.host_groups.enter(HostGroupId(0));
        scopes.exit(ScopeKind::HostGroup);

        assert!(scopes.host_groups.is_empty());
        assert_eq!(scopes.sessions.current(), Some(&SessionId(1)));
        assert!(!scopes.is_unwound());

        scopes.exit(ScopeKind::Session);
        assert!(scopes.is_unwound());
    }

    #[test]
    fn scope_kind_display() {
        assert_eq!(ScopeKind::HostGroup.to_string(), "host group");
        assert_eq!(ScopeKind::Runbook.to_string(), "runbook");
    }
}
