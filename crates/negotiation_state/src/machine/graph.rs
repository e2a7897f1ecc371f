//! The transition graph a role declares once at startup.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// A state identifier: a small Copy enum per role.
pub trait StateId: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

impl<S> StateId for S where S: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static {}

/// Directed graph of declared transitions, with the three distinguished
/// states the engine needs: where a run starts, where failures route, and
/// where the Error state resumes.
#[derive(Debug, Clone)]
pub struct TransitionGraph<S: StateId> {
    edges: HashMap<S, HashSet<S>>,
    initial: S,
    error: S,
    recovery: S,
}

impl<S: StateId> TransitionGraph<S> {
    pub fn new(initial: S, error: S, recovery: S) -> Self {
        Self {
            edges: HashMap::new(),
            initial,
            error,
            recovery,
        }
    }

    pub fn initial(&self) -> S {
        self.initial
    }

    pub fn error_state(&self) -> S {
        self.error
    }

    pub fn recovery_state(&self) -> S {
        self.recovery
    }

    /// Register a directed edge. Re-adding an existing edge is a no-op.
    pub fn add_transition(&mut self, from: S, to: S) {
        self.edges.entry(from).or_default().insert(to);
    }

    /// Register a state with its reachable set, wiring every involved
    /// state to `error_state` as well.
    pub fn add_transitions(&mut self, state: S, reachable: &[S], error_state: S) {
        self.edges.entry(state).or_default();
        for &to in reachable {
            self.add_transition(state, to);
            self.add_transition(to, error_state);
        }
        self.add_transition(state, error_state);
    }

    pub fn allows(&self, from: S, to: S) -> bool {
        self.edges
            .get(&from)
            .is_some_and(|reachable| reachable.contains(&to))
    }

    /// The declared reachable set of a state (empty if unregistered).
    pub fn reachable(&self, from: S) -> HashSet<S> {
        self.edges.get(&from).cloned().unwrap_or_default()
    }
}
