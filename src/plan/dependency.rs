//! Dependency graph for work unit ordering.
//!
//! Nodes and their successor sets keep insertion order, so the topological
//! sort is deterministic: ties are broken by the order nodes were added, not
//! by name.

use std::collections::VecDeque;
use std::fmt::{self, Display, Write as _};
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use crate::error::{DecibelError, Result};

/// Directed acyclic graph from each node to its direct successors.
///
/// Every mutation keeps the graph acyclic: an edge that would close a cycle
/// is rolled back before [`add_edge`](DependencyGraph::add_edge) returns.
#[derive(Clone, PartialEq, Eq)]
pub struct DependencyGraph<N: Eq + Hash> {
    successors: IndexMap<N, IndexSet<N>>,
}

impl<N> DependencyGraph<N>
where
    N: Clone + Eq + Hash + Display,
{
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            successors: IndexMap::new(),
        }
    }

    /// Get the number of nodes in the graph.
    pub fn len(&self) -> usize {
        self.successors.len()
    }

    /// Check if the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.successors.is_empty()
    }

    /// Check if a node exists in the graph.
    pub fn contains(&self, node: &N) -> bool {
        self.successors.contains_key(node)
    }

    /// All nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.successors.keys()
    }

    /// Add a node. Returns `false` if it was already present.
    pub fn add_node(&mut self, node: N) -> bool {
        if self.successors.contains_key(&node) {
            return false;
        }
        self.successors.insert(node, IndexSet::new());
        true
    }

    /// Add an edge `from -> to`, adding missing endpoints.
    ///
    /// # Errors
    ///
    /// Returns `CycleIntroduced` if the edge would close a cycle. The graph
    /// is left exactly as it was before the call.
    pub fn add_edge(&mut self, from: N, to: N) -> Result<()> {
        let added_from = self.add_node(from.clone());
        let added_to = self.add_node(to.clone());
        let inserted = self
            .successors
            .get_mut(&from)
            .map(|succ| succ.insert(to.clone()))
            .unwrap_or(false);

        if self.topological_sort().is_ok() {
            return Ok(());
        }

        if inserted {
            if let Some(succ) = self.successors.get_mut(&from) {
                succ.shift_remove(&to);
            }
        }
        if added_to {
            self.successors.shift_remove(&to);
        }
        if added_from {
            self.successors.shift_remove(&from);
        }

        Err(DecibelError::CycleIntroduced {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    /// Returns nodes in topological order (predecessors before successors).
    ///
    /// Kahn's algorithm with a FIFO queue seeded in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `GraphNotAcyclic` if fewer nodes come out than went in.
    pub fn topological_sort(&self) -> Result<Vec<N>> {
        let mut in_degree = self.in_degrees();

        let mut queue: VecDeque<&N> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut result = Vec::with_capacity(self.successors.len());

        while let Some(node) = queue.pop_front() {
            result.push(node.clone());

            for succ in &self.successors[node] {
                if let Some(degree) = in_degree.get_mut(succ) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(succ);
                    }
                }
            }
        }

        if result.len() != self.successors.len() {
            return Err(DecibelError::GraphNotAcyclic {
                sorted: result.len(),
                nodes: self.successors.len(),
            });
        }

        Ok(result)
    }

    /// Nodes with no incoming edges, in insertion order.
    pub fn independent_nodes(&self) -> Vec<N> {
        self.in_degrees()
            .into_iter()
            .filter(|(_, degree)| *degree == 0)
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Nodes with no outgoing edges, in insertion order.
    pub fn leaves(&self) -> Vec<N> {
        self.successors
            .iter()
            .filter(|(_, succ)| succ.is_empty())
            .map(|(node, _)| node.clone())
            .collect()
    }

    /// Direct successors of a node.
    pub fn successors_of(&self, node: &N) -> Option<&IndexSet<N>> {
        self.successors.get(node)
    }

    /// Direct predecessors of a node, in insertion order.
    pub fn predecessors_of(&self, node: &N) -> Vec<N> {
        self.successors
            .iter()
            .filter(|(_, succ)| succ.contains(node))
            .map(|(pred, _)| pred.clone())
            .collect()
    }

    /// Every edge as `(from, to)`.
    pub fn edges(&self) -> Vec<(N, N)> {
        self.successors
            .iter()
            .flat_map(|(from, succ)| succ.iter().map(move |to| (from.clone(), to.clone())))
            .collect()
    }

    /// Graphviz dump listing each node with outgoing edges.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph dag {\n");
        for (node, succ) in &self.successors {
            if succ.is_empty() {
                continue;
            }
            let targets: Vec<String> = succ.iter().map(|s| format!("\"{}\"", s)).collect();
            let _ = writeln!(out, "  \"{}\" -> {{{}}};", node, targets.join(" "));
        }
        out.push('}');
        out
    }

    fn in_degrees(&self) -> IndexMap<&N, usize> {
        let mut in_degree: IndexMap<&N, usize> =
            self.successors.keys().map(|node| (node, 0)).collect();
        for succ in self.successors.values() {
            for node in succ {
                if let Some(degree) = in_degree.get_mut(node) {
                    *degree += 1;
                }
            }
        }
        in_degree
    }
}

impl<N> Default for DependencyGraph<N>
where
    N: Clone + Eq + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<N: Eq + Hash + Display> fmt::Debug for DependencyGraph<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (node, succ) in &self.successors {
            let names: Vec<String> = succ.iter().map(ToString::to_string).collect();
            map.entry(&node.to_string(), &names);
        }
        map.finish()
    }
}
