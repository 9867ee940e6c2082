//! Tolerant dependency cycle resolution
//!
//! Workspace dependencies may form cycles. Rather than rejecting them,
//! [`resolve_cycles`] finds every node taking part in a cycle and strips all
//! edges between such nodes. Edges to nodes outside any cycle are kept.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::graph::WorkspaceNode;

/// A back-edge found while walking the graph: `dependent` depends on
/// `dependency`, which was already on the walk's stack
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleEdge {
    pub dependency: String,
    pub dependent: String,
}

impl std::fmt::Display for CycleEdge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -> {}", self.dependent, self.dependency)
    }
}

/// Result of [`resolve_cycles`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleResolution {
    /// Copies of the input nodes with cycle edges removed
    pub nodes: Vec<WorkspaceNode>,
    /// Detected back-edges, in discovery order, without duplicates
    pub cycles: Vec<CycleEdge>,
}

struct Walker<'a> {
    by_name: HashMap<&'a str, &'a WorkspaceNode>,
    visited: HashSet<&'a str>,
    stack: Vec<&'a str>,
    cycles: Vec<CycleEdge>,
    participants: HashSet<&'a str>,
}

impl<'a> Walker<'a> {
    fn visit(&mut self, name: &'a str) {
        if !self.visited.insert(name) {
            return;
        }
        let Some(node) = self.by_name.get(name).copied() else {
            return;
        };

        self.stack.push(name);
        for dep in &node.dependencies {
            let dep = dep.as_str();
            if let Some(start) = self.stack.iter().position(|&n| n == dep) {
                self.record(dep, name);
                self.participants.extend(self.stack[start..].iter().copied());
                continue;
            }
            // unknown names are leaves
            if self.by_name.contains_key(dep) {
                self.visit(dep);
            }
        }
        self.stack.pop();
    }

    fn record(&mut self, dependency: &str, dependent: &str) {
        let edge = CycleEdge {
            dependency: dependency.to_string(),
            dependent: dependent.to_string(),
        };
        if !self.cycles.contains(&edge) {
            self.cycles.push(edge);
        }
    }
}

/// Detect cycles and strip every edge between cycle participants.
///
/// Nodes are walked in input order and dependencies in declared order. The
/// input is left untouched.
pub fn resolve_cycles(nodes: &[WorkspaceNode]) -> CycleResolution {
    let mut walker = Walker {
        by_name: nodes.iter().map(|n| (n.name.as_str(), n)).collect(),
        visited: HashSet::new(),
        stack: Vec::new(),
        cycles: Vec::new(),
        participants: HashSet::new(),
    };

    for node in nodes {
        walker.visit(&node.name);
    }

    let participants = walker.participants;
    let cleaned = nodes
        .iter()
        .map(|node| {
            let mut node = node.clone();
            if participants.contains(node.name.as_str()) {
                node.dependencies
                    .retain(|d| !participants.contains(d.as_str()));
                node.dependents.retain(|d| !participants.contains(d.as_str()));
            }
            node
        })
        .collect();

    CycleResolution {
        nodes: cleaned,
        cycles: walker.cycles,
    }
}
