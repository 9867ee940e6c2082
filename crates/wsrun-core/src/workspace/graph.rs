//! Workspace dependency graph

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::config::WorkspaceConfig;

use super::cycles::{resolve_cycles, CycleEdge};

/// A node in the workspace dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceNode {
    /// Workspace name
    pub name: String,
    /// Workspaces this one depends on
    pub dependencies: Vec<String>,
    /// Workspaces that depend on this one
    pub dependents: Vec<String>,
}

/// Dependency graph over configured workspaces, with cycles stripped
#[derive(Debug, Clone)]
pub struct WorkspaceGraph {
    /// Nodes in configuration order
    nodes: Vec<WorkspaceNode>,
    /// Back-edges removed while resolving cycles
    cycles: Vec<CycleEdge>,
}

impl WorkspaceGraph {
    /// Build the graph from configured workspaces.
    ///
    /// Duplicate dependency names are collapsed. Names that match no
    /// workspace are kept as dangling edges. Cycles are stripped and logged.
    #[instrument(skip_all, fields(workspaces = workspaces.len()))]
    pub fn build(workspaces: &[WorkspaceConfig]) -> Self {
        let mut nodes: Vec<WorkspaceNode> = workspaces
            .iter()
            .map(|ws| {
                let mut dependencies: Vec<String> = Vec::new();
                for dep in &ws.dependencies {
                    if !dependencies.contains(dep) {
                        dependencies.push(dep.clone());
                    }
                }
                WorkspaceNode {
                    name: ws.name.clone(),
                    dependencies,
                    dependents: Vec::new(),
                }
            })
            .collect();

        // Build reverse dependency mapping (dependents)
        let edges: Vec<(String, String)> = nodes
            .iter()
            .flat_map(|n| n.dependencies.iter().map(|d| (d.clone(), n.name.clone())))
            .collect();
        for (dependency, dependent) in edges {
            if let Some(node) = nodes.iter_mut().find(|n| n.name == dependency) {
                node.dependents.push(dependent);
            }
        }

        let resolution = resolve_cycles(&nodes);
        for edge in &resolution.cycles {
            warn!(
                dependency = %edge.dependency,
                dependent = %edge.dependent,
                "dependency cycle detected, edges between cycle members are ignored"
            );
        }

        Self {
            nodes: resolution.nodes,
            cycles: resolution.cycles,
        }
    }

    /// All nodes, in configuration order
    pub fn nodes(&self) -> &[WorkspaceNode] {
        &self.nodes
    }

    /// Get a workspace node
    pub fn get(&self, name: &str) -> Option<&WorkspaceNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Direct dependencies of a workspace after cycle stripping
    pub fn dependencies(&self, name: &str) -> &[String] {
        self.get(name).map(|n| n.dependencies.as_slice()).unwrap_or(&[])
    }

    /// Check if any cycle was stripped
    pub fn has_cycles(&self) -> bool {
        !self.cycles.is_empty()
    }

    /// Back-edges detected while building the graph
    pub fn cycles(&self) -> &[CycleEdge] {
        &self.cycles
    }
}
