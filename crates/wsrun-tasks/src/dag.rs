//! Dependency index validation and execution waves
//!
//! Tasks in one batch refer to each other by position. A [`TaskDag`] checks
//! that every index is in range, that no task depends on itself, and that the
//! graph is acyclic, then groups the tasks into waves: wave `k` holds the
//! tasks whose longest dependency chain has length `k`.

use std::fmt::Write as _;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::task::ScriptTask;

/// Errors from dependency index validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DagError {
    /// A task lists its own index as a dependency
    #[error("Script at index {index} has a self-referencing dependency")]
    SelfDependency { index: usize },

    /// A task refers to an index outside the batch
    #[error("Script at index {index} depends on invalid index {dependency} (valid range: 0-{max})", max = .count.saturating_sub(1))]
    InvalidIndex {
        index: usize,
        dependency: usize,
        count: usize,
    },

    /// The dependency graph is not acyclic
    #[error("Dependency cycle detected: {}", format_path(.0))]
    Cycle(Vec<usize>),
}

fn format_path(path: &[usize]) -> String {
    path.iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// A validated dependency graph over task indices
#[derive(Debug, Clone, Serialize)]
pub struct TaskDag {
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    /// Wave of each task
    wave_of: Vec<usize>,
    /// Task indices grouped by wave, ascending within a wave
    waves: Vec<Vec<usize>>,
}

impl TaskDag {
    /// Validate and build the graph for `tasks`
    pub fn from_tasks<M>(tasks: &[ScriptTask<M>]) -> Result<Self, DagError> {
        let dependencies: Vec<Vec<usize>> = tasks.iter().map(|t| t.depends_on.clone()).collect();
        Self::build(dependencies)
    }

    /// Validate and build the graph from one dependency list per task
    #[instrument(skip_all, fields(task_count = dependencies.len()))]
    pub fn build(dependencies: Vec<Vec<usize>>) -> Result<Self, DagError> {
        let count = dependencies.len();

        for (index, deps) in dependencies.iter().enumerate() {
            for &dependency in deps {
                if dependency == index {
                    return Err(DagError::SelfDependency { index });
                }
                if dependency >= count {
                    return Err(DagError::InvalidIndex {
                        index,
                        dependency,
                        count,
                    });
                }
            }
        }

        let order = Self::topological_order(&dependencies)?;

        let mut dependents = vec![Vec::new(); count];
        for (index, deps) in dependencies.iter().enumerate() {
            for &dependency in deps {
                if !dependents[dependency].contains(&index) {
                    dependents[dependency].push(index);
                }
            }
        }

        let mut wave_of = vec![0usize; count];
        for &index in &order {
            wave_of[index] = dependencies[index]
                .iter()
                .map(|&dep| wave_of[dep] + 1)
                .max()
                .unwrap_or(0);
        }

        let wave_count = wave_of.iter().max().map(|w| w + 1).unwrap_or(0);
        let mut waves = vec![Vec::new(); wave_count];
        for (index, &wave) in wave_of.iter().enumerate() {
            waves[wave].push(index);
        }

        debug!(task_count = count, wave_count, "dependency graph validated");

        Ok(Self {
            dependencies,
            dependents,
            wave_of,
            waves,
        })
    }

    /// Depth-first post-order, failing on the first cycle found.
    ///
    /// Roots are visited in ascending index order and each task's
    /// dependencies in declared order, so the reported cycle is deterministic.
    fn topological_order(dependencies: &[Vec<usize>]) -> Result<Vec<usize>, DagError> {
        let mut marks = vec![Mark::Unvisited; dependencies.len()];
        let mut order = Vec::with_capacity(dependencies.len());

        fn visit(
            node: usize,
            dependencies: &[Vec<usize>],
            marks: &mut [Mark],
            path: &mut Vec<usize>,
            order: &mut Vec<usize>,
        ) -> Result<(), DagError> {
            marks[node] = Mark::InProgress;
            path.push(node);
            for &dep in &dependencies[node] {
                match marks[dep] {
                    Mark::InProgress => {
                        let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                        let mut cycle = path[start..].to_vec();
                        cycle.push(dep);
                        return Err(DagError::Cycle(cycle));
                    }
                    Mark::Unvisited => visit(dep, dependencies, marks, path, order)?,
                    Mark::Done => {}
                }
            }
            path.pop();
            marks[node] = Mark::Done;
            order.push(node);
            Ok(())
        }

        let mut path = Vec::new();
        for root in 0..dependencies.len() {
            if marks[root] == Mark::Unvisited {
                visit(root, dependencies, &mut marks, &mut path, &mut order)?;
            }
        }
        Ok(order)
    }

    /// Number of tasks
    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Tasks that `index` waits for
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Tasks waiting for `index`
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Wave of the task at `index`
    pub fn wave(&self, index: usize) -> usize {
        self.wave_of[index]
    }

    /// Task indices grouped by wave
    pub fn waves(&self) -> &[Vec<usize>] {
        &self.waves
    }

    /// Human-readable plan, one line per task, labelled by `label`
    pub fn execution_plan<F>(&self, label: F) -> String
    where
        F: Fn(usize) -> String,
    {
        let mut plan = String::new();
        for (i, wave) in self.waves.iter().enumerate() {
            let _ = writeln!(plan, "Wave {} ({} scripts):", i, wave.len());
            for &index in wave {
                let deps = &self.dependencies[index];
                if deps.is_empty() {
                    let _ = writeln!(plan, "  {}", label(index));
                } else {
                    let after: Vec<String> = deps.iter().map(|&d| label(d)).collect();
                    let _ = writeln!(plan, "  {} (after: {})", label(index), after.join(", "));
                }
            }
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_graph() {
        let dag = TaskDag::build(Vec::new()).unwrap();
        assert!(dag.is_empty());
        assert!(dag.waves().is_empty());
        assert_eq!(dag.execution_plan(|i| i.to_string()), "");
    }

    #[test]
    fn test_self_dependency() {
        let err = TaskDag::build(vec![vec![], vec![1]]).unwrap_err();
        assert_eq!(err, DagError::SelfDependency { index: 1 });
        assert_eq!(
            err.to_string(),
            "Script at index 1 has a self-referencing dependency"
        );
    }

    #[test]
    fn test_invalid_index() {
        let err = TaskDag::build(vec![vec![5], vec![]]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Script at index 0 depends on invalid index 5 (valid range: 0-1)"
        );
    }

    #[test]
    fn test_two_node_cycle() {
        let err = TaskDag::build(vec![vec![1], vec![0]]).unwrap_err();
        assert_eq!(err, DagError::Cycle(vec![0, 1, 0]));
        assert_eq!(err.to_string(), "Dependency cycle detected: 0 -> 1 -> 0");
    }

    #[test]
    fn test_longer_cycle_reports_only_the_loop() {
        // 0 -> 1 -> 2 -> 3 -> 1
        let err = TaskDag::build(vec![vec![1], vec![2], vec![3], vec![1]]).unwrap_err();
        assert_eq!(err, DagError::Cycle(vec![1, 2, 3, 1]));
    }

    #[test]
    fn test_waves() {
        // 0: none, 1: [0], 2: [0], 3: [1, 2], 4: none
        let dag = TaskDag::build(vec![vec![], vec![0], vec![0], vec![1, 2], vec![]]).unwrap();
        assert_eq!(dag.waves(), &[vec![0, 4], vec![1, 2], vec![3]]);
        assert_eq!(dag.wave(3), 2);
        assert_eq!(dag.dependents(0), &[1, 2]);
        assert_eq!(dag.dependencies(3), &[1, 2]);
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let dag = TaskDag::build(vec![vec![1, 2], vec![3], vec![3], vec![]]).unwrap();
        assert_eq!(dag.waves(), &[vec![3], vec![1, 2], vec![0]]);
    }

    #[test]
    fn test_from_tasks() {
        let tasks = vec![
            ScriptTask::new("echo a", ".", "a"),
            ScriptTask::new("echo b", ".", "b").with_dependency(0),
        ];
        let dag = TaskDag::from_tasks(&tasks).unwrap();
        assert_eq!(dag.len(), 2);
        assert_eq!(dag.wave(1), 1);
    }

    #[test]
    fn test_execution_plan_output() {
        let names = ["core", "utils", "app"];
        let dag = TaskDag::build(vec![vec![], vec![0], vec![0, 1]]).unwrap();
        let plan = dag.execution_plan(|i| names[i].to_string());

        assert!(plan.contains("Wave 0 (1 scripts):\n  core\n"));
        assert!(plan.contains("  utils (after: core)"));
        assert!(plan.contains("Wave 2"));
        assert!(plan.contains("  app (after: core, utils)"));
    }
}
