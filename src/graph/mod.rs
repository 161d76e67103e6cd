//! Dependency resolution over the board's `blockedBy` edges.
//!
//! The board is loaded into a petgraph [`DiGraph`] with one node per task
//! and one edge per `blockedBy` reference, pointing dependency to
//! dependent. Cycle errors carry the human-readable path because they
//! abort the whole run and the operator has to fix the board by hand.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Dfs, Reversed};
use petgraph::{algo, Direction};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::store::tasks::{Task, TaskBoard};

/// Read-only view of the board's dependency edges. Rebuilt from fresh store
/// content at every planning pass; it never outlives one.
pub struct DependencyGraph<'a> {
    graph: DiGraph<&'a Task, ()>,
    nodes: HashMap<&'a str, NodeIndex>,
    /// `blockedBy` entries naming no task on the board, in board order.
    dangling: Vec<(&'a str, &'a str)>,
}

impl<'a> DependencyGraph<'a> {
    pub fn from_board(board: &'a TaskBoard) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = HashMap::new();
        for task in &board.tasks {
            let node = graph.add_node(task);
            nodes.insert(task.name.as_str(), node);
        }

        let mut dangling = Vec::new();
        for task in &board.tasks {
            let dependent = nodes[task.name.as_str()];
            for blocker in task.blockers() {
                match nodes.get(blocker.as_str()) {
                    Some(&dependency) => {
                        graph.add_edge(dependency, dependent, ());
                    }
                    None => dangling.push((task.name.as_str(), blocker.as_str())),
                }
            }
        }

        Self {
            graph,
            nodes,
            dangling,
        }
    }

    /// All transitive dependencies of `name` in discovery order. The DFS
    /// visit map doubles as a cycle guard, so this terminates even on a
    /// cyclic board (validation rejects those separately).
    pub fn transitive_dependencies(&self, name: &str) -> Vec<&'a str> {
        let Some(&start) = self.nodes.get(name) else {
            return Vec::new();
        };
        self.dependency_closure(start)
            .into_iter()
            .map(|node| self.task_at(node).name.as_str())
            .collect()
    }

    /// Reject cyclic or dangling `blockedBy` references before anything is
    /// scheduled. Dangling references are reported first; cycles come out
    /// of a failed toposort with the offending path walked back out.
    pub fn validate(&self) -> OrchestratorResult<()> {
        if let Some(&(task, missing)) = self.dangling.first() {
            return Err(OrchestratorError::UnknownDependency {
                task: task.to_string(),
                missing: missing.to_string(),
            });
        }
        match algo::toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(OrchestratorError::DependencyCycle(
                self.cycle_path(cycle.node_id()),
            )),
        }
    }

    /// A task is ready when every transitive dependency has passed on the
    /// board, regardless of what the progress store says about them.
    pub fn is_ready(&self, name: &str) -> bool {
        let Some(&start) = self.nodes.get(name) else {
            return true;
        };
        self.dependency_closure(start)
            .into_iter()
            .all(|node| self.task_at(node).passes)
    }

    /// Depth-first walk along incoming edges, excluding `start` itself.
    fn dependency_closure(&self, start: NodeIndex) -> Vec<NodeIndex> {
        let reversed = Reversed(&self.graph);
        let mut walk = Dfs::new(reversed, start);
        walk.next(reversed);
        let mut closure = Vec::new();
        while let Some(node) = walk.next(reversed) {
            closure.push(node);
        }
        closure
    }

    /// Walks one cycle through `start` back to itself and renders it as
    /// `a -> b -> a`. `start` must come from a failed toposort.
    fn cycle_path(&self, start: NodeIndex) -> String {
        let closing = self
            .graph
            .neighbors_directed(start, Direction::Incoming)
            .find(|&dependency| {
                dependency == start
                    || algo::has_path_connecting(&self.graph, start, dependency, None)
            });
        let Some(dependency) = closing else {
            return self.task_at(start).name.clone();
        };
        let spine = algo::astar(&self.graph, start, |node| node == dependency, |_| 1, |_| 0)
            .map(|(_, path)| path)
            .unwrap_or_else(|| vec![dependency]);
        let mut names = vec![self.task_at(start).name.as_str()];
        names.extend(spine.iter().rev().map(|&node| self.task_at(node).name.as_str()));
        names.join(" -> ")
    }

    fn task_at(&self, node: NodeIndex) -> &'a Task {
        self.graph[node]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tasks::Category;

    fn board(tasks: Vec<Task>) -> TaskBoard {
        TaskBoard {
            project: "test".to_string(),
            created: None,
            project_type: None,
            tasks,
        }
    }

    fn task(name: &str, passes: bool, blocked_by: &[&str]) -> Task {
        Task {
            name: name.to_string(),
            category: Category::Api,
            description: String::new(),
            steps: vec![],
            passes,
            blocked_by: if blocked_by.is_empty() {
                None
            } else {
                Some(blocked_by.iter().map(|s| s.to_string()).collect())
            },
        }
    }

    #[test]
    fn test_transitive_dependencies_discovery_order() {
        let board = board(vec![
            task("a", true, &[]),
            task("b", true, &["a"]),
            task("c", false, &["b"]),
        ]);
        let graph = DependencyGraph::from_board(&board);
        assert_eq!(graph.transitive_dependencies("c"), ["b", "a"]);
        assert_eq!(graph.transitive_dependencies("b"), ["a"]);
        assert!(graph.transitive_dependencies("a").is_empty());
    }

    #[test]
    fn test_shared_dependency_visited_once() {
        let board = board(vec![
            task("base", true, &[]),
            task("left", false, &["base"]),
            task("right", false, &["base"]),
            task("top", false, &["left", "right"]),
        ]);
        let graph = DependencyGraph::from_board(&board);
        assert_eq!(
            graph.transitive_dependencies("top"),
            ["left", "base", "right"]
        );
    }

    #[test]
    fn test_chain_gating() {
        // c depends on b depends on a; only a has passed.
        let board = board(vec![
            task("a", true, &[]),
            task("b", false, &["a"]),
            task("c", false, &["b"]),
        ]);
        let graph = DependencyGraph::from_board(&board);
        assert!(graph.is_ready("b"));
        assert!(!graph.is_ready("c"), "c must wait for b to pass");
    }

    #[test]
    fn test_ready_ignores_progress_only_state() {
        // Readiness is purely the passes flag; an unblocked task is ready.
        let board = board(vec![task("solo", false, &[])]);
        let graph = DependencyGraph::from_board(&board);
        assert!(graph.is_ready("solo"));
    }

    #[test]
    fn test_validate_rejects_two_cycle() {
        let board = board(vec![task("a", false, &["b"]), task("b", false, &["a"])]);
        let graph = DependencyGraph::from_board(&board);
        let err = graph.validate().expect_err("cycle must be rejected");
        match err {
            OrchestratorError::DependencyCycle(path) => {
                assert!(path.contains("a") && path.contains("b"), "path: {}", path);
            }
            other => panic!("expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_self_cycle() {
        let board = board(vec![task("a", false, &["a"])]);
        let graph = DependencyGraph::from_board(&board);
        let err = graph.validate().expect_err("self cycle must be rejected");
        match err {
            OrchestratorError::DependencyCycle(path) => assert_eq!(path, "a -> a"),
            other => panic!("expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_path_closes_on_itself() {
        let board = board(vec![
            task("a", false, &["b"]),
            task("b", false, &["c"]),
            task("c", false, &["a"]),
        ]);
        let graph = DependencyGraph::from_board(&board);
        let err = graph.validate().expect_err("cycle must be rejected");
        match err {
            OrchestratorError::DependencyCycle(path) => {
                let hops: Vec<&str> = path.split(" -> ").collect();
                assert_eq!(hops.len(), 4, "three tasks plus the closing hop: {}", path);
                assert_eq!(hops.first(), hops.last());
                for name in ["a", "b", "c"] {
                    assert!(hops.contains(&name), "path must name {}: {}", name, path);
                }
            }
            other => panic!("expected DependencyCycle, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_unknown_dependency() {
        let board = board(vec![task("a", false, &["ghost"])]);
        let graph = DependencyGraph::from_board(&board);
        let err = graph.validate().expect_err("dangling ref must be rejected");
        match err {
            OrchestratorError::UnknownDependency { task, missing } => {
                assert_eq!(task, "a");
                assert_eq!(missing, "ghost");
            }
            other => panic!("expected UnknownDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_accepts_diamond() {
        let board = board(vec![
            task("base", false, &[]),
            task("left", false, &["base"]),
            task("right", false, &["base"]),
            task("top", false, &["left", "right"]),
        ]);
        let graph = DependencyGraph::from_board(&board);
        assert!(graph.validate().is_ok());
    }
}
