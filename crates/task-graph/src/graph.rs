//! Task graph builder using petgraph.
//!
//! Edges point from a task to the tasks it depends on, so a path through the
//! graph reads "a needs b needs c".

use crate::traversal::find_cycle;
use crate::{Error, Result, TaskNodeData, TopologicalOrder};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::IntoNodeReferences;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A node in the task graph.
#[derive(Debug, Clone)]
pub struct GraphNode<T> {
    /// Name of the task.
    pub name: String,
    /// The task data.
    pub task: T,
}

/// Task graph for dependency resolution and cycle detection.
///
/// This is a generic graph that can hold any task type implementing [`TaskNodeData`].
pub struct TaskGraph<T: TaskNodeData> {
    /// The directed graph of tasks.
    graph: DiGraph<GraphNode<T>, ()>,
    /// Map from task names to node indices.
    name_to_node: HashMap<String, NodeIndex>,
}

impl<T: TaskNodeData> TaskGraph<T> {
    /// Create a new empty task graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            name_to_node: HashMap::new(),
        }
    }

    /// Add a single task to the graph.
    ///
    /// If a task with the same name already exists, returns the existing node index.
    ///
    /// # Errors
    ///
    /// Currently infallible, but returns `Result` for API consistency.
    pub fn add_task(&mut self, name: &str, task: T) -> Result<NodeIndex> {
        if let Some(&node) = self.name_to_node.get(name) {
            return Ok(node);
        }

        let node = GraphNode {
            name: name.to_string(),
            task,
        };

        let node_index = self.graph.add_node(node);
        self.name_to_node.insert(name.to_string(), node_index);
        debug!("Added task node '{}'", name);

        Ok(node_index)
    }

    /// Get a reference to a task node by name.
    #[must_use]
    pub fn get_node_by_name(&self, name: &str) -> Option<&GraphNode<T>> {
        self.name_to_node
            .get(name)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Add dependency edges after all tasks have been added.
    ///
    /// # Errors
    ///
    /// Returns an error if any task depends on a task that is not in the graph.
    /// No edge is added in that case.
    pub fn add_dependency_edges(&mut self) -> Result<()> {
        let mut missing_deps = Vec::new();
        let mut edges_to_add = Vec::new();

        for (node_index, node) in self.graph.node_references() {
            for dep_name in node.task.dependency_names() {
                if let Some(&dep_node_index) = self.name_to_node.get(dep_name) {
                    edges_to_add.push((node_index, dep_node_index));
                } else {
                    missing_deps.push((node.name.clone(), dep_name.to_string()));
                }
            }
        }

        if !missing_deps.is_empty() {
            return Err(Error::MissingDependencies {
                missing: missing_deps,
            });
        }

        for (from, to) in edges_to_add {
            self.graph.update_edge(from, to, ());
        }

        Ok(())
    }

    /// Check if the graph has cycles.
    #[must_use]
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Find one dependency cycle, if any.
    ///
    /// The returned names follow the "depends on" direction and start and end
    /// with the same task, e.g. `["a", "b", "a"]`. A task depending on itself
    /// yields `["a", "a"]`.
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        find_cycle(&self.graph).map(|path| {
            path.into_iter()
                .map(|idx| self.graph[idx].name.clone())
                .collect()
        })
    }

    /// Fail with [`Error::CycleDetected`] naming the cycle path if the graph is cyclic.
    ///
    /// # Errors
    ///
    /// Returns an error if a cycle exists.
    pub fn ensure_acyclic(&self) -> Result<()> {
        match self.find_cycle() {
            Some(cycle) => Err(Error::CycleDetected { cycle }),
            None => Ok(()),
        }
    }

    /// Get topologically sorted list of tasks, dependencies first.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn topological_sort(&self) -> Result<TopologicalOrder<T>> {
        self.ensure_acyclic()?;

        match toposort(&self.graph, None) {
            // Edges point at dependencies, so reverse to run them first
            Ok(sorted_indices) => Ok(sorted_indices
                .into_iter()
                .rev()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(_) => Err(Error::TopologicalSortFailed {
                reason: "petgraph toposort failed".to_string(),
            }),
        }
    }

    /// Get the number of tasks in the graph.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if a task exists in the graph.
    #[must_use]
    pub fn contains_task(&self, name: &str) -> bool {
        self.name_to_node.contains_key(name)
    }

    /// Iterate over all nodes in the graph.
    pub fn iter_nodes(&self) -> impl Iterator<Item = (NodeIndex, &GraphNode<T>)> {
        self.graph.node_references()
    }

    /// Add a task and all of its transitive dependencies.
    ///
    /// `get_task` returns the task data for a name. Names it cannot resolve
    /// are left out of the graph and reported by
    /// [`add_dependency_edges`](Self::add_dependency_edges), which must be
    /// called after the last root has been added.
    ///
    /// # Errors
    ///
    /// Returns an error if a task cannot be added.
    pub fn add_with_dependencies<F>(&mut self, task_name: &str, mut get_task: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<T>,
    {
        let mut to_process = vec![task_name.to_string()];
        let mut processed = HashSet::new();

        debug!("Collecting '{}' and its dependencies", task_name);

        while let Some(current_name) = to_process.pop() {
            if !processed.insert(current_name.clone()) || self.contains_task(&current_name) {
                continue;
            }

            if let Some(task) = get_task(&current_name) {
                let deps: Vec<String> = task.dependency_names().map(String::from).collect();

                self.add_task(&current_name, task)?;

                for dep in deps {
                    if !processed.contains(&dep) {
                        to_process.push(dep);
                    }
                }
            } else {
                debug!("Task '{}' not found while building graph", current_name);
            }
        }

        Ok(())
    }
}

impl<T: TaskNodeData> Default for TaskGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}
