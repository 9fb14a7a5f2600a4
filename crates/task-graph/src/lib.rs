//! Task dependency DAG and cycle detection for cairn.
//!
//! Tasks may consume another task's run metadata. Before any input of such a
//! task is resolved, the whole batch of tasks must be known to be cycle-free;
//! this crate provides the graph used for that check.
//!
//! # Key Types
//!
//! - [`TaskGraph`]: The graph structure for building and querying task dependencies
//! - [`TaskNodeData`]: Trait that task types must implement to be stored in the graph
//! - [`GraphNode`]: A node in the graph containing the task name and data
//!
//! # Example
//!
//! ```ignore
//! use cairn_task_graph::{TaskGraph, TaskNodeData};
//!
//! struct Ref {
//!     needs: Vec<String>,
//! }
//!
//! impl TaskNodeData for Ref {
//!     fn dependency_names(&self) -> impl Iterator<Item = &str> {
//!         self.needs.iter().map(String::as_str)
//!     }
//! }
//!
//! let mut graph = TaskGraph::new();
//! graph.add_task("app.build", Ref { needs: vec![] })?;
//! graph.add_task("app.test", Ref { needs: vec!["app.build".to_string()] })?;
//! graph.add_dependency_edges()?;
//! graph.ensure_acyclic()?;
//! ```

mod error;
mod graph;
mod traversal;

pub use error::{Error, Result};
pub use graph::{GraphNode, TaskGraph};
pub use traversal::TopologicalOrder;

/// Trait for task data that can be stored in the task graph.
pub trait TaskNodeData: Clone {
    /// Returns the names of tasks this task depends on.
    fn dependency_names(&self) -> impl Iterator<Item = &str>;
}
