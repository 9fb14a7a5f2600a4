//! Error types for task graph operations.

use thiserror::Error;

/// Result type for task graph operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during task graph operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A dependency cycle was detected in the graph.
    #[error("Cycle detected in task graph: {}", cycle.join(" -> "))]
    CycleDetected {
        /// Task names along the cycle, starting and ending with the same task.
        cycle: Vec<String>,
    },

    /// Tasks depend on tasks that are not in the graph.
    #[error("Missing dependencies: {}", format_missing(missing))]
    MissingDependencies {
        /// List of (task, missing_dependency) pairs.
        missing: Vec<(String, String)>,
    },

    /// Failed to perform topological sort.
    #[error("Failed to sort tasks topologically: {reason}")]
    TopologicalSortFailed {
        /// Reason for the failure.
        reason: String,
    },
}

fn format_missing(missing: &[(String, String)]) -> String {
    missing
        .iter()
        .map(|(task, dep)| format!("Task '{task}' depends on missing task '{dep}'"))
        .collect::<Vec<_>>()
        .join(", ")
}
