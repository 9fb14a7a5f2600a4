//! Traversal algorithms and types for task graphs.

use crate::GraphNode;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};

/// A topologically sorted sequence of task nodes.
///
/// All dependencies come before the tasks that depend on them.
pub type TopologicalOrder<T> = Vec<GraphNode<T>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Unvisited,
    InProgress,
    Done,
}

/// Find one cycle with a three-colour depth-first search.
///
/// Roots are tried in node insertion order and successors in edge insertion
/// order, so the reported cycle is deterministic for a given graph. The
/// returned path follows edge direction and repeats its first node at the
/// end; a self-loop yields `[n, n]`.
pub(crate) fn find_cycle<N, E>(graph: &DiGraph<N, E>) -> Option<Vec<NodeIndex>> {
    let mut colors = vec![Color::Unvisited; graph.node_count()];

    for root in graph.node_indices() {
        if colors[root.index()] != Color::Unvisited {
            continue;
        }

        // Explicit stack of (node, successors, next successor position)
        let mut stack: Vec<(NodeIndex, Vec<NodeIndex>, usize)> =
            vec![(root, successors(graph, root), 0)];
        colors[root.index()] = Color::InProgress;

        while let Some((node, succ, pos)) = stack.last_mut() {
            let Some(&next) = succ.get(*pos) else {
                colors[node.index()] = Color::Done;
                stack.pop();
                continue;
            };
            *pos += 1;

            match colors[next.index()] {
                Color::Unvisited => {
                    colors[next.index()] = Color::InProgress;
                    let next_succ = successors(graph, next);
                    stack.push((next, next_succ, 0));
                }
                Color::InProgress => {
                    // `next` is on the current DFS path; the cycle is the path
                    // suffix starting at it.
                    let start = stack.iter().position(|(n, _, _)| *n == next)?;
                    let mut cycle: Vec<NodeIndex> =
                        stack[start..].iter().map(|(n, _, _)| *n).collect();
                    cycle.push(next);
                    return Some(cycle);
                }
                Color::Done => {}
            }
        }
    }

    None
}

fn successors<N, E>(graph: &DiGraph<N, E>, node: NodeIndex) -> Vec<NodeIndex> {
    // petgraph yields the most recently added edge first
    let mut succ: Vec<NodeIndex> = graph.neighbors_directed(node, Direction::Outgoing).collect();
    succ.reverse();
    succ
}
