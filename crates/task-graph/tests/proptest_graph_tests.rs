//! Property-based tests for task graph invariants.
//!
//! These tests verify the behavioral contracts of the task graph:
//! - Topological sort respects all dependencies
//! - Cycle detection is accurate and reports a real cycle

use cairn_task_graph::{Error, TaskGraph, TaskNodeData};
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};

// =============================================================================
// Test Task Type
// =============================================================================

#[derive(Clone, Debug)]
struct PropTask {
    deps: Vec<String>,
}

impl TaskNodeData for PropTask {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.deps.iter().map(String::as_str)
    }
}

// =============================================================================
// Strategies for generating test data
// =============================================================================

/// Generate a valid task id (`app.task`).
fn task_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,6}\\.[a-z][a-z0-9_]{0,8}".prop_map(String::from)
}

fn unique(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .enumerate()
        .map(|(i, name)| format!("{name}_{i}"))
        .collect()
}

/// Generate a DAG: dependencies only point at tasks with lower indices.
fn dag_strategy(
    min_tasks: usize,
    max_tasks: usize,
) -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (min_tasks..=max_tasks).prop_flat_map(|task_count| {
        proptest::collection::vec(task_name_strategy(), task_count).prop_flat_map(move |names| {
            let unique_names = unique(names);

            let dep_strategies: Vec<_> = (0..task_count)
                .map(|i| {
                    if i == 0 {
                        Just(vec![]).boxed()
                    } else {
                        let earlier_names: Vec<String> = unique_names[..i].to_vec();
                        proptest::collection::vec(
                            proptest::sample::select(earlier_names),
                            0..=i.min(3),
                        )
                        .prop_map(|deps| {
                            deps.into_iter()
                                .collect::<HashSet<_>>()
                                .into_iter()
                                .collect()
                        })
                        .boxed()
                    }
                })
                .collect();

            let names_clone = unique_names.clone();
            dep_strategies.prop_map(move |all_deps| {
                names_clone
                    .iter()
                    .cloned()
                    .zip(all_deps)
                    .collect::<Vec<_>>()
            })
        })
    })
}

/// Generate a ring of 1..=6 tasks, each depending on the next (a 1-ring is a self-reference).
fn ring_strategy() -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
    (1..=6_usize).prop_flat_map(|task_count| {
        proptest::collection::vec(task_name_strategy(), task_count).prop_map(move |names| {
            let unique_names = unique(names);
            (0..task_count)
                .map(|i| {
                    (
                        unique_names[i].clone(),
                        vec![unique_names[(i + 1) % task_count].clone()],
                    )
                })
                .collect()
        })
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn build_graph(tasks: &[(String, Vec<String>)]) -> Result<TaskGraph<PropTask>, Error> {
    let mut graph = TaskGraph::new();

    for (name, deps) in tasks {
        graph.add_task(name, PropTask { deps: deps.clone() })?;
    }

    graph.add_dependency_edges()?;
    Ok(graph)
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    /// For every task A that depends on task B, B comes before A.
    #[test]
    fn topological_sort_respects_dependencies(tasks in dag_strategy(1, 15)) {
        let graph = build_graph(&tasks).expect("Graph should build successfully");
        prop_assert!(graph.find_cycle().is_none());

        let sorted = graph.topological_sort().expect("Sort should succeed for DAG");
        let positions: HashMap<String, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, node)| (node.name.clone(), i))
            .collect();

        for (name, deps) in &tasks {
            let task_pos = positions[name];
            for dep in deps {
                prop_assert!(positions[dep] < task_pos);
            }
        }
    }

    /// `has_cycles` and `find_cycle` agree, and rings are always rejected.
    #[test]
    fn rings_are_detected(tasks in ring_strategy()) {
        let graph = build_graph(&tasks).expect("Graph should build successfully");
        prop_assert!(graph.has_cycles());

        let cycle = graph.find_cycle().expect("ring must contain a cycle");
        prop_assert_eq!(cycle.len(), tasks.len() + 1);
        prop_assert_eq!(cycle.first(), cycle.last());
    }

    /// Every reported cycle follows real dependency edges.
    #[test]
    fn reported_cycle_follows_edges(
        tasks in dag_strategy(2, 10),
        back_edge in any::<prop::sample::Index>(),
    ) {
        // Close a cycle by making the first task depend on some later task
        // that (transitively) depends on it, or on itself.
        let mut tasks = tasks;
        let target = tasks[back_edge.index(tasks.len())].0.clone();
        tasks[0].1.push(target);

        let graph = build_graph(&tasks).expect("Graph should build successfully");
        let deps: HashMap<&str, &Vec<String>> =
            tasks.iter().map(|(n, d)| (n.as_str(), d)).collect();

        prop_assert_eq!(graph.has_cycles(), graph.find_cycle().is_some());
        if let Some(cycle) = graph.find_cycle() {
            for pair in cycle.windows(2) {
                prop_assert!(deps[pair[0].as_str()].contains(&pair[1]));
            }
        }
    }
}
