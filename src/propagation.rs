//! Vulnerability propagation analyses over a built [`DependencyGraph`].
//!
//! Every analysis is a read-only traversal: the graph is shared, never
//! mutated, and all traversals keep their own visited state on an explicit
//! stack so deep or cyclic dependency chains cannot exhaust the call stack.
//! Independent traversals run on the rayon pool.

use log::{debug, info};
use petgraph::algo::kosaraju_scc;
use petgraph::graph::NodeIndex;
use petgraph::visit::{Dfs, EdgeRef};
use petgraph::Direction;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::AnalysisError;
use crate::graph::{DependencyGraph, Relation};

/// Nodes reachable from `start` through outgoing edges, excluding `start` itself
pub fn reachable_set(graph: &DependencyGraph, start: NodeIndex) -> HashSet<NodeIndex> {
    let inner = graph.inner();
    let mut dfs = Dfs::new(inner, start);
    let mut reached = HashSet::new();
    while let Some(node) = dfs.next(inner) {
        if node != start {
            reached.insert(node);
        }
    }
    reached
}

/// Size of the closure of `start`, `start` included
fn closure_size(graph: &DependencyGraph, start: NodeIndex) -> usize {
    let inner = graph.inner();
    let mut dfs = Dfs::new(inner, start);
    let mut size = 0;
    while dfs.next(inner).is_some() {
        size += 1;
    }
    size
}

/// Number of packages reachable from `package`, computed with a fresh traversal
pub fn reachable_count(graph: &DependencyGraph, package: &str) -> Result<usize, AnalysisError> {
    let start = graph
        .index_of(package)
        .ok_or_else(|| AnalysisError::UnknownStartNode(package.to_string()))?;
    Ok(reachable_set(graph, start).len())
}

/// Number of packages reachable from every package, excluding the package itself.
///
/// Members of one strongly connected component reach exactly the same set
/// of nodes, so each component is traversed once and the result is reused
/// for all of its members.
pub fn reachable_counts(graph: &DependencyGraph) -> BTreeMap<String, usize> {
    let components = kosaraju_scc(graph.inner());
    debug!(
        "Counting reachable packages over {} components of {} nodes",
        components.len(),
        graph.node_count()
    );

    let closures: Vec<usize> = components
        .par_iter()
        .map(|component| closure_size(graph, component[0]))
        .collect();

    let mut counts = BTreeMap::new();
    for (component, closure) in components.iter().zip(closures) {
        for &node in component {
            counts.insert(graph.name(node).to_string(), closure - 1);
        }
    }
    counts
}

/// For every vulnerable package, the packages it reaches (and so may impact).
/// Non-vulnerable packages have no entry.
pub fn vulnerability_successors(graph: &DependencyGraph) -> BTreeMap<String, BTreeSet<String>> {
    let vulnerable: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|&node| graph.package(node).is_vulnerable)
        .collect();

    vulnerable
        .par_iter()
        .map(|&node| {
            let successors = reachable_set(graph, node)
                .into_iter()
                .map(|successor| graph.name(successor).to_string())
                .collect();
            (graph.name(node).to_string(), successors)
        })
        .collect()
}

/// Seeds and the share of the network they reach
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkReach {
    pub subset: Vec<String>,
    pub percentage: f64,
}

/// Fraction of all nodes reachable from at least one seed, seeds included.
pub fn network_reach_percentage<S: AsRef<str>>(
    graph: &DependencyGraph,
    seeds: &[S],
) -> Result<f64, AnalysisError> {
    if graph.is_empty() {
        return Err(AnalysisError::EmptyGraph);
    }
    let starts = seeds
        .iter()
        .map(|seed| {
            graph
                .index_of(seed.as_ref())
                .ok_or_else(|| AnalysisError::UnknownSeed(seed.as_ref().to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let inner = graph.inner();
    let mut dfs = Dfs::empty(inner);
    let mut reached = 0usize;
    for start in starts {
        // The discovered set survives `move_to`, so overlapping closures count once.
        dfs.move_to(start);
        while dfs.next(inner).is_some() {
            reached += 1;
        }
    }
    Ok(reached as f64 / graph.node_count() as f64)
}

/// A longest simple path found from a start node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LongestPath {
    pub start_node: String,
    pub length: usize,
    pub path: Vec<String>,
}

/// Finds a path of maximum edge count starting at `start`, never repeating a
/// node within the path.
///
/// Branches are explored in edge insertion order and the first path reaching
/// the maximum length wins. The search is exhaustive and therefore
/// exponential on densely connected graphs.
pub fn longest_path(graph: &DependencyGraph, start: &str) -> Result<LongestPath, AnalysisError> {
    let start_index = graph
        .index_of(start)
        .ok_or_else(|| AnalysisError::UnknownStartNode(start.to_string()))?;

    let mut path = vec![start_index];
    let mut on_path: HashSet<NodeIndex> = HashSet::from([start_index]);
    let mut frames: Vec<(Vec<NodeIndex>, usize)> = vec![(graph.dependencies(start_index), 0)];
    let mut best = Vec::new();

    while let Some((neighbors, next)) = frames.last_mut() {
        match neighbors.get(*next).copied() {
            Some(neighbor) => {
                *next += 1;
                if on_path.contains(&neighbor) {
                    continue;
                }
                path.push(neighbor);
                on_path.insert(neighbor);
                frames.push((graph.dependencies(neighbor), 0));
            }
            None => {
                // A path can only be maximal once its last node has no unexplored branch.
                if path.len() > best.len() {
                    best.clone_from(&path);
                }
                frames.pop();
                if let Some(node) = path.pop() {
                    on_path.remove(&node);
                }
            }
        }
    }

    Ok(LongestPath {
        start_node: start.to_string(),
        length: best.len() - 1,
        path: best.into_iter().map(|node| graph.name(node).to_string()).collect(),
    })
}

/// Whether `start` is vulnerable or reaches a vulnerable package over `depends` edges.
/// Stops at the first vulnerable node found.
pub fn reaches_vulnerable(graph: &DependencyGraph, start: NodeIndex) -> bool {
    let inner = graph.inner();
    let mut visited = HashSet::new();
    let mut stack = vec![start];

    while let Some(node) = stack.pop() {
        if !visited.insert(node) {
            continue;
        }
        if inner[node].is_vulnerable {
            return true;
        }
        stack.extend(
            inner
                .edges(node)
                .filter(|edge| edge.weight().relation == Relation::Depends)
                .map(|edge| edge.target())
                .filter(|target| !visited.contains(target)),
        );
    }
    false
}

/// Packages split by whether they reach a vulnerable package, in node order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExposurePartition {
    pub reaching_vulnerable: Vec<String>,
    pub not_reaching_vulnerable: Vec<String>,
}

/// Partitions every package by whether it is, or depends transitively on, a vulnerable package.
///
/// Equivalent to running [`reaches_vulnerable`] from every node, computed with
/// one backward traversal from all vulnerable packages over `depends` edges.
pub fn vulnerability_exposure(graph: &DependencyGraph) -> ExposurePartition {
    let inner = graph.inner();
    let mut exposed = vec![false; graph.node_count()];
    let mut stack: Vec<NodeIndex> = graph
        .node_indices()
        .filter(|&node| inner[node].is_vulnerable)
        .collect();
    for node in &stack {
        exposed[node.index()] = true;
    }

    while let Some(node) = stack.pop() {
        for edge in inner.edges_directed(node, Direction::Incoming) {
            let dependent = edge.source();
            if edge.weight().relation == Relation::Depends && !exposed[dependent.index()] {
                exposed[dependent.index()] = true;
                stack.push(dependent);
            }
        }
    }

    let nodes: Vec<NodeIndex> = graph.node_indices().collect();
    let mut partition = ExposurePartition::default();
    for (node, exposed) in nodes.into_iter().zip(exposed) {
        let name = graph.name(node).to_string();
        if exposed {
            partition.reaching_vulnerable.push(name);
        } else {
            partition.not_reaching_vulnerable.push(name);
        }
    }
    info!(
        "{} packages reach a vulnerable package, {} do not",
        partition.reaching_vulnerable.len(),
        partition.not_reaching_vulnerable.len()
    );
    partition
}
