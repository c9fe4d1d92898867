//! Centrality scores over the dependency graph.
//!
//! Iterative scores that fail to converge yield an empty map and a warning
//! instead of an error, so that one metric cannot abort a batch.

use log::warn;
use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use std::collections::{BTreeMap, VecDeque};

use crate::graph::DependencyGraph;

const MAX_ITERATIONS: usize = 100;
const TOLERANCE: f64 = 1e-6;
const DAMPING: f64 = 0.85;

fn by_name(graph: &DependencyGraph, scores: Vec<f64>) -> BTreeMap<String, f64> {
    graph
        .node_indices()
        .zip(scores)
        .map(|(node, score)| (graph.name(node).to_string(), score))
        .collect()
}

/// Adjacency by position, in edge insertion order
fn adjacency(graph: &DependencyGraph, incoming: bool) -> Vec<Vec<usize>> {
    graph
        .node_indices()
        .map(|node| {
            let neighbors = if incoming {
                graph.dependents(node)
            } else {
                graph.dependencies(node)
            };
            neighbors.into_iter().map(NodeIndex::index).collect()
        })
        .collect()
}

/// (in + out degree) / (n - 1); every node scores 1 when n <= 1
pub fn degree_centrality(graph: &DependencyGraph) -> BTreeMap<String, f64> {
    let n = graph.node_count();
    if n <= 1 {
        return graph.packages().map(|p| (p.name.clone(), 1.0)).collect();
    }
    let scale = 1.0 / (n - 1) as f64;
    graph
        .node_indices()
        .map(|node| {
            let degree = graph.in_degree(node) + graph.out_degree(node);
            (graph.name(node).to_string(), degree as f64 * scale)
        })
        .collect()
}

/// Shortest-path dependency accumulation from one source (Brandes)
fn single_source_dependency(successors: &[Vec<usize>], source: usize) -> Vec<f64> {
    let n = successors.len();
    let mut order = Vec::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut distance = vec![usize::MAX; n];
    let mut queue = VecDeque::new();

    sigma[source] = 1.0;
    distance[source] = 0;
    queue.push_back(source);
    while let Some(v) = queue.pop_front() {
        order.push(v);
        for &w in &successors[v] {
            if distance[w] == usize::MAX {
                distance[w] = distance[v] + 1;
                queue.push_back(w);
            }
            if distance[w] == distance[v] + 1 {
                sigma[w] += sigma[v];
                predecessors[w].push(v);
            }
        }
    }

    let mut delta = vec![0.0f64; n];
    while let Some(w) = order.pop() {
        for &v in &predecessors[w] {
            delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
        }
    }
    delta[source] = 0.0;
    delta
}

/// Betweenness centrality of every node, normalized by `1 / ((n-1)(n-2))` when n > 2
pub fn betweenness_centrality(graph: &DependencyGraph) -> BTreeMap<String, f64> {
    let n = graph.node_count();
    let successors = adjacency(graph, false);

    let mut scores = (0..n)
        .into_par_iter()
        .map(|source| single_source_dependency(&successors, source))
        .reduce(
            || vec![0.0; n],
            |mut acc, delta| {
                acc.iter_mut().zip(delta).for_each(|(a, d)| *a += d);
                acc
            },
        );

    if n > 2 {
        let scale = 1.0 / ((n - 1) * (n - 2)) as f64;
        scores.iter_mut().for_each(|score| *score *= scale);
    }
    by_name(graph, scores)
}

/// Closeness over incoming distances, scaled by the share of nodes that reach each node
pub fn closeness_centrality(graph: &DependencyGraph) -> BTreeMap<String, f64> {
    let n = graph.node_count();
    let predecessors = adjacency(graph, true);

    let scores: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|target| {
            let mut distance = vec![usize::MAX; n];
            let mut queue = VecDeque::from([target]);
            distance[target] = 0;
            let (mut reached, mut total) = (0usize, 0usize);
            while let Some(v) = queue.pop_front() {
                for &u in &predecessors[v] {
                    if distance[u] == usize::MAX {
                        distance[u] = distance[v] + 1;
                        reached += 1;
                        total += distance[u];
                        queue.push_back(u);
                    }
                }
            }
            if total == 0 || n <= 1 {
                return 0.0;
            }
            let closeness = reached as f64 / total as f64;
            closeness * reached as f64 / (n - 1) as f64
        })
        .collect();
    by_name(graph, scores)
}

/// Eigenvector centrality by power iteration over incoming edges
pub fn eigenvector_centrality(graph: &DependencyGraph) -> BTreeMap<String, f64> {
    let n = graph.node_count();
    if n == 0 {
        return BTreeMap::new();
    }
    let successors = adjacency(graph, false);
    let mut x = vec![1.0 / n as f64; n];

    for _ in 0..MAX_ITERATIONS {
        let last = x.clone();
        for (u, targets) in successors.iter().enumerate() {
            for &v in targets {
                x[v] += last[u];
            }
        }
        let norm = x.iter().map(|value| value * value).sum::<f64>().sqrt();
        let norm = if norm == 0.0 { 1.0 } else { norm };
        x.iter_mut().for_each(|value| *value /= norm);

        let error: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if error < n as f64 * TOLERANCE {
            return by_name(graph, x);
        }
    }
    warn!("Eigenvector centrality computation did not converge in {} iterations", MAX_ITERATIONS);
    BTreeMap::new()
}

/// PageRank with uniform teleport and dangling-node redistribution
pub fn pagerank(graph: &DependencyGraph) -> BTreeMap<String, f64> {
    let n = graph.node_count();
    if n == 0 {
        return BTreeMap::new();
    }
    let successors = adjacency(graph, false);
    let uniform = 1.0 / n as f64;
    let mut x = vec![uniform; n];

    for _ in 0..MAX_ITERATIONS {
        let last = x.clone();
        let dangling: f64 = successors
            .iter()
            .zip(&last)
            .filter(|(targets, _)| targets.is_empty())
            .map(|(_, score)| score)
            .sum();

        x.iter_mut()
            .for_each(|value| *value = DAMPING * dangling * uniform + (1.0 - DAMPING) * uniform);
        for (u, targets) in successors.iter().enumerate() {
            if targets.is_empty() {
                continue;
            }
            let share = DAMPING * last[u] / targets.len() as f64;
            for &v in targets {
                x[v] += share;
            }
        }

        let error: f64 = x.iter().zip(&last).map(|(a, b)| (a - b).abs()).sum();
        if error < n as f64 * TOLERANCE {
            return by_name(graph, x);
        }
    }
    warn!("PageRank computation did not converge in {} iterations", MAX_ITERATIONS);
    BTreeMap::new()
}
