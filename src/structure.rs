use petgraph::graph::NodeIndex;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use crate::graph::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodesAndEdges {
    pub num_nodes: usize,
    pub num_edges: usize,
}

pub fn nodes_and_edges(graph: &DependencyGraph) -> NodesAndEdges {
    NodesAndEdges {
        num_nodes: graph.node_count(),
        num_edges: graph.edge_count(),
    }
}

/// Edge count over `n(n-1)/2`; 0 for graphs with fewer than two nodes
pub fn density(graph: &DependencyGraph) -> f64 {
    let nodes = graph.node_count() as f64;
    let max_edges = nodes * (nodes - 1.0) / 2.0;
    if max_edges > 0.0 {
        graph.edge_count() as f64 / max_edges
    } else {
        0.0
    }
}

pub fn in_degrees(graph: &DependencyGraph) -> BTreeMap<String, usize> {
    graph
        .node_indices()
        .map(|node| (graph.name(node).to_string(), graph.in_degree(node)))
        .collect()
}

pub fn out_degrees(graph: &DependencyGraph) -> BTreeMap<String, usize> {
    graph
        .node_indices()
        .map(|node| (graph.name(node).to_string(), graph.out_degree(node)))
        .collect()
}

/// Mean of in-degree plus out-degree over all nodes
pub fn average_degree(graph: &DependencyGraph) -> f64 {
    if graph.is_empty() {
        return 0.0;
    }
    let total: usize = graph
        .node_indices()
        .map(|node| graph.in_degree(node) + graph.out_degree(node))
        .sum();
    total as f64 / graph.node_count() as f64
}

/// Neighbor positions of every node, self-loops removed
fn neighbor_sets(graph: &DependencyGraph, incoming: bool) -> Vec<HashSet<usize>> {
    graph
        .node_indices()
        .map(|node| {
            let neighbors = if incoming {
                graph.dependents(node)
            } else {
                graph.dependencies(node)
            };
            neighbors
                .into_iter()
                .map(NodeIndex::index)
                .filter(|&other| other != node.index())
                .collect()
        })
        .collect()
}

/// Directed clustering of one node (Fagiolo): directed triangles through the
/// node over the triangles its total and reciprocal degrees allow.
fn local_clustering(preds: &[HashSet<usize>], succs: &[HashSet<usize>], node: usize) -> f64 {
    let (node_preds, node_succs) = (&preds[node], &succs[node]);
    let triangles: usize = node_preds
        .iter()
        .chain(node_succs.iter())
        .map(|&other| {
            let (other_preds, other_succs) = (&preds[other], &succs[other]);
            node_preds.intersection(other_preds).count()
                + node_preds.intersection(other_succs).count()
                + node_succs.intersection(other_preds).count()
                + node_succs.intersection(other_succs).count()
        })
        .sum();
    if triangles == 0 {
        return 0.0;
    }

    let total_degree = node_preds.len() + node_succs.len();
    let reciprocal = node_preds.intersection(node_succs).count();
    let possible = 2 * (total_degree * (total_degree - 1) - 2 * reciprocal);
    triangles as f64 / possible as f64
}

/// Mean directed clustering coefficient over all nodes, nodes without triangles included.
/// 0 for an empty graph.
pub fn average_clustering(graph: &DependencyGraph) -> f64 {
    let n = graph.node_count();
    if n == 0 {
        return 0.0;
    }
    let preds = neighbor_sets(graph, true);
    let succs = neighbor_sets(graph, false);

    let coefficients: Vec<f64> = (0..n)
        .into_par_iter()
        .map(|node| local_clustering(&preds, &succs, node))
        .collect();
    coefficients.iter().sum::<f64>() / n as f64
}
