use anyhow::{Context, Result};
use clap::ValueEnum;
use log::info;
use rayon::prelude::*;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;

use crate::centrality;
use crate::error::AnalysisError;
use crate::graph::DependencyGraph;
use crate::propagation::{self, NetworkReach};
use crate::structure;

/// Every metric the tool can compute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum MetricKind {
    #[clap(name = "nodes_and_edges")]
    NodesAndEdges,
    #[clap(name = "density")]
    Density,
    #[clap(name = "in_degree")]
    InDegree,
    #[clap(name = "out_degree")]
    OutDegree,
    #[clap(name = "average_degree")]
    AverageDegree,
    #[clap(name = "clustering_coefficient")]
    ClusteringCoefficient,
    #[clap(name = "degree_centrality")]
    DegreeCentrality,
    #[clap(name = "betweenness_centrality")]
    BetweennessCentrality,
    #[clap(name = "closeness_centrality")]
    ClosenessCentrality,
    #[clap(name = "eigenvector_centrality")]
    EigenvectorCentrality,
    #[clap(name = "pagerank")]
    PageRank,
    #[clap(name = "num_of_reachable_packages")]
    ReachableCount,
    #[clap(name = "num_of_vul_per_package")]
    VulnerabilitySuccessors,
    #[clap(name = "percentage_of_network_reached")]
    NetworkReachPercentage,
    #[clap(name = "longest_path")]
    LongestPath,
    #[clap(name = "packages_reached_by_vuln")]
    VulnerabilityExposure,
}

impl MetricKind {
    /// Name used on the command line and as the key of the result file
    pub fn name(self) -> &'static str {
        match self {
            MetricKind::NodesAndEdges => "nodes_and_edges",
            MetricKind::Density => "density",
            MetricKind::InDegree => "in_degree",
            MetricKind::OutDegree => "out_degree",
            MetricKind::AverageDegree => "average_degree",
            MetricKind::ClusteringCoefficient => "clustering_coefficient",
            MetricKind::DegreeCentrality => "degree_centrality",
            MetricKind::BetweennessCentrality => "betweenness_centrality",
            MetricKind::ClosenessCentrality => "closeness_centrality",
            MetricKind::EigenvectorCentrality => "eigenvector_centrality",
            MetricKind::PageRank => "pagerank",
            MetricKind::ReachableCount => "num_of_reachable_packages",
            MetricKind::VulnerabilitySuccessors => "num_of_vul_per_package",
            MetricKind::NetworkReachPercentage => "percentage_of_network_reached",
            MetricKind::LongestPath => "longest_path",
            MetricKind::VulnerabilityExposure => "packages_reached_by_vuln",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Query inputs some metrics need
#[derive(Debug, Clone, Default)]
pub struct MetricContext {
    /// Seed packages for the network reach percentage
    pub subset: Vec<String>,
    /// Start package for the longest path
    pub start_node: Option<String>,
}

/// Per-vulnerable-package summary written for `num_of_vul_per_package`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VulnerableSuccessors {
    pub vulnerability_ids: BTreeSet<String>,
    pub successors: BTreeSet<String>,
    pub reached_packages: usize,
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).context("Failed to serialize metric result")
}

/// Computes one metric and returns its result keyed by result name
pub fn compute_metric(
    kind: MetricKind,
    graph: &DependencyGraph,
    ctx: &MetricContext,
) -> Result<Value> {
    info!("Computing {}...", kind);
    let result = match kind {
        MetricKind::NodesAndEdges => to_value(&structure::nodes_and_edges(graph))?,
        MetricKind::Density => json!({ "density": structure::density(graph) }),
        MetricKind::InDegree => json!({ "in_degrees": structure::in_degrees(graph) }),
        MetricKind::OutDegree => json!({ "out_degrees": structure::out_degrees(graph) }),
        MetricKind::AverageDegree => {
            json!({ "average_degree": structure::average_degree(graph) })
        }
        MetricKind::ClusteringCoefficient => {
            json!({ "average_clustering_coefficient": structure::average_clustering(graph) })
        }
        MetricKind::DegreeCentrality => {
            json!({ "degree_centrality": centrality::degree_centrality(graph) })
        }
        MetricKind::BetweennessCentrality => {
            json!({ "betweenness_centrality": centrality::betweenness_centrality(graph) })
        }
        MetricKind::ClosenessCentrality => {
            json!({ "closeness_centrality": centrality::closeness_centrality(graph) })
        }
        MetricKind::EigenvectorCentrality => {
            json!({ "eigenvector_centrality": centrality::eigenvector_centrality(graph) })
        }
        MetricKind::PageRank => json!({ "pagerank": centrality::pagerank(graph) }),
        MetricKind::ReachableCount => {
            json!({ "num_of_reachable_packages": propagation::reachable_counts(graph) })
        }
        MetricKind::VulnerabilitySuccessors => {
            let mut summaries = Map::new();
            for (package, successors) in propagation::vulnerability_successors(graph) {
                let vulnerability_ids = graph
                    .node(&package)
                    .map(|node| node.vulnerability_ids.clone())
                    .unwrap_or_default();
                let summary = VulnerableSuccessors {
                    vulnerability_ids,
                    reached_packages: successors.len(),
                    successors,
                };
                summaries.insert(package, to_value(&summary)?);
            }
            json!({ "vulnerable_package_successors": summaries })
        }
        MetricKind::NetworkReachPercentage => {
            if ctx.subset.is_empty() {
                return Err(AnalysisError::MissingArgument {
                    metric: kind.name(),
                    what: "a non-empty seed subset",
                }
                .into());
            }
            let percentage = propagation::network_reach_percentage(graph, &ctx.subset)?;
            let reach = NetworkReach {
                subset: ctx.subset.clone(),
                percentage,
            };
            json!({ "percentage_of_network_reached": to_value(&reach)? })
        }
        MetricKind::LongestPath => {
            let start = ctx.start_node.as_deref().ok_or(AnalysisError::MissingArgument {
                metric: kind.name(),
                what: "a start node",
            })?;
            let longest = propagation::longest_path(graph, start)?;
            json!({ "longest_path": to_value(&longest)? })
        }
        MetricKind::VulnerabilityExposure => {
            let partition = propagation::vulnerability_exposure(graph);
            json!({
                "number_of_packages_reached_by_vulnerable": partition.reaching_vulnerable.len(),
                "number_of_packages_non_reached_by_vulnerable": partition.not_reaching_vulnerable.len(),
                "packages_reached_vulnerable": partition.reaching_vulnerable,
                "packages_non_reached_vulnerable": partition.not_reaching_vulnerable,
            })
        }
    };
    Ok(result)
}

/// Computes several metrics in parallel over the same graph.
///
/// The returned map is keyed by metric name; a metric listed twice is computed once.
pub fn compute_metrics(
    kinds: &[MetricKind],
    graph: &DependencyGraph,
    ctx: &MetricContext,
) -> Result<Map<String, Value>> {
    let mut unique = Vec::new();
    for kind in kinds {
        if !unique.contains(kind) {
            unique.push(*kind);
        }
    }

    let computed: Vec<Result<(MetricKind, Value)>> = unique
        .par_iter()
        .map(|&kind| {
            compute_metric(kind, graph, ctx)
                .with_context(|| format!("Failed to compute {}", kind))
                .map(|value| (kind, value))
        })
        .collect();

    let mut results = Map::new();
    for entry in computed {
        let (kind, value) = entry?;
        results.insert(kind.name().to_string(), value);
    }
    Ok(results)
}
