use anyhow::{Context, Result};
use log::{debug, info};
use petgraph::{
    dot::{Config, Dot},
    graph::{DiGraph, EdgeIndex, NodeIndex},
    visit::EdgeRef,
    Direction,
};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::models::PackageSet;
use crate::parsers::parse_dependency;
use crate::reporting::{LogReporter, SkipEvent, SkipReporter};
use crate::versions;
use crate::vulnerability_index::VulnerabilityIndex;

/// Edge label used for the Python requirement of a dependency that declares none
pub const ANY_PYTHON: &str = "Any";

/// A package node with its vulnerability status
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageNode {
    pub name: String,
    pub is_vulnerable: bool,
    pub vulnerability_ids: BTreeSet<String>,
}

impl fmt::Display for PackageNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_vulnerable {
            write!(f, "{} ({} vulnerabilities)", self.name, self.vulnerability_ids.len())
        } else {
            write!(f, "{}", self.name)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Depends,
}

/// A `depends` edge, labelled with the dependency's own Python requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub relation: Relation,
    pub python_version_requirement: String,
}

impl fmt::Display for DependencyEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "depends (python {})", self.python_version_requirement)
    }
}

/// Directed package dependency graph. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    graph: DiGraph<PackageNode, DependencyEdge>,
    node_map: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a package node unless one with the same name exists; returns its index
    pub fn add_package(&mut self, name: &str, vulnerability_ids: BTreeSet<String>) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            return index;
        }
        let node = PackageNode {
            name: name.to_string(),
            is_vulnerable: !vulnerability_ids.is_empty(),
            vulnerability_ids,
        };
        let index = self.graph.add_node(node);
        self.node_map.insert(name.to_string(), index);
        debug!("Added node for package {}", name);
        index
    }

    /// Adds (or refreshes) the edge `from -> to`; never creates a parallel edge.
    /// A missing or blank requirement is labelled [`ANY_PYTHON`].
    pub fn add_dependency(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        python_requirement: Option<&str>,
    ) -> EdgeIndex {
        let edge = DependencyEdge {
            relation: Relation::Depends,
            python_version_requirement: python_requirement
                .filter(|requirement| !requirement.trim().is_empty())
                .unwrap_or(ANY_PYTHON)
                .to_string(),
        };
        self.graph.update_edge(from, to, edge)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_map.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<NodeIndex> {
        self.node_map.get(name).copied()
    }

    pub fn node(&self, name: &str) -> Option<&PackageNode> {
        self.index_of(name).map(|index| &self.graph[index])
    }

    pub fn package(&self, index: NodeIndex) -> &PackageNode {
        &self.graph[index]
    }

    pub fn name(&self, index: NodeIndex) -> &str {
        &self.graph[index].name
    }

    /// Node indices in insertion order
    pub fn node_indices(&self) -> impl Iterator<Item = NodeIndex> {
        self.graph.node_indices()
    }

    /// Nodes in insertion order
    pub fn packages(&self) -> impl Iterator<Item = &PackageNode> {
        self.graph.node_weights()
    }

    /// Edges as `(from, to, edge)` by name, in insertion order
    pub fn dependency_edges(&self) -> impl Iterator<Item = (&str, &str, &DependencyEdge)> {
        self.graph.edge_references().map(|edge| {
            (
                self.graph[edge.source()].name.as_str(),
                self.graph[edge.target()].name.as_str(),
                edge.weight(),
            )
        })
    }

    fn neighbors_in_insertion_order(&self, index: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(index, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.id(), other)
            })
            .collect();
        edges.sort_unstable_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, other)| other).collect()
    }

    /// Direct dependencies of a node, in edge insertion order
    pub fn dependencies(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.neighbors_in_insertion_order(index, Direction::Outgoing)
    }

    /// Direct dependents of a node, in edge insertion order
    pub fn dependents(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.neighbors_in_insertion_order(index, Direction::Incoming)
    }

    pub fn out_degree(&self, index: NodeIndex) -> usize {
        self.graph.edges_directed(index, Direction::Outgoing).count()
    }

    pub fn in_degree(&self, index: NodeIndex) -> usize {
        self.graph.edges_directed(index, Direction::Incoming).count()
    }

    /// The underlying petgraph graph
    pub fn inner(&self) -> &DiGraph<PackageNode, DependencyEdge> {
        &self.graph
    }

    /// Export the graph to DOT format
    pub fn export_dot<P: AsRef<Path>>(&self, output_path: P) -> Result<()> {
        let mut file = File::create(output_path.as_ref())
            .with_context(|| format!("Failed to create graph file: {:?}", output_path.as_ref()))?;
        let dot = Dot::with_config(&self.graph, &[Config::EdgeNoLabel]);
        write!(file, "{}", dot)?;
        Ok(())
    }
}

/// Counters collected while building a graph
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BuildStats {
    pub packages: usize,
    pub declared_dependencies: usize,
    pub unparsable: usize,
    pub constrained: usize,
    pub incompatible: usize,
    pub edges: usize,
}

/// Builds a [`DependencyGraph`] from package records and a vulnerability index
pub struct GraphBuilder<'a> {
    packages: &'a PackageSet,
    index: &'a VulnerabilityIndex,
    reporter: &'a dyn SkipReporter,
    stats: BuildStats,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(packages: &'a PackageSet, index: &'a VulnerabilityIndex) -> Self {
        GraphBuilder {
            packages,
            index,
            reporter: &LogReporter,
            stats: BuildStats::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: &'a dyn SkipReporter) -> Self {
        self.reporter = reporter;
        self
    }

    fn add_package_node(&self, graph: &mut DependencyGraph, name: &str) -> NodeIndex {
        graph.add_package(name, self.index.vulnerability_ids(name))
    }

    /// Builds the graph and returns it with the build counters
    pub fn build(mut self) -> (DependencyGraph, BuildStats) {
        let packages = self.packages;
        info!("Creating dependency graph from {} packages", packages.len());
        let mut graph = DependencyGraph::new();

        for package in packages.iter() {
            self.stats.packages += 1;
            let from = self.add_package_node(&mut graph, &package.name);
            let package_python = package.require_python.as_deref();

            for raw in &package.require_dist {
                self.stats.declared_dependencies += 1;
                let Some(requirement) = parse_dependency(raw) else {
                    self.stats.unparsable += 1;
                    self.reporter.report(SkipEvent::UnparsableDependency {
                        package: package.name.clone(),
                        raw: raw.clone(),
                    });
                    continue;
                };

                // Only bare dependency names become edges. Version-pinned,
                // extras and marker-qualified declarations are dropped here,
                // which leaves most real-world dependencies out of the graph.
                if !requirement.is_unconstrained() {
                    self.stats.constrained += 1;
                    self.reporter.report(SkipEvent::ConstrainedDependency {
                        package: package.name.clone(),
                        raw: raw.clone(),
                    });
                    continue;
                }

                let dependency_python = packages
                    .get(&requirement.name)
                    .and_then(|dependency| dependency.require_python.as_deref());

                let checked = versions::check_compatibility(package_python, dependency_python);
                let compatible = match checked {
                    Ok(compatible) => compatible,
                    Err(e) => {
                        self.reporter.report(SkipEvent::UnparsableVersion {
                            specifier: format!(
                                "{} / {}",
                                package_python.unwrap_or(ANY_PYTHON),
                                dependency_python.unwrap_or(ANY_PYTHON)
                            ),
                            reason: e.to_string(),
                        });
                        false
                    }
                };
                if !compatible {
                    self.stats.incompatible += 1;
                    self.reporter.report(SkipEvent::IncompatiblePython {
                        package: package.name.clone(),
                        dependency: requirement.name.clone(),
                        package_requirement: package_python.unwrap_or(ANY_PYTHON).to_string(),
                        dependency_requirement: dependency_python.unwrap_or(ANY_PYTHON).to_string(),
                    });
                    continue;
                }

                let to = self.add_package_node(&mut graph, &requirement.name);
                graph.add_dependency(from, to, dependency_python);
                debug!(
                    "Added edge from {} to {} with Python requirement: {}",
                    package.name,
                    requirement.name,
                    dependency_python.unwrap_or(ANY_PYTHON)
                );
            }
        }

        self.stats.edges = graph.edge_count();
        info!(
            "Dependency graph construction completed: {} nodes, {} edges ({} constrained, {} incompatible, {} unparsable dependencies skipped)",
            graph.node_count(),
            graph.edge_count(),
            self.stats.constrained,
            self.stats.incompatible,
            self.stats.unparsable
        );
        (graph, self.stats)
    }
}

/// Builds the dependency graph, reporting skipped dependencies through the `log` facade
pub fn build_dependency_graph(packages: &PackageSet, index: &VulnerabilityIndex) -> DependencyGraph {
    GraphBuilder::new(packages, index).build().0
}
