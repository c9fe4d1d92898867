pub mod centrality;
pub mod cli;
pub mod error;
pub mod exporters;
pub mod graph;
pub mod metrics;
pub mod models;
pub mod parsers;
pub mod propagation;
pub mod reporting;
pub mod structure;
pub mod versions;
pub mod vulnerability_index;

// Re-export commonly used modules and types
pub use error::AnalysisError;
pub use graph::{build_dependency_graph, DependencyGraph, GraphBuilder};
pub use metrics::{compute_metric, compute_metrics, MetricContext, MetricKind};
pub use models::{PackageRecord, PackageSet, VulnerabilityRecord};
pub use parsers::{load_advisories, load_package_records};
pub use vulnerability_index::VulnerabilityIndex;
