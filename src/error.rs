use thiserror::Error;

/// Errors raised by queries against a built dependency graph.
///
/// These indicate a caller contract violation (an unknown node, a missing
/// argument) rather than a data-quality problem in the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    /// A seed passed to a reach computation is not a node of the graph
    #[error("invalid seed set: `{0}` is not a node of the dependency graph")]
    UnknownSeed(String),

    /// The start node of a path query is not a node of the graph
    #[error("invalid start node: `{0}` is not a node of the dependency graph")]
    UnknownStartNode(String),

    /// A ratio over the node count was requested on a graph without nodes
    #[error("the dependency graph has no nodes")]
    EmptyGraph,

    /// A metric was requested without an input it cannot run without
    #[error("metric `{metric}` requires {what}")]
    MissingArgument {
        metric: &'static str,
        what: &'static str,
    },
}

impl AnalysisError {
    /// Whether the error was caused by invalid query input
    pub fn is_input_validation(&self) -> bool {
        !matches!(self, AnalysisError::EmptyGraph)
    }
}
