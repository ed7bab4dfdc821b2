//! Error types for the texscope IR.

/// Errors raised while building or inspecting a graph.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// A handle index is out of bounds for the graph's arena.
    #[error("handle index {index} out of bounds (graph size: {size})")]
    BadHandle { index: usize, size: usize },

    /// A shape dimension was not a literal integer where one is required.
    #[error("dimension {axis} of shape {shape} is symbolic ('{name}'), expected a literal size")]
    SymbolicDimension {
        axis: usize,
        name: String,
        shape: String,
    },

    /// A node of one kind was found where another was expected.
    #[error("node {node} is a {found}, expected {expected}")]
    UnexpectedNode {
        node: String,
        expected: &'static str,
        found: &'static str,
    },
}
