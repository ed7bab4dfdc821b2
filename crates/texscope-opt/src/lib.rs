//! Graph passes for texscope.
//!
//! Provides a [`Pass`] trait and the [`AnnotateMemoryScope`] pass, which
//! asks the storage analysis registered for a graph's devices where every
//! value should live and writes the answer back into the graph as
//! placement annotations.

mod devices;
mod memory_scope;
mod rewrite;

pub use devices::collect_devices;
pub use memory_scope::{AnnotateMemoryScope, annotate_memory_scope, collect_storage_info};

use std::fmt::Debug;

use texscope_backend_core::StorageError;
use texscope_ir::{Graph, IrError};

/// A pass that transforms a graph.
pub trait Pass: Debug {
    /// Human-readable name of the pass.
    fn name(&self) -> &str;

    /// Run the pass on a graph. Returns `true` if anything was modified.
    fn run(&self, graph: &mut Graph) -> Result<bool, PassError>;
}

/// Errors that abort a pass.
#[derive(Debug, thiserror::Error)]
pub enum PassError {
    /// The storage analysis failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// The input graph is malformed.
    #[error(transparent)]
    Ir(#[from] IrError),
}
