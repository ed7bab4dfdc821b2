//! Qualcomm Adreno texture storage analysis for texscope.
//!
//! Adreno GPUs sample 2-D RGBA textures through a dedicated cache. This
//! crate supplies the operator table ([`AdrenoTextureSupport`]) and wires it
//! into the generic texture collector under the `opencl.adreno` device key.

mod support;

pub use support::AdrenoTextureSupport;

use texscope_backend_core::{
    StorageAnalysis, StorageError, StorageMap, StorageRegistry, collect_texture_storage,
};
use texscope_ir::{Graph, PlacementMap};

/// Device identifier: OpenCL targets with `-device=adreno`.
pub const ADRENO_DEVICE: &str = "opencl.adreno";

/// Texture storage analysis for Adreno GPUs.
#[derive(Debug)]
pub struct AdrenoTextureAnalysis;

impl StorageAnalysis for AdrenoTextureAnalysis {
    fn name(&self) -> &str {
        "adreno-texture"
    }

    fn devices(&self) -> &[&str] {
        &[ADRENO_DEVICE]
    }

    fn collect(
        &self,
        graph: &Graph,
        placements: &PlacementMap,
    ) -> Result<StorageMap, StorageError> {
        log::debug!("{}: collecting over {} node(s)", self.name(), graph.len());
        collect_texture_storage(graph, placements, &AdrenoTextureSupport)
    }
}

/// Registers the Adreno analysis.
pub fn register(registry: &mut StorageRegistry) {
    let analysis = AdrenoTextureAnalysis;
    log::debug!("registering `{}` under {}", analysis.name(), analysis.key());
    registry.register(Box::new(analysis));
}
