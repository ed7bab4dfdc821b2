#![warn(missing_docs)]
//! Storage-scope analysis plumbing for texscope.
//!
//! Defines the [`StorageAnalysis`] trait that device-specific analyses
//! implement, the [`TextureSupport`] trait that describes which operators a
//! device can read from textures, and a [`StorageRegistry`] keyed by the set
//! of devices a graph targets.
//!
//! The generic texture collector lives in [`storage_info`]; a backend only
//! has to supply its [`TextureSupport`] table.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use texscope_ir::{Attrs, Expr, Graph, Handle, IrError, PlacementMap};

pub mod scope;
pub mod storage_info;

pub use scope::{DEFAULT_TEXTURE_SPATIAL_LIMIT, GLOBAL, SPATIAL_LIMIT_ATTR, TEXTURE};
pub use storage_info::collect_texture_storage;

/// Per-node output storage scopes.
///
/// One entry per output of the node: a single-output node has one scope, a
/// tuple-producing node has one per field. Nodes absent from the map keep
/// whatever scope they already had.
pub type StorageMap = BTreeMap<Handle<Expr>, Vec<String>>;

/// Leading segment of every registry key.
pub const KEY_PREFIX: &str = "backend";

/// Trailing segment of every registry key.
pub const KEY_SUFFIX: &str = "collect_storage_info";

/// Builds the registry key for a set of device identifiers.
///
/// Identifiers are sorted and deduplicated, so
/// `["opencl.adreno"]` yields `"backend.opencl.adreno.collect_storage_info"`.
pub fn registry_key<'a>(devices: impl IntoIterator<Item = &'a str>) -> String {
    let mut devices: Vec<&str> = devices.into_iter().collect();
    devices.sort_unstable();
    devices.dedup();
    let mut key = String::from(KEY_PREFIX);
    for device in devices {
        key.push('.');
        key.push_str(device);
    }
    key.push('.');
    key.push_str(KEY_SUFFIX);
    key
}

/// Which operators a device family can feed from texture memory.
pub trait TextureSupport: Debug + Send + Sync {
    /// Human-readable device family (e.g. "adreno").
    fn name(&self) -> &str;

    /// Returns `true` if an operator with these attributes reads its inputs
    /// efficiently from textures.
    fn supports_texture(&self, attrs: &Attrs) -> bool;

    /// Spatial limit used when the target carries no
    /// [`SPATIAL_LIMIT_ATTR`].
    fn default_spatial_limit(&self) -> u64 {
        DEFAULT_TEXTURE_SPATIAL_LIMIT
    }
}

/// A device-specific storage-scope analysis.
pub trait StorageAnalysis: Debug + Send + Sync {
    /// Human-readable name (e.g. "adreno-texture").
    fn name(&self) -> &str;

    /// Device identifiers (`"<target kind>.<device>"`) this analysis covers.
    fn devices(&self) -> &[&str];

    /// Computes output storage scopes for `graph`.
    fn collect(&self, graph: &Graph, placements: &PlacementMap)
    -> Result<StorageMap, StorageError>;

    /// The key this analysis is registered under.
    fn key(&self) -> String {
        registry_key(self.devices().iter().copied())
    }
}

/// Errors raised while computing storage scopes.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A multi-output node was given different scopes for its outputs.
    #[error("mixed output storage scopes are not supported: {node} has [{}]", .scopes.join(", "))]
    MixedOutputScopes {
        /// The offending node.
        node: String,
        /// Its per-output scopes.
        scopes: Vec<String>,
    },
    /// A leaf was assigned a scope twice.
    #[error("storage scope of {node} was already propagated")]
    AlreadyPropagated {
        /// The offending leaf.
        node: String,
    },
    /// A target attribute has an unusable value.
    #[error("target `{target}` has invalid `{key}` value `{value}`")]
    InvalidTargetAttr {
        /// The target, rendered.
        target: String,
        /// The attribute name.
        key: &'static str,
        /// The rejected value, rendered.
        value: String,
    },
    /// The graph itself is malformed or underspecified.
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// Registry of storage analyses, keyed by [`registry_key`].
#[derive(Debug)]
pub struct StorageRegistry {
    analyses: HashMap<String, Box<dyn StorageAnalysis>>,
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            analyses: HashMap::new(),
        }
    }

    /// Registers an analysis under its own key, replacing any previous one.
    pub fn register(&mut self, analysis: Box<dyn StorageAnalysis>) {
        let key = analysis.key();
        if let Some(previous) = self.analyses.insert(key.clone(), analysis) {
            log::warn!("storage analysis `{}` replaced under {key}", previous.name());
        }
    }

    /// Finds the analysis registered under `key`.
    pub fn find(&self, key: &str) -> Option<&dyn StorageAnalysis> {
        self.analyses.get(key).map(|a| &**a)
    }

    /// Finds the analysis covering exactly this set of devices.
    pub fn find_for_devices<'a>(
        &self,
        devices: impl IntoIterator<Item = &'a str>,
    ) -> Option<&dyn StorageAnalysis> {
        self.find(&registry_key(devices))
    }

    /// Lists all registered keys, sorted.
    pub fn list_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.analyses.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.analyses.is_empty()
    }
}
