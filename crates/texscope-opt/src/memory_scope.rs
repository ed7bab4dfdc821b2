//! Memory scope annotation pass.

use std::sync::Arc;

use texscope_backend_core::{StorageError, StorageMap, StorageRegistry, registry_key};
use texscope_ir::{Graph, PlacementMap};

use crate::devices::collect_devices;
use crate::rewrite::rewrite;
use crate::{Pass, PassError};

/// Runs the storage analysis registered for the graph's devices.
///
/// Returns an empty map when no analysis is registered for that exact set
/// of devices.
pub fn collect_storage_info(
    graph: &Graph,
    placements: &PlacementMap,
    registry: &StorageRegistry,
) -> Result<StorageMap, StorageError> {
    let devices = collect_devices(graph, placements);
    let key = registry_key(devices.iter().map(String::as_str));
    log::debug!("storage analysis key: {key}");

    match registry.find(&key) {
        Some(analysis) => {
            log::debug!("running storage analysis `{}`", analysis.name());
            analysis.collect(graph, placements)
        }
        None => {
            if !devices.is_empty() {
                log::warn!("no storage analysis registered for {key}; memory scopes unchanged");
            }
            Ok(StorageMap::new())
        }
    }
}

/// Returns a copy of `graph` with storage scopes written into its
/// placements.
///
/// When the analysis produces nothing the graph is returned unchanged.
pub fn annotate_memory_scope(graph: &Graph, registry: &StorageRegistry) -> Result<Graph, PassError> {
    graph.validate()?;
    let placements = PlacementMap::resolve(graph);
    let storage = collect_storage_info(graph, &placements, registry)?;
    if storage.is_empty() {
        return Ok(graph.clone());
    }
    Ok(rewrite(graph, &placements, &storage))
}

/// Annotates every value with the memory scope its device should use.
#[derive(Debug)]
pub struct AnnotateMemoryScope {
    registry: Arc<StorageRegistry>,
}

impl AnnotateMemoryScope {
    pub fn new(registry: Arc<StorageRegistry>) -> Self {
        Self { registry }
    }
}

impl Pass for AnnotateMemoryScope {
    fn name(&self) -> &str {
        "annotate-memory-scope"
    }

    fn run(&self, graph: &mut Graph) -> Result<bool, PassError> {
        let annotated = annotate_memory_scope(graph, &self.registry)?;
        if annotated == *graph {
            return Ok(false);
        }
        *graph = annotated;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use texscope_ir::{
        AttrValue, Attrs, Conv2dAttrs, DeviceKind, Expr, Placement, Scalar, Target, Type,
    };

    fn adreno() -> Placement {
        Placement::on(
            DeviceKind::OpenCl,
            0,
            Target::new("opencl").with_attr("device", AttrValue::Str("adreno".into())),
        )
    }

    fn registry() -> Arc<StorageRegistry> {
        let mut reg = StorageRegistry::new();
        texscope_backend_adreno::register(&mut reg);
        Arc::new(reg)
    }

    /// `main(x) { fused_conv(x) }` with a supported convolution layout.
    fn conv_graph(placement: Placement) -> Graph {
        let ty = Type::tensor(&[1, 4, 8, 8, 4], Scalar::F32);
        let mut g = Graph::new();
        let x = g.var("x", ty.clone(), Placement::unconstrained());
        let p = g.var("p0", ty.clone(), Placement::unconstrained());
        let op = g.op("nn.conv2d");
        let body = g.call(
            op,
            vec![p],
            Attrs::Conv2d(Conv2dAttrs {
                data_layout: "NCHW4c".into(),
                kernel_layout: "OIHW4o".into(),
            }),
            ty.clone(),
        );
        let kernel = g.primitive_function(vec![p], body, ty.clone());
        let call = g.call(kernel, vec![x], Attrs::None, ty.clone());
        let main = g.function(vec![x], call, ty, placement);
        g.set_root(main);
        g
    }

    #[test]
    fn pass_metadata() {
        assert_eq!(AnnotateMemoryScope::new(registry()).name(), "annotate-memory-scope");
    }

    #[test]
    fn annotates_adreno_graph() {
        let mut g = conv_graph(adreno());
        let changed = AnnotateMemoryScope::new(registry()).run(&mut g).unwrap();
        assert!(changed);

        let Some(Expr::Function(main)) = g.root.map(|r| &g[r]) else {
            panic!("expected function root");
        };
        let Expr::OnDevice { placement, .. } = &g[main.body] else {
            panic!("expected annotated call");
        };
        assert_eq!(placement.memory_scope, "global.texture");
        let Expr::Var(x) = &g[main.params[0]] else {
            panic!("expected var");
        };
        assert_eq!(x.placement.memory_scope, "global.texture");
    }

    #[test]
    fn second_run_is_a_no_op() {
        let pass = AnnotateMemoryScope::new(registry());
        let mut g = conv_graph(adreno());
        assert!(pass.run(&mut g).unwrap());
        let once = g.clone();
        assert!(!pass.run(&mut g).unwrap());
        assert_eq!(g, once);
    }

    #[test]
    fn unregistered_device_is_a_no_op() {
        let mali = Placement::on(
            DeviceKind::OpenCl,
            0,
            Target::new("opencl").with_attr("device", AttrValue::Str("mali".into())),
        );
        let mut g = conv_graph(mali);
        let before = g.clone();
        assert!(!AnnotateMemoryScope::new(registry()).run(&mut g).unwrap());
        assert_eq!(g, before);
    }

    #[test]
    fn empty_registry_is_a_no_op() {
        let g = conv_graph(adreno());
        let out = annotate_memory_scope(&g, &StorageRegistry::new()).unwrap();
        assert_eq!(out, g);
    }

    #[test]
    fn dispatch_key_uses_collected_devices() {
        let g = conv_graph(adreno());
        let placements = PlacementMap::resolve(&g);
        let map = collect_storage_info(&g, &placements, &registry()).unwrap();
        assert!(!map.is_empty());
    }

    #[test]
    fn malformed_graph_is_rejected() {
        let mut g = Graph::new();
        let k = g.constant(vec![], texscope_ir::TensorType::new(&[4], Scalar::F32));
        let f = g.primitive_function(vec![k], k, Type::tensor(&[4], Scalar::F32));
        g.set_root(f);
        let err = annotate_memory_scope(&g, &registry()).unwrap_err();
        assert!(matches!(err, PassError::Ir(_)));
    }
}
