use texscope_backend_core::{StorageMap, StorageRegistry};
use texscope_ir::{
    AttrValue, Attrs, Conv2dAttrs, DeviceKind, Expr, Graph, Handle, Placement, PlacementMap,
    Pool2dAttrs, Scalar, Target, Type, Var,
};
use texscope_opt::PassError;

/// An Adreno GPU placement with the default spatial limit.
#[allow(dead_code)]
pub fn adreno() -> Placement {
    Placement::on(DeviceKind::OpenCl, 0, adreno_target())
}

/// An Adreno GPU placement with an explicit `texture_spatial_limit`.
#[allow(dead_code)]
pub fn adreno_with_limit(limit: AttrValue) -> Placement {
    Placement::on(
        DeviceKind::OpenCl,
        0,
        adreno_target().with_attr("texture_spatial_limit", limit),
    )
}

fn adreno_target() -> Target {
    Target::new("opencl").with_attr("device", AttrValue::Str("adreno".into()))
}

#[allow(dead_code)]
pub fn tensor(shape: &[u64]) -> Type {
    Type::tensor(shape, Scalar::F32)
}

/// `nn.conv2d` attributes Adreno reads from textures.
#[allow(dead_code)]
pub fn conv_attrs() -> Attrs {
    Attrs::Conv2d(Conv2dAttrs {
        data_layout: "NCHW4c".into(),
        kernel_layout: "OIHW4o".into(),
    })
}

#[allow(dead_code)]
pub fn pool_attrs() -> Attrs {
    Attrs::MaxPool2d(Pool2dAttrs {
        layout: "NCHW4c".into(),
    })
}

/// Appends `fn(p..) primitive { op(p..) }` and calls it on `args`.
///
/// Parameters are named `<op>_p<i>`.
#[allow(dead_code)]
pub fn fused(g: &mut Graph, op: &str, attrs: Attrs, args: &[Handle<Expr>], out: Type) -> Handle<Expr> {
    let params: Vec<_> = args
        .iter()
        .enumerate()
        .map(|(i, &a)| {
            let stripped = g.strip_on_device(a);
            let ty = g[stripped].checked_type().unwrap_or(Type::Opaque);
            g.var(format!("{op}_p{i}"), ty, Placement::unconstrained())
        })
        .collect();
    let op_handle = g.op(op);
    let body = g.call(op_handle, params.clone(), attrs, out.clone());
    let kernel = g.primitive_function(params, body, out.clone());
    g.call(kernel, args.to_vec(), Attrs::None, out)
}

/// The registry the CLI ships with.
#[allow(dead_code)]
pub fn registry() -> StorageRegistry {
    let mut reg = StorageRegistry::new();
    texscope_backend_adreno::register(&mut reg);
    reg
}

/// Resolves placements and runs the registered analysis.
#[allow(dead_code)]
pub fn storage_map(g: &Graph) -> StorageMap {
    let placements = PlacementMap::resolve(g);
    texscope_opt::collect_storage_info(g, &placements, &registry()).expect("analysis failed")
}

#[allow(dead_code)]
pub fn annotate(g: &Graph) -> Result<Graph, PassError> {
    texscope_opt::annotate_memory_scope(g, &registry())
}

/// The operator a fused call's kernel applies, if `call` is one.
#[allow(dead_code)]
pub fn kernel_op(g: &Graph, call: Handle<Expr>) -> Option<&str> {
    let Expr::Call(c) = &g[call] else {
        return None;
    };
    let kernel = g.primitive_callee(c)?;
    let Expr::Call(body) = &g[g.strip_on_device(kernel.body)] else {
        return None;
    };
    match &g[body.callee] {
        Expr::Op(name) => Some(name.as_str()),
        _ => None,
    }
}

/// Memory scope of the annotation wrapping the fused call to `op`.
#[allow(dead_code)]
pub fn call_scope(g: &Graph, op: &str) -> Option<String> {
    let call = g
        .exprs
        .iter()
        .map(|(h, _)| h)
        .find(|&h| kernel_op(g, h) == Some(op))?;
    g.exprs.iter().find_map(|(_, e)| match e {
        Expr::OnDevice {
            body, placement, ..
        } if *body == call => Some(placement.memory_scope.clone()),
        _ => None,
    })
}

/// Memory scopes of annotations wrapping constants.
#[allow(dead_code)]
pub fn constant_scopes(g: &Graph) -> Vec<String> {
    g.exprs
        .iter()
        .filter_map(|(_, e)| match e {
            Expr::OnDevice {
                body, placement, ..
            } if matches!(g[*body], Expr::Constant(_)) => Some(placement.memory_scope.clone()),
            _ => None,
        })
        .collect()
}

#[allow(dead_code)]
pub fn find_var<'g>(g: &'g Graph, name: &str) -> &'g Var {
    g.exprs
        .iter()
        .find_map(|(_, e)| match e {
            Expr::Var(v) if v.name == name => Some(v),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no var named {name}"))
}

#[allow(dead_code)]
pub fn scopes(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}
