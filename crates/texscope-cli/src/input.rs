//! JSON graph input.
//!
//! A graph file names its targets once and then lists nodes in definition
//! order; every edge refers to an earlier node by id:
//!
//! ```json
//! {
//!   "targets": { "gpu": { "kind": "opencl", "attrs": { "device": "adreno" } } },
//!   "nodes": [
//!     { "id": "x", "kind": "var", "name": "x",
//!       "type": { "shape": [1, 4, 8, 8, 4], "dtype": "f32" } },
//!     { "id": "relu", "kind": "op", "name": "nn.relu" },
//!     { "id": "y", "kind": "call", "callee": "relu", "args": ["x"],
//!       "type": { "shape": [1, 4, 8, 8, 4], "dtype": "f32" } },
//!     { "id": "main", "kind": "function", "params": ["x"], "body": "y",
//!       "placement": "gpu" }
//!   ],
//!   "root": "main"
//! }
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use texscope_backend_core::SPATIAL_LIMIT_ATTR;
use texscope_ir::{
    AttrValue, Attrs, Conv2dAttrs, DeviceKind, Dim, Expr, Graph, Handle, IrError, Placement,
    Pool2dAttrs, Scalar, Target, TensorType, Type,
};

/// Errors raised while reading a graph file.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("malformed graph file: {0}")]
    Json(#[from] serde_json::Error),
    #[error("node id `{0}` is defined twice")]
    DuplicateId(String),
    #[error("node `{node}` refers to `{id}`, which is not defined before it")]
    UnknownNode { node: String, id: String },
    #[error("node `{node}` refers to unknown target `{target}`")]
    UnknownTarget { node: String, target: String },
    #[error("target `{target}` has unknown kind `{kind}`")]
    UnknownTargetKind { target: String, kind: String },
    #[error("target `{target}` attribute `{key}` must be an integer, string or bool")]
    UnsupportedAttr { target: String, key: String },
    #[error("unknown dtype `{0}`")]
    UnknownDtype(String),
    #[error("node `{node}` must have a tensor type")]
    ExpectedTensor { node: String },
    #[error(transparent)]
    Ir(#[from] IrError),
}

/// A whole graph file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GraphSpec {
    #[serde(default)]
    pub targets: BTreeMap<String, TargetSpec>,
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub root: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    pub kind: String,
    #[serde(default)]
    pub device_index: u32,
    #[serde(default)]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct NodeSpec {
    pub id: String,
    #[serde(flatten)]
    pub node: NodeKind,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeKind {
    Var {
        name: String,
        #[serde(rename = "type")]
        ty: TypeSpec,
        #[serde(default)]
        placement: Option<String>,
    },
    Constant {
        #[serde(rename = "type")]
        ty: TypeSpec,
    },
    Op {
        name: String,
    },
    Call {
        callee: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        attrs: Option<AttrsSpec>,
        #[serde(rename = "type", default)]
        ty: Option<TypeSpec>,
    },
    Function {
        #[serde(default)]
        params: Vec<String>,
        body: String,
        #[serde(rename = "type", default)]
        ty: Option<TypeSpec>,
        #[serde(default)]
        primitive: bool,
        #[serde(default)]
        placement: Option<String>,
    },
    Tuple {
        fields: Vec<String>,
    },
    TupleGetItem {
        tuple: String,
        index: u32,
    },
    OnDevice {
        body: String,
        #[serde(default)]
        placement: Option<String>,
        #[serde(default)]
        memory_scope: String,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TypeSpec {
    Tensor { shape: Vec<DimSpec>, dtype: String },
    Tuple { tuple: Vec<TypeSpec> },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DimSpec {
    Fixed(u64),
    Symbolic(String),
}

#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum AttrsSpec {
    Conv2d {
        data_layout: String,
        kernel_layout: String,
    },
    Conv2dWinograd {
        data_layout: String,
        kernel_layout: String,
    },
    GlobalPool2d {
        layout: String,
    },
    MaxPool2d {
        layout: String,
    },
    AvgPool2d {
        layout: String,
    },
}

impl From<AttrsSpec> for Attrs {
    fn from(spec: AttrsSpec) -> Self {
        match spec {
            AttrsSpec::Conv2d {
                data_layout,
                kernel_layout,
            } => Attrs::Conv2d(Conv2dAttrs {
                data_layout,
                kernel_layout,
            }),
            AttrsSpec::Conv2dWinograd {
                data_layout,
                kernel_layout,
            } => Attrs::Conv2dWinograd(Conv2dAttrs {
                data_layout,
                kernel_layout,
            }),
            AttrsSpec::GlobalPool2d { layout } => Attrs::GlobalPool2d(Pool2dAttrs { layout }),
            AttrsSpec::MaxPool2d { layout } => Attrs::MaxPool2d(Pool2dAttrs { layout }),
            AttrsSpec::AvgPool2d { layout } => Attrs::AvgPool2d(Pool2dAttrs { layout }),
        }
    }
}

fn parse_dtype(dtype: &str) -> Result<Scalar, InputError> {
    Ok(match dtype {
        "f32" | "float32" => Scalar::F32,
        "f16" | "float16" => Scalar::F16,
        "i32" | "int32" => Scalar::I32,
        "i8" | "int8" => Scalar::I8,
        "u8" | "uint8" => Scalar::U8,
        "bool" => Scalar::BOOL,
        other => return Err(InputError::UnknownDtype(other.to_string())),
    })
}

fn device_kind(target: &str, kind: &str) -> Result<DeviceKind, InputError> {
    Ok(match kind {
        "opencl" => DeviceKind::OpenCl,
        "cuda" => DeviceKind::Cuda,
        "vulkan" => DeviceKind::Vulkan,
        "metal" => DeviceKind::Metal,
        "llvm" | "c" => DeviceKind::Cpu,
        _ => {
            return Err(InputError::UnknownTargetKind {
                target: target.to_string(),
                kind: kind.to_string(),
            });
        }
    })
}

impl TypeSpec {
    fn to_type(&self) -> Result<Type, InputError> {
        match self {
            Self::Tensor { shape, dtype } => Ok(Type::Tensor(TensorType {
                shape: shape
                    .iter()
                    .map(|d| match d {
                        DimSpec::Fixed(n) => Dim::Fixed(*n),
                        DimSpec::Symbolic(name) => Dim::Symbolic(name.clone()),
                    })
                    .collect(),
                scalar: parse_dtype(dtype)?,
            })),
            Self::Tuple { tuple } => Ok(Type::Tuple(
                tuple.iter().map(Self::to_type).collect::<Result<_, _>>()?,
            )),
        }
    }
}

impl GraphSpec {
    /// Parses a graph file.
    pub fn from_json(src: &str) -> Result<Self, InputError> {
        Ok(serde_json::from_str(src)?)
    }

    /// Sets the texture spatial limit of every target.
    pub fn override_spatial_limit(&mut self, limit: u64) {
        for target in self.targets.values_mut() {
            target
                .attrs
                .insert(SPATIAL_LIMIT_ATTR.to_string(), serde_json::Value::from(limit));
        }
    }

    /// Builds and validates the graph.
    pub fn into_graph(self) -> Result<Graph, InputError> {
        let mut targets = HashMap::new();
        for (name, spec) in &self.targets {
            targets.insert(name.as_str(), build_placement(name, spec)?);
        }

        let mut graph = Graph::new();
        let mut ids: HashMap<String, Handle<Expr>> = HashMap::new();
        for NodeSpec { id, node } in self.nodes {
            let lookup = |name: &str| -> Result<Handle<Expr>, InputError> {
                ids.get(name).copied().ok_or_else(|| InputError::UnknownNode {
                    node: id.clone(),
                    id: name.to_string(),
                })
            };
            let lookup_all = |names: &[String]| -> Result<Vec<Handle<Expr>>, InputError> {
                names.iter().map(|n| lookup(n)).collect()
            };
            let placement = |name: &Option<String>| -> Result<Placement, InputError> {
                match name {
                    None => Ok(Placement::unconstrained()),
                    Some(t) => targets.get(t.as_str()).cloned().ok_or_else(|| {
                        InputError::UnknownTarget {
                            node: id.clone(),
                            target: t.clone(),
                        }
                    }),
                }
            };
            let opt_type = |ty: &Option<TypeSpec>| match ty {
                Some(ty) => ty.to_type(),
                None => Ok(Type::Opaque),
            };

            let handle = match node {
                NodeKind::Var {
                    name,
                    ty,
                    placement: p,
                } => graph.var(name, ty.to_type()?, placement(&p)?),
                NodeKind::Constant { ty } => {
                    let Type::Tensor(t) = ty.to_type()? else {
                        return Err(InputError::ExpectedTensor { node: id.clone() });
                    };
                    // Payloads are not part of the format; only the type matters.
                    graph.constant(Vec::new(), t)
                }
                NodeKind::Op { name } => graph.op(name),
                NodeKind::Call {
                    callee,
                    args,
                    attrs,
                    ty,
                } => {
                    let callee = lookup(&callee)?;
                    let args = lookup_all(&args)?;
                    let attrs = attrs.map(Attrs::from).unwrap_or_default();
                    graph.call(callee, args, attrs, opt_type(&ty)?)
                }
                NodeKind::Function {
                    params,
                    body,
                    ty,
                    primitive,
                    placement: p,
                } => {
                    let params = lookup_all(&params)?;
                    let body = lookup(&body)?;
                    let ret_ty = opt_type(&ty)?;
                    if primitive {
                        graph.primitive_function(params, body, ret_ty)
                    } else {
                        graph.function(params, body, ret_ty, placement(&p)?)
                    }
                }
                NodeKind::Tuple { fields } => {
                    let fields = lookup_all(&fields)?;
                    graph.tuple(fields)
                }
                NodeKind::TupleGetItem { tuple, index } => {
                    let tuple = lookup(&tuple)?;
                    graph.tuple_get_item(tuple, index)
                }
                NodeKind::OnDevice {
                    body,
                    placement: p,
                    memory_scope,
                } => {
                    let body = lookup(&body)?;
                    let placement = placement(&p)?.with_memory_scope(memory_scope);
                    graph.on_device(body, placement)
                }
            };
            if ids.insert(id.clone(), handle).is_some() {
                return Err(InputError::DuplicateId(id));
            }
        }

        if let Some(root) = &self.root {
            let handle = ids.get(root).copied().ok_or_else(|| InputError::UnknownNode {
                node: "root".to_string(),
                id: root.clone(),
            })?;
            graph.set_root(handle);
        }
        graph.validate()?;
        Ok(graph)
    }
}

fn build_placement(name: &str, spec: &TargetSpec) -> Result<Placement, InputError> {
    let device = device_kind(name, &spec.kind)?;
    let mut target = Target::new(spec.kind.clone());
    for (key, value) in &spec.attrs {
        let value = match value {
            serde_json::Value::Bool(b) => AttrValue::Bool(*b),
            serde_json::Value::String(s) => AttrValue::Str(s.clone()),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => AttrValue::Int(v),
                None => {
                    return Err(InputError::UnsupportedAttr {
                        target: name.to_string(),
                        key: key.clone(),
                    });
                }
            },
            _ => {
                return Err(InputError::UnsupportedAttr {
                    target: name.to_string(),
                    key: key.clone(),
                });
            }
        };
        target = target.with_attr(key.clone(), value);
    }
    Ok(Placement::on(device, spec.device_index, target))
}

/// Parses and builds a graph, optionally overriding every target's spatial
/// limit.
pub fn load_graph(src: &str, spatial_limit: Option<u64>) -> Result<Graph, InputError> {
    let mut spec = GraphSpec::from_json(src)?;
    if let Some(limit) = spatial_limit {
        spec.override_spatial_limit(limit);
    }
    spec.into_graph()
}
