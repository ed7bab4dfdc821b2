//! Display implementations and text dump for debugging.

use std::fmt::{self, Write as _};

use crate::arena::Handle;
use crate::expr::{Attrs, Expr};
use crate::graph::Graph;
use crate::placement::{AttrValue, DeviceKind, Placement, Target};
use crate::types::{Dim, Scalar, ScalarKind, TensorType, Type};

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool => write!(f, "bool"),
            Self::Sint => write!(f, "sint"),
            Self::Uint => write!(f, "uint"),
            Self::Float => write!(f, "float"),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ScalarKind::Bool => write!(f, "bool"),
            ScalarKind::Sint => write!(f, "i{}", self.width * 8),
            ScalarKind::Uint => write!(f, "u{}", self.width * 8),
            ScalarKind::Float => write!(f, "f{}", self.width * 8),
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Symbolic(name) => write!(f, "{name}"),
        }
    }
}

/// Formats a shape as `(d0, d1, ...)`.
pub fn format_shape(shape: &[Dim]) -> String {
    let dims: Vec<String> = shape.iter().map(ToString::to_string).collect();
    format!("({})", dims.join(", "))
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor[{}, {}]", format_shape(&self.shape), self.scalar)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tensor(t) => write!(f, "{t}"),
            Self::Tuple(fields) => {
                let parts: Vec<String> = fields.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
            Self::Opaque => write!(f, "_"),
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cpu => "cpu",
            Self::Cuda => "cuda",
            Self::OpenCl => "opencl",
            Self::Vulkan => "vulkan",
            Self::Metal => "metal",
        })
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        for (key, value) in &self.attrs {
            write!(f, " -{key}={value}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unconstrained() {
            return f.write_str("unconstrained");
        }
        match self.device {
            Some(device) => write!(f, "{device}")?,
            None => f.write_str("?")?,
        }
        if let Some(index) = self.device_index {
            write!(f, ":{index}")?;
        }
        if let Some(target) = &self.target {
            write!(f, " [{target}]")?;
        }
        if !self.memory_scope.is_empty() {
            write!(f, " scope={}", self.memory_scope)?;
        }
        Ok(())
    }
}

impl fmt::Display for Attrs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Conv2d(a) => write!(
                f,
                "conv2d{{data_layout={}, kernel_layout={}}}",
                a.data_layout, a.kernel_layout
            ),
            Self::Conv2dWinograd(a) => write!(
                f,
                "conv2d_winograd{{data_layout={}, kernel_layout={}}}",
                a.data_layout, a.kernel_layout
            ),
            Self::GlobalPool2d(a) => write!(f, "global_pool2d{{layout={}}}", a.layout),
            Self::MaxPool2d(a) => write!(f, "max_pool2d{{layout={}}}", a.layout),
            Self::AvgPool2d(a) => write!(f, "avg_pool2d{{layout={}}}", a.layout),
        }
    }
}

fn join_handles(handles: &[Handle<Expr>]) -> String {
    let parts: Vec<String> = handles.iter().map(ToString::to_string).collect();
    parts.join(", ")
}

/// Renders one node, without its handle.
pub fn format_expr(expr: &Expr) -> String {
    match expr {
        Expr::Var(v) => format!("var {}: {} @ {}", v.name, v.ty, v.placement),
        Expr::Constant(c) => format!("const {} ({} bytes)", c.ty, c.data.len()),
        Expr::Op(name) => format!("op {name}"),
        Expr::Call(c) => {
            let mut s = format!("call {}({})", c.callee, join_handles(&c.args));
            if c.attrs != Attrs::None {
                let _ = write!(s, " {}", c.attrs);
            }
            let _ = write!(s, ": {}", c.ty);
            s
        }
        Expr::Function(func) => {
            let mut s = format!("fn({}) -> {}", join_handles(&func.params), func.body);
            if func.primitive {
                s.push_str(" primitive");
            }
            let _ = write!(s, ": {}", func.ret_ty);
            if !func.result_placement.is_unconstrained() {
                let _ = write!(s, " @ {}", func.result_placement);
            }
            s
        }
        Expr::Tuple(fields) => format!("tuple({})", join_handles(fields)),
        Expr::TupleGetItem { tuple, index } => format!("{tuple}.{index}"),
        Expr::OnDevice {
            body,
            placement,
            constrain_result,
        } => {
            let mut s = format!("on_device({body}) @ {placement}");
            if *constrain_result {
                s.push_str(" constrain_result");
            }
            s
        }
    }
}

/// Produces a human-readable listing of every node in `graph`.
pub fn dump_graph(graph: &Graph) -> String {
    let mut out = String::new();
    for (handle, expr) in graph.exprs.iter() {
        let _ = writeln!(out, "{handle} = {}", format_expr(expr));
    }
    match graph.root {
        Some(root) => {
            let _ = writeln!(out, "root = {root}");
        }
        None => out.push_str("root = <none>\n"),
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Conv2dAttrs;

    fn adreno() -> Placement {
        Placement::on(
            DeviceKind::OpenCl,
            0,
            Target::new("opencl").with_attr("device", AttrValue::Str("adreno".into())),
        )
    }

    #[test]
    fn display_scalars_and_types() {
        assert_eq!(Scalar::F32.to_string(), "f32");
        assert_eq!(Scalar::U8.to_string(), "u8");
        let t = Type::tensor(&[1, 4, 8, 8, 4], Scalar::F16);
        assert_eq!(t.to_string(), "Tensor[(1, 4, 8, 8, 4), f16]");
        let tup = Type::Tuple(vec![Type::tensor(&[2], Scalar::F32), Type::Opaque]);
        assert_eq!(tup.to_string(), "(Tensor[(2), f32], _)");
    }

    #[test]
    fn display_placement() {
        assert_eq!(Placement::unconstrained().to_string(), "unconstrained");
        let p = adreno().with_memory_scope("global.texture-nhwc");
        assert_eq!(
            p.to_string(),
            "opencl:0 [opencl -device=adreno] scope=global.texture-nhwc"
        );
    }

    #[test]
    fn display_attrs() {
        let a = Attrs::Conv2d(Conv2dAttrs {
            data_layout: "NCHW4c".into(),
            kernel_layout: "OIHW4o".into(),
        });
        assert_eq!(
            a.to_string(),
            "conv2d{data_layout=NCHW4c, kernel_layout=OIHW4o}"
        );
        assert_eq!(Attrs::None.to_string(), "");
    }

    #[test]
    fn dump_small_graph() {
        let mut g = Graph::new();
        let x = g.var("x", Type::tensor(&[4], Scalar::F32), adreno());
        let relu = g.op("nn.relu");
        let c = g.call(relu, vec![x], Attrs::None, Type::tensor(&[4], Scalar::F32));
        let annotated = g.on_device(c, adreno().with_memory_scope("global"));
        g.set_root(annotated);

        let text = dump_graph(&g);
        assert!(text.contains("%0 = var x: Tensor[(4), f32] @ opencl:0"));
        assert!(text.contains("%1 = op nn.relu"));
        assert!(text.contains("%2 = call %1(%0): Tensor[(4), f32]"));
        assert!(text.contains("%3 = on_device(%2) @ opencl:0 [opencl -device=adreno] scope=global constrain_result"));
        assert!(text.ends_with("root = %3\n"));
    }

    #[test]
    fn dump_empty_graph() {
        assert_eq!(dump_graph(&Graph::new()), "root = <none>\n");
    }
}
