//! Expression nodes.

use crate::arena::Handle;
use crate::placement::Placement;
use crate::types::{TensorType, Type};

/// A source position carried through rewrites unchanged.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

/// A named reference: a graph input or a function parameter.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Var {
    pub name: String,
    pub ty: Type,
    pub placement: Placement,
    pub span: Option<Span>,
}

/// Embedded constant tensor data.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Constant {
    /// Raw little-endian element bytes.
    pub data: Vec<u8>,
    pub ty: TensorType,
    pub span: Option<Span>,
}

/// Convolution layout attributes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Conv2dAttrs {
    pub data_layout: String,
    pub kernel_layout: String,
}

/// Pooling layout attributes.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pool2dAttrs {
    pub layout: String,
}

/// The attribute bag of a call, typed by operator family.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Attrs {
    /// No attributes (element-wise ops, calls to functions, ...).
    #[default]
    None,
    Conv2d(Conv2dAttrs),
    Conv2dWinograd(Conv2dAttrs),
    GlobalPool2d(Pool2dAttrs),
    MaxPool2d(Pool2dAttrs),
    AvgPool2d(Pool2dAttrs),
}

/// An application of an operator or function to arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Call {
    /// Either an [`Expr::Op`] or an [`Expr::Function`].
    pub callee: Handle<Expr>,
    pub args: Vec<Handle<Expr>>,
    pub attrs: Attrs,
    pub ty: Type,
    pub span: Option<Span>,
}

/// A function: ordered parameters and a single body.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Function {
    /// Handles of [`Expr::Var`] nodes.
    pub params: Vec<Handle<Expr>>,
    pub body: Handle<Expr>,
    pub ret_ty: Type,
    /// Fused kernel that is inlined at its call sites rather than called.
    pub primitive: bool,
    /// Where the function's result lives.
    pub result_placement: Placement,
}

/// A graph node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expr {
    Var(Var),
    Constant(Constant),
    Call(Call),
    Function(Function),
    /// A primitive operator, referenced by name (e.g. `"nn.conv2d"`).
    Op(String),
    Tuple(Vec<Handle<Expr>>),
    TupleGetItem {
        tuple: Handle<Expr>,
        index: u32,
    },
    /// Placement annotation wrapping a single body.
    OnDevice {
        body: Handle<Expr>,
        placement: Placement,
        /// The annotation fixes the placement of the body's result.
        constrain_result: bool,
    },
}

impl Expr {
    /// Short variant name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Var(_) => "var",
            Self::Constant(_) => "constant",
            Self::Call(_) => "call",
            Self::Function(_) => "function",
            Self::Op(_) => "op",
            Self::Tuple(_) => "tuple",
            Self::TupleGetItem { .. } => "tuple_get_item",
            Self::OnDevice { .. } => "on_device",
        }
    }

    /// The node's checked type, when it has one a storage scope applies to.
    pub fn checked_type(&self) -> Option<Type> {
        match self {
            Self::Var(v) => Some(v.ty.clone()),
            Self::Constant(c) => Some(Type::Tensor(c.ty.clone())),
            Self::Call(c) => Some(c.ty.clone()),
            _ => None,
        }
    }

    /// Handles this node reads, in evaluation order.
    pub fn operands(&self) -> Vec<Handle<Expr>> {
        match self {
            Self::Var(_) | Self::Constant(_) | Self::Op(_) => Vec::new(),
            Self::Call(c) => std::iter::once(c.callee).chain(c.args.iter().copied()).collect(),
            Self::Function(f) => f.params.iter().copied().chain([f.body]).collect(),
            Self::Tuple(fields) => fields.clone(),
            Self::TupleGetItem { tuple, .. } => vec![*tuple],
            Self::OnDevice { body, .. } => vec![*body],
        }
    }
}
