//! texscope intermediate representation.
//!
//! An arena-based functional dataflow graph: calls, variables, constants,
//! functions and placement annotations, with handle identity so that shared
//! subexpressions form a DAG rather than a tree.

pub mod arena;
mod device;
mod display;
mod error;
mod expr;
mod graph;
mod placement;
mod types;

pub use arena::{Arena, Handle};
pub use device::PlacementMap;
pub use display::{dump_graph, format_expr, format_shape};
pub use error::IrError;
pub use expr::{Attrs, Call, Constant, Conv2dAttrs, Expr, Function, Pool2dAttrs, Span, Var};
pub use graph::Graph;
pub use placement::{AttrValue, DeviceKind, Placement, Target};
pub use types::{Bytes, Dim, Scalar, ScalarKind, TensorType, Type};
