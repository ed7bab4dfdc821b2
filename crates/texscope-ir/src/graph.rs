//! Expression graphs.
//!
//! A [`Graph`] owns an arena of [`Expr`] nodes and names one of them as the
//! root. Edges are handles, so shared subexpressions are ordinary: a node
//! consumed by three calls is stored once and referenced three times.

use std::collections::HashSet;
use std::ops::Index;

use crate::arena::{Arena, Handle};
use crate::error::IrError;
use crate::expr::{Attrs, Call, Constant, Expr, Function, Var};
use crate::placement::Placement;
use crate::types::{TensorType, Type};

/// A dataflow graph of expressions.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    pub exprs: Arena<Expr>,
    pub root: Option<Handle<Expr>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Appends an arbitrary node.
    pub fn append(&mut self, expr: Expr) -> Handle<Expr> {
        self.exprs.append(expr)
    }

    pub fn var(&mut self, name: impl Into<String>, ty: Type, placement: Placement) -> Handle<Expr> {
        self.append(Expr::Var(Var {
            name: name.into(),
            ty,
            placement,
            span: None,
        }))
    }

    pub fn constant(&mut self, data: Vec<u8>, ty: TensorType) -> Handle<Expr> {
        self.append(Expr::Constant(Constant {
            data,
            ty,
            span: None,
        }))
    }

    pub fn op(&mut self, name: impl Into<String>) -> Handle<Expr> {
        self.append(Expr::Op(name.into()))
    }

    pub fn call(
        &mut self,
        callee: Handle<Expr>,
        args: Vec<Handle<Expr>>,
        attrs: Attrs,
        ty: Type,
    ) -> Handle<Expr> {
        self.append(Expr::Call(Call {
            callee,
            args,
            attrs,
            ty,
            span: None,
        }))
    }

    /// Appends a fused kernel to be inlined at its call sites.
    pub fn primitive_function(
        &mut self,
        params: Vec<Handle<Expr>>,
        body: Handle<Expr>,
        ret_ty: Type,
    ) -> Handle<Expr> {
        self.append(Expr::Function(Function {
            params,
            body,
            ret_ty,
            primitive: true,
            result_placement: Placement::unconstrained(),
        }))
    }

    /// Appends an ordinary (non-primitive) function.
    pub fn function(
        &mut self,
        params: Vec<Handle<Expr>>,
        body: Handle<Expr>,
        ret_ty: Type,
        result_placement: Placement,
    ) -> Handle<Expr> {
        self.append(Expr::Function(Function {
            params,
            body,
            ret_ty,
            primitive: false,
            result_placement,
        }))
    }

    pub fn tuple(&mut self, fields: Vec<Handle<Expr>>) -> Handle<Expr> {
        self.append(Expr::Tuple(fields))
    }

    pub fn tuple_get_item(&mut self, tuple: Handle<Expr>, index: u32) -> Handle<Expr> {
        self.append(Expr::TupleGetItem { tuple, index })
    }

    /// Wraps `body` in a result-constraining placement annotation.
    pub fn on_device(&mut self, body: Handle<Expr>, placement: Placement) -> Handle<Expr> {
        self.append(Expr::OnDevice {
            body,
            placement,
            constrain_result: true,
        })
    }

    pub fn set_root(&mut self, root: Handle<Expr>) {
        self.root = Some(root);
    }

    /// Checked node access.
    pub fn get(&self, handle: Handle<Expr>) -> Result<&Expr, IrError> {
        self.exprs.try_get(handle).ok_or(IrError::BadHandle {
            index: handle.index(),
            size: self.exprs.len(),
        })
    }

    /// Skips any number of [`Expr::OnDevice`] wrappers.
    pub fn strip_on_device(&self, mut handle: Handle<Expr>) -> Handle<Expr> {
        while let Expr::OnDevice { body, .. } = &self.exprs[handle] {
            handle = *body;
        }
        handle
    }

    /// If `call` is a call to a primitive function, returns that function.
    pub fn primitive_callee(&self, call: &Call) -> Option<&Function> {
        match &self.exprs[call.callee] {
            Expr::Function(f) if f.primitive => Some(f),
            _ => None,
        }
    }

    /// Returns every node reachable from `root`, operands before users.
    ///
    /// Each shared node appears once, at its first completion.
    pub fn post_order(&self, root: Handle<Expr>) -> Vec<Handle<Expr>> {
        let mut order = Vec::new();
        let mut seen: HashSet<Handle<Expr>> = HashSet::new();
        // (node, operands already pushed)
        let mut stack = vec![(root, false)];
        while let Some((handle, expanded)) = stack.pop() {
            if expanded {
                order.push(handle);
                continue;
            }
            if !seen.insert(handle) {
                continue;
            }
            stack.push((handle, true));
            for operand in self.exprs[handle].operands().into_iter().rev() {
                if !seen.contains(&operand) {
                    stack.push((operand, false));
                }
            }
        }
        order
    }

    /// Checks that every edge points inside the arena.
    pub fn validate(&self) -> Result<(), IrError> {
        if let Some(root) = self.root {
            self.get(root)?;
        }
        for (handle, expr) in self.exprs.iter() {
            for operand in expr.operands() {
                self.get(operand)?;
            }
            if let Expr::Function(f) = expr {
                for &param in &f.params {
                    if !matches!(self.exprs[param], Expr::Var(_)) {
                        return Err(IrError::UnexpectedNode {
                            node: format!("{param} (parameter of {handle})"),
                            expected: "var",
                            found: self.exprs[param].kind_name(),
                        });
                    }
                }
            }
        }
        Ok(())
    }
}

impl Index<Handle<Expr>> for Graph {
    type Output = Expr;

    fn index(&self, handle: Handle<Expr>) -> &Expr {
        &self.exprs[handle]
    }
}
