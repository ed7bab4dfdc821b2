//! Placement resolution.
//!
//! Earlier compilation stages decide where every value lives, but only write
//! that decision down at a few places: on variables, on `OnDevice`
//! annotations and on function results. [`PlacementMap::resolve`] spreads
//! those decisions to every node so later analyses can ask "where does this
//! node's result live?" without re-walking the graph.

use std::collections::HashMap;

use crate::arena::Handle;
use crate::expr::Expr;
use crate::graph::Graph;
use crate::placement::Placement;

/// The resolved placement of every node reachable from a graph's root.
#[derive(Clone, Debug, Default)]
pub struct PlacementMap {
    placements: HashMap<Handle<Expr>, Placement>,
    unconstrained: Placement,
}

impl PlacementMap {
    /// Resolves placements top-down from the graph root.
    ///
    /// Rules:
    /// - a non-primitive function's constrained result placement becomes the
    ///   context of its body;
    /// - `OnDevice` fixes the placement of itself and its body;
    /// - a variable with a constrained placement keeps it;
    /// - everything else inherits the context of its first consumer.
    ///
    /// Memory scopes are never inherited: a scope describes one result, not
    /// the device context around it.
    pub fn resolve(graph: &Graph) -> Self {
        let mut map = Self::default();
        if let Some(root) = graph.root {
            map.visit(graph, root, &Placement::unconstrained());
        }
        map
    }

    /// The resolved placement of `handle` (unconstrained if unreachable).
    pub fn get(&self, handle: Handle<Expr>) -> &Placement {
        self.placements.get(&handle).unwrap_or(&self.unconstrained)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    fn visit(&mut self, graph: &Graph, root: Handle<Expr>, context: &Placement) {
        // Pre-order walk; children are pushed in reverse so the first operand
        // is resolved first, as a recursive walk would.
        let mut stack = vec![(root, context.clone())];
        while let Some((handle, context)) = stack.pop() {
            if self.placements.contains_key(&handle) {
                continue;
            }
            // Dangling edges are reported by `Graph::validate`.
            let Ok(expr) = graph.get(handle) else {
                continue;
            };
            let own = match expr {
                Expr::Var(v) if !v.placement.is_unconstrained() => v.placement.clone(),
                Expr::OnDevice { placement, .. } => placement.clone(),
                Expr::Function(f) if !f.primitive && !f.result_placement.is_unconstrained() => {
                    f.result_placement.clone()
                }
                _ => context,
            };
            let inner = match expr {
                // The annotated body is the value the annotation describes.
                Expr::OnDevice { .. } => own.clone(),
                _ => own.with_memory_scope(""),
            };
            self.placements.insert(handle, own);

            let children: Vec<Handle<Expr>> = match expr {
                Expr::Var(_) | Expr::Constant(_) | Expr::Op(_) => continue,
                Expr::Function(f) => std::iter::once(f.body)
                    .chain(f.params.iter().copied())
                    .collect(),
                Expr::Call(call) => std::iter::once(call.callee)
                    .chain(call.args.iter().copied())
                    .collect(),
                Expr::Tuple(fields) => fields.clone(),
                Expr::TupleGetItem { tuple, .. } => vec![*tuple],
                Expr::OnDevice { body, .. } => vec![*body],
            };
            stack.extend(children.into_iter().rev().map(|c| (c, inner.clone())));
        }
    }
}
