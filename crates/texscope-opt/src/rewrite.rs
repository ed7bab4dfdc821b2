//! Writes storage scopes back into a graph.
//!
//! The rewrite rebuilds every node reachable from the root into a fresh
//! graph, in post-order. Shared nodes are rebuilt once, so sharing survives,
//! and a graph that is already annotated rebuilds to an equal graph.

use std::collections::{HashMap, HashSet};

use texscope_backend_core::{GLOBAL, StorageMap};
use texscope_ir::{Call, Expr, Function, Graph, Handle, PlacementMap, Var};

/// Rebuilds `graph` with the scopes of `storage` applied.
pub(crate) fn rewrite(graph: &Graph, placements: &PlacementMap, storage: &StorageMap) -> Graph {
    let mut rewriter = Rewriter {
        src: graph,
        placements,
        storage,
        out: Graph::new(),
        memo: HashMap::new(),
        annotations: HashSet::new(),
        stats: Stats::default(),
    };
    if let Some(root) = graph.root {
        let root = rewriter.rewrite(root);
        rewriter.out.set_root(root);
    }
    let Stats {
        vars,
        constants,
        calls,
    } = rewriter.stats;
    log::debug!("memory scope rewrite: {vars} var(s), {constants} constant(s), {calls} call(s)");
    rewriter.out
}

#[derive(Default)]
struct Stats {
    vars: usize,
    constants: usize,
    calls: usize,
}

struct Rewriter<'a> {
    src: &'a Graph,
    placements: &'a PlacementMap,
    storage: &'a StorageMap,
    out: Graph,
    memo: HashMap<Handle<Expr>, Handle<Expr>>,
    /// `OnDevice` nodes created by this rewrite.
    annotations: HashSet<Handle<Expr>>,
    stats: Stats,
}

impl<'a> Rewriter<'a> {
    fn scope_of(&self, handle: Handle<Expr>) -> Option<&'a str> {
        let storage: &'a StorageMap = self.storage;
        storage
            .get(&handle)
            .and_then(|scopes| scopes.first())
            .map(String::as_str)
    }

    fn annotate(&mut self, body: Handle<Expr>, src: Handle<Expr>, scope: &str) -> Handle<Expr> {
        let placement = self.placements.get(src).with_memory_scope(scope);
        let annotated = self.out.on_device(body, placement);
        self.annotations.insert(annotated);
        annotated
    }

    /// Rebuilds everything below `root`, operands before users.
    fn rewrite(&mut self, root: Handle<Expr>) -> Handle<Expr> {
        let src = self.src;
        // `(node, operands_done)`; operands are pushed in reverse so they are
        // rebuilt in order.
        let mut stack = vec![(root, false)];
        while let Some((handle, operands_done)) = stack.pop() {
            if self.memo.contains_key(&handle) {
                continue;
            }
            if !operands_done {
                stack.push((handle, true));
                stack.extend(operands(&src[handle]).into_iter().rev().map(|h| (h, false)));
                continue;
            }
            let new = self.rebuild(handle);
            self.memo.insert(handle, new);
        }
        self.memo[&root]
    }

    /// Rebuilds one node whose operands are already in `memo`.
    fn rebuild(&mut self, handle: Handle<Expr>) -> Handle<Expr> {
        let src = self.src;
        match &src[handle] {
            Expr::Var(v) => self.rewrite_var(handle, v),
            Expr::Constant(c) => {
                let copy = self.out.append(Expr::Constant(c.clone()));
                match self.scope_of(handle) {
                    Some(scope) => {
                        self.stats.constants += 1;
                        self.annotate(copy, handle, scope)
                    }
                    None => copy,
                }
            }
            Expr::Op(name) => self.out.op(name.clone()),
            Expr::Call(call) => self.rewrite_call(handle, call),
            Expr::Function(f) => {
                let params = f.params.iter().map(|p| self.memo[p]).collect();
                let body = self.memo[&f.body];
                self.out.append(Expr::Function(Function {
                    params,
                    body,
                    ..f.clone()
                }))
            }
            Expr::Tuple(fields) => {
                let fields = fields.iter().map(|f| self.memo[f]).collect();
                self.out.tuple(fields)
            }
            Expr::TupleGetItem { tuple, index } => {
                let tuple = self.memo[tuple];
                self.out.tuple_get_item(tuple, *index)
            }
            Expr::OnDevice {
                body,
                placement,
                constrain_result,
            } => {
                let body = self.memo[body];
                if self.annotations.contains(&body) {
                    // The fresher annotation replaces this one.
                    body
                } else {
                    self.out.append(Expr::OnDevice {
                        body,
                        placement: placement.clone(),
                        constrain_result: *constrain_result,
                    })
                }
            }
        }
    }

    fn rewrite_var(&mut self, handle: Handle<Expr>, v: &Var) -> Handle<Expr> {
        let var = match self.scope_of(handle) {
            Some(scope) if scope != GLOBAL => {
                self.stats.vars += 1;
                Var {
                    placement: self.placements.get(handle).with_memory_scope(scope),
                    ..v.clone()
                }
            }
            _ => v.clone(),
        };
        self.out.append(Expr::Var(var))
    }

    fn rewrite_call(&mut self, handle: Handle<Expr>, call: &Call) -> Handle<Expr> {
        let callee = self.memo[&call.callee];
        let args = call.args.iter().map(|a| self.memo[a]).collect();
        let new = self.out.append(Expr::Call(Call {
            callee,
            args,
            ..call.clone()
        }));

        let scope = match self.scope_of(handle) {
            Some(scope) => scope.to_string(),
            None => self.placements.get(handle).memory_scope.clone(),
        };
        if scope.is_empty() {
            return new;
        }
        self.stats.calls += 1;
        self.annotate(new, handle, &scope)
    }
}

/// Operands in the order they are rebuilt.
fn operands(expr: &Expr) -> Vec<Handle<Expr>> {
    match expr {
        Expr::Var(_) | Expr::Constant(_) | Expr::Op(_) => Vec::new(),
        Expr::Call(call) => std::iter::once(call.callee)
            .chain(call.args.iter().copied())
            .collect(),
        Expr::Function(f) => f.params.iter().copied().chain([f.body]).collect(),
        Expr::Tuple(fields) => fields.clone(),
        Expr::TupleGetItem { tuple, .. } => vec![*tuple],
        Expr::OnDevice { body, .. } => vec![*body],
    }
}
