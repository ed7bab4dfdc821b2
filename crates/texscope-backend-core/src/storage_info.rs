//! Texture storage collection.
//!
//! A single depth-first walk from the graph root records, for every fused
//! call whose kernel a device can run from textures, a candidate texture
//! scope, and for every producer the scopes its consumers want to read. A
//! candidate is retracted as soon as one of its consumers cannot read
//! textures. A final pass reconciles what is left and binds fused-kernel
//! parameters to the scopes of their arguments.

use std::collections::{BTreeMap, HashSet};

use texscope_ir::{Call, Dim, Expr, Graph, Handle, PlacementMap, TensorType, Type};

use crate::scope::{self, GLOBAL, TEXTURE};
use crate::{StorageError, StorageMap, TextureSupport};

/// Computes output storage scopes for every node of `graph` that a
/// texture-capable device should read or write through texture memory.
///
/// Nodes that end up absent from the returned map keep their existing
/// scope. Every entry's scopes are uniform, and a producer maps to a
/// texture scope only if every one of its consumers accepts textures.
pub fn collect_texture_storage(
    graph: &Graph,
    placements: &PlacementMap,
    support: &dyn TextureSupport,
) -> Result<StorageMap, StorageError> {
    graph.validate()?;
    let Some(root) = graph.root else {
        return Ok(StorageMap::new());
    };
    let mut info = StorageInfo::new(graph, placements, support);
    info.visit(root)?;
    info.legalize_producer_storage()?;
    let map = info.into_storage_map();
    log::debug!("{}: collected storage scopes for {} node(s)", support.name(), map.len());
    Ok(map)
}

/// Pending work of the depth-first walk.
enum Visit {
    Enter(Handle<Expr>),
    /// A fused call's kernel has been walked.
    CalleeDone(Handle<Expr>),
    /// A call's arguments have been walked.
    ArgsDone(Handle<Expr>),
}

struct StorageInfo<'a> {
    graph: &'a Graph,
    placements: &'a PlacementMap,
    support: &'a dyn TextureSupport,
    /// Set while walking a fused kernel's body when some operator in it
    /// can read textures.
    primitive_supports_texture: bool,
    visited: HashSet<Handle<Expr>>,
    /// Candidate output scopes of producers.
    storage_scope: BTreeMap<Handle<Expr>, Vec<String>>,
    /// What each producer's consumers asked for, one entry per consumer.
    consumer_scopes: BTreeMap<Handle<Expr>, Vec<String>>,
    /// Fused-call arguments to the kernel parameters they bind.
    args_to_params: BTreeMap<Handle<Expr>, Vec<Handle<Expr>>>,
}

impl<'a> StorageInfo<'a> {
    fn new(
        graph: &'a Graph,
        placements: &'a PlacementMap,
        support: &'a dyn TextureSupport,
    ) -> Self {
        Self {
            graph,
            placements,
            support,
            primitive_supports_texture: false,
            visited: HashSet::new(),
            storage_scope: BTreeMap::new(),
            consumer_scopes: BTreeMap::new(),
            args_to_params: BTreeMap::new(),
        }
    }

    /// Walks everything reachable from `root` depth-first, each node once.
    fn visit(&mut self, root: Handle<Expr>) -> Result<(), StorageError> {
        let graph = self.graph;
        let mut stack = vec![Visit::Enter(root)];
        while let Some(step) = stack.pop() {
            match step {
                Visit::Enter(handle) => {
                    if !self.visited.insert(handle) {
                        continue;
                    }
                    match graph.get(handle)? {
                        Expr::Var(_) | Expr::Constant(_) => {
                            self.apply_consumer_scope_to_input(handle)?
                        }
                        Expr::Call(call) => {
                            if graph.primitive_callee(call).is_some() {
                                self.primitive_supports_texture = false;
                                stack.push(Visit::CalleeDone(handle));
                                stack.push(Visit::Enter(call.callee));
                            } else {
                                self.enter_args(handle, call, &mut stack);
                            }
                        }
                        Expr::Function(f) => {
                            stack.extend(f.params.iter().rev().map(|&p| Visit::Enter(p)));
                            stack.push(Visit::Enter(f.body));
                        }
                        Expr::Tuple(fields) => {
                            stack.extend(fields.iter().rev().map(|&f| Visit::Enter(f)));
                        }
                        Expr::TupleGetItem { tuple, .. } => stack.push(Visit::Enter(*tuple)),
                        Expr::OnDevice { body, .. } => stack.push(Visit::Enter(*body)),
                        Expr::Op(_) => {}
                    }
                }
                Visit::CalleeDone(handle) => {
                    let Expr::Call(call) = &graph[handle] else {
                        continue;
                    };
                    self.collect_candidate(handle, call)?;
                    self.enter_args(handle, call, &mut stack);
                }
                Visit::ArgsDone(handle) => {
                    if let Expr::Call(call) = &graph[handle] {
                        self.retract_rejected(call);
                    }
                }
            }
        }
        Ok(())
    }

    /// Records a fused call's candidate once its kernel body has been
    /// walked, and what the call asks of its arguments.
    fn collect_candidate(
        &mut self,
        handle: Handle<Expr>,
        call: &'a Call,
    ) -> Result<(), StorageError> {
        let graph = self.graph;
        let Some(callee) = graph.primitive_callee(call) else {
            return Ok(());
        };
        if self.primitive_supports_texture {
            match &call.ty {
                Type::Tensor(t) => {
                    let scope = self.scope_for(t, handle)?;
                    self.storage_scope.entry(handle).or_default().push(scope);
                }
                Type::Tuple(fields) if !fields.is_empty() => {
                    let scopes = self.storage_scope.entry(handle).or_default();
                    scopes.extend(fields.iter().map(|_| TEXTURE.to_string()));
                }
                other => {
                    log::debug!("{handle}: no storage scope for result type {other}");
                }
            }
            for (&arg, &param) in call.args.iter().zip(&callee.params) {
                self.args_to_params
                    .entry(graph.strip_on_device(arg))
                    .or_default()
                    .push(param);
            }
        }

        let produces_texture = match self.storage_scope.get(&handle) {
            Some(scopes) => {
                check_uniform(handle, scopes)?;
                true
            }
            None => false,
        };
        let demand = if produces_texture { TEXTURE } else { GLOBAL };
        for &arg in &call.args {
            self.consumer_scopes
                .entry(graph.strip_on_device(arg))
                .or_default()
                .push(demand.to_string());
        }
        Ok(())
    }

    fn enter_args(&mut self, handle: Handle<Expr>, call: &Call, stack: &mut Vec<Visit>) {
        self.primitive_supports_texture = self.support.supports_texture(&call.attrs);
        stack.push(Visit::ArgsDone(handle));
        stack.extend(call.args.iter().rev().map(|&a| Visit::Enter(a)));
    }

    /// Retracts candidates that some consumer cannot read as textures.
    fn retract_rejected(&mut self, call: &Call) {
        let graph = self.graph;
        for &arg in &call.args {
            let arg = graph.strip_on_device(arg);
            let Some(demand) = self.consumer_scopes.get(&arg) else {
                continue;
            };
            if scope::unify_demand(demand) == TEXTURE {
                continue;
            }
            if self.storage_scope.remove(&arg).is_some() {
                log::debug!("{arg}: texture candidate retracted, consumers want {demand:?}");
            }
            if let Expr::Call(arg_call) = &graph[arg] {
                if let Some(kernel) = graph.primitive_callee(arg_call) {
                    self.storage_scope.remove(&graph.strip_on_device(kernel.body));
                }
            }
        }
    }

    /// Leaf rule for variables and constants.
    fn apply_consumer_scope_to_input(&mut self, handle: Handle<Expr>) -> Result<(), StorageError> {
        let Some(demand) = self.consumer_scopes.get(&handle) else {
            return Ok(());
        };
        let consumer_scope = scope::unify_demand(demand);
        if self.storage_scope.contains_key(&handle) {
            return Err(StorageError::AlreadyPropagated {
                node: handle.to_string(),
            });
        }

        let mut own_scope = None;
        let mut rgba = false;
        if let Some(Type::Tensor(t)) = self.graph[handle].checked_type() {
            let s = self.scope_for(&t, handle)?;
            if s != GLOBAL {
                rgba = t.innermost() == Some(&Dim::Fixed(4));
            }
            own_scope = Some(s);
        }

        if scope::is_texture(consumer_scope) {
            match own_scope {
                Some(s) if rgba => self.storage_scope.entry(handle).or_default().push(s),
                _ => log::debug!("{handle}: texture requested but shape does not fit"),
            }
        } else {
            self.storage_scope
                .entry(handle)
                .or_default()
                .push(consumer_scope.to_string());
        }
        Ok(())
    }

    fn scope_for(&self, ty: &TensorType, handle: Handle<Expr>) -> Result<String, StorageError> {
        scope::scope_for_tensor(
            ty,
            self.placements.get(handle),
            self.support.default_spatial_limit(),
        )
    }

    /// Overwrites each producer's scopes with what its consumers can agree
    /// on, when the two disagree.
    fn legalize_producer_storage(&mut self) -> Result<(), StorageError> {
        for (producer, demand) in &self.consumer_scopes {
            let Some(scopes) = self.storage_scope.get_mut(producer) else {
                continue;
            };
            check_uniform(*producer, scopes)?;
            let legal = scope::unify_demand(demand);
            let Some(first) = scopes.first() else {
                continue;
            };
            if !first.contains(legal) {
                log::debug!("{producer}: legalized {first} -> {legal}");
                for s in scopes.iter_mut() {
                    *s = legal.to_string();
                }
            }
        }
        Ok(())
    }

    fn into_storage_map(self) -> StorageMap {
        let StorageInfo {
            storage_scope: mut map,
            consumer_scopes,
            args_to_params,
            ..
        } = self;

        // Producers with some texture consumer but no surviving candidate
        // are pinned to global.
        for (expr, demand) in &consumer_scopes {
            if scope::can_accept_texture(demand) && !map.contains_key(expr) {
                map.insert(*expr, vec![GLOBAL.to_string()]);
            }
        }

        for (arg, params) in &args_to_params {
            let Some(scopes) = map.get(arg).cloned() else {
                continue;
            };
            for &param in params {
                map.insert(param, scopes.clone());
            }
        }
        map
    }
}

fn check_uniform(node: Handle<Expr>, scopes: &[String]) -> Result<(), StorageError> {
    match scopes.first() {
        Some(first) if scopes.iter().any(|s| s != first) => Err(StorageError::MixedOutputScopes {
            node: node.to_string(),
            scopes: scopes.to_vec(),
        }),
        _ => Ok(()),
    }
}
