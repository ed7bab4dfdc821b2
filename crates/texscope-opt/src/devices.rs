//! Device enumeration.

use std::collections::{BTreeSet, HashSet};

use texscope_ir::{Expr, Graph, Handle, PlacementMap};

/// Collects the `"<target kind>.<device>"` identifiers of every call
/// reachable from the root.
///
/// Fused kernels are not entered: a call's device is where the call runs,
/// whatever its callee contains. Calls with an unconstrained placement or a
/// target without a `device` attribute contribute nothing.
pub fn collect_devices(graph: &Graph, placements: &PlacementMap) -> BTreeSet<String> {
    let mut devices = BTreeSet::new();
    let mut visited = HashSet::new();
    let mut worklist: Vec<Handle<Expr>> = graph.root.into_iter().collect();

    while let Some(handle) = worklist.pop() {
        if !visited.insert(handle) {
            continue;
        }
        let Ok(expr) = graph.get(handle) else {
            continue;
        };
        match expr {
            Expr::Call(call) => {
                let placement = placements.get(handle);
                if !placement.is_unconstrained() {
                    if let Some(target) = &placement.target {
                        if let Some(device) = target.device() {
                            devices.insert(format!("{}.{device}", target.kind));
                        }
                    }
                }
                worklist.extend(call.args.iter().copied());
            }
            Expr::Function(f) => worklist.push(f.body),
            Expr::Tuple(fields) => worklist.extend(fields.iter().copied()),
            Expr::TupleGetItem { tuple, .. } => worklist.push(*tuple),
            Expr::OnDevice { body, .. } => worklist.push(*body),
            Expr::Var(_) | Expr::Constant(_) | Expr::Op(_) => {}
        }
    }
    devices
}
