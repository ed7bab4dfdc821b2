// Property-based tests for the memory scope analysis.
//
// Two groups:
// 1. Scope fitting: which shapes may live in a texture at all
// 2. Random fused-kernel graphs: uniformity, conservativeness, idempotence
//
// Uses proptest with explicit case counts to keep CI time bounded.

mod common;

use common::*;
use proptest::prelude::*;
use proptest::sample::Index;
use texscope_backend_core::scope::{fit_scope, is_texture};
use texscope_backend_core::{GLOBAL, StorageMap};
use texscope_ir::{Attrs, Expr, Graph, Handle, Placement, Scalar, TensorType, Type};

// ── Scope fitting ───────────────────────────────────────────────────────────

fn arb_shape() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(1u64..64, 0..7)
}

/// The fold a texture scope names, as `(rows, cols)`.
fn fold_of(shape: &[u64], scope: &str) -> (u64, u64) {
    let [a0, a1, a2, a3, _] = shape else {
        panic!("texture scope for rank {}", shape.len());
    };
    match scope {
        "global.texture" => (a0 * a1 * a2, *a3),
        "global.texture-nhwc" => (a0 * a1, a2 * a3),
        "global.texture-weight" => (*a0, a1 * a2 * a3),
        other => panic!("unexpected scope {other}"),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn unconstrained_is_always_global(shape in arb_shape(), limit in 1u64..100_000) {
        prop_assert_eq!(fit_scope(&shape, false, limit), GLOBAL);
    }

    #[test]
    fn non_rgba_shapes_are_global(shape in arb_shape(), limit in 1u64..100_000) {
        prop_assume!(shape.len() != 5 || shape[4] != 4);
        prop_assert_eq!(fit_scope(&shape, true, limit), GLOBAL);
    }

    #[test]
    fn texture_scope_names_a_fitting_fold(
        dims in prop::collection::vec(1u64..64, 4),
        limit in 1u64..100_000,
    ) {
        let mut shape = dims;
        shape.push(4);
        let scope = fit_scope(&shape, true, limit);
        if scope != GLOBAL {
            let (rows, cols) = fold_of(&shape, &scope);
            prop_assert!(rows < limit && cols < limit, "{scope} for {shape:?} at {limit}");
        }
    }

    #[test]
    fn raising_the_limit_never_loses_texture(
        dims in prop::collection::vec(1u64..64, 4),
        limit in 1u64..10_000,
    ) {
        let mut shape = dims;
        shape.push(4);
        if is_texture(&fit_scope(&shape, true, limit)) {
            prop_assert!(is_texture(&fit_scope(&shape, true, limit * 2)));
        }
    }
}

// ── Random fused graphs ─────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kernel {
    Conv,
    Pool,
    Add,
    Relu,
}

impl Kernel {
    fn op(self) -> &'static str {
        match self {
            Self::Conv => "nn.conv2d",
            Self::Pool => "nn.max_pool2d",
            Self::Add => "add",
            Self::Relu => "nn.relu",
        }
    }

    fn attrs(self) -> Attrs {
        match self {
            Self::Conv => conv_attrs(),
            Self::Pool => pool_attrs(),
            Self::Add | Self::Relu => Attrs::None,
        }
    }

    fn arity(self) -> usize {
        match self {
            Self::Conv | Self::Add => 2,
            Self::Pool | Self::Relu => 1,
        }
    }

    fn reads_textures(self) -> bool {
        matches!(self, Self::Conv | Self::Pool)
    }
}

fn arb_kernel() -> impl Strategy<Value = Kernel> {
    prop_oneof![
        Just(Kernel::Conv),
        Just(Kernel::Pool),
        Just(Kernel::Add),
        Just(Kernel::Relu),
    ]
}

/// One fused call: its kernel and picks from the values defined so far.
type Step = (Kernel, Index, Index);

fn arb_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec((arb_kernel(), any::<Index>(), any::<Index>()), 1..10)
}

struct Built {
    graph: Graph,
    calls: Vec<(Handle<Expr>, Kernel)>,
}

/// `main(x) { (s0, s1, ..) }` on Adreno, where each `si` is a fused call
/// over `x`, a weight constant or an earlier `sj`.
fn build(steps: &[Step]) -> Built {
    let act = [1, 4, 8, 8, 4];
    let mut g = Graph::new();
    let x = g.var("x", tensor(&act), Placement::unconstrained());
    let w = g.constant(vec![], TensorType::new(&[4, 4, 3, 3, 4], Scalar::F32));

    let mut values = vec![x, w];
    let mut calls = Vec::new();
    for &(kernel, a, b) in steps {
        let picks = [*a.get(&values), *b.get(&values)];
        let args = &picks[..kernel.arity()];
        let call = fused(&mut g, kernel.op(), kernel.attrs(), args, tensor(&act));
        values.push(call);
        calls.push((call, kernel));
    }

    let fields = calls.iter().map(|&(c, _)| c).collect();
    let body = g.tuple(fields);
    let main = g.function(vec![x], body, Type::Opaque, adreno());
    g.set_root(main);
    Built { graph: g, calls }
}

fn call_args(g: &Graph, call: Handle<Expr>) -> (Vec<Handle<Expr>>, Vec<Handle<Expr>>) {
    let Expr::Call(c) = &g[call] else {
        panic!("{call} is not a call");
    };
    let kernel = g.primitive_callee(c).expect("fused call");
    (c.args.clone(), kernel.params.clone())
}

fn has_texture(map: &StorageMap, h: Handle<Expr>) -> bool {
    map.get(&h).is_some_and(|s| s.iter().any(|s| is_texture(s)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn every_entry_is_uniform(steps in arb_steps()) {
        let built = build(&steps);
        let map = storage_map(&built.graph);
        for (h, scopes) in &map {
            prop_assert!(!scopes.is_empty(), "{h} has no scopes");
            prop_assert!(scopes.iter().all(|s| s == &scopes[0]), "{h}: {scopes:?}");
        }
    }

    #[test]
    fn unsupported_consumers_never_read_textures(steps in arb_steps()) {
        let built = build(&steps);
        let map = storage_map(&built.graph);
        for &(call, kernel) in &built.calls {
            if kernel.reads_textures() {
                continue;
            }
            let (args, _) = call_args(&built.graph, call);
            for arg in args {
                prop_assert!(!has_texture(&map, arg), "{arg} feeds {kernel:?}: {:?}", map.get(&arg));
            }
        }
    }

    #[test]
    fn texture_results_come_from_supported_kernels(steps in arb_steps()) {
        let built = build(&steps);
        let map = storage_map(&built.graph);
        for &(call, kernel) in &built.calls {
            if has_texture(&map, call) {
                prop_assert!(kernel.reads_textures(), "{call} is {kernel:?}");
            }
        }
    }

    #[test]
    fn params_mirror_their_arguments(steps in arb_steps()) {
        let built = build(&steps);
        let map = storage_map(&built.graph);
        for &(call, kernel) in &built.calls {
            let (args, params) = call_args(&built.graph, call);
            for (arg, param) in args.into_iter().zip(params) {
                if kernel.reads_textures() {
                    prop_assert_eq!(map.get(&param), map.get(&arg));
                } else {
                    prop_assert!(!map.contains_key(&param), "{param} of {kernel:?}");
                }
            }
        }
    }

    #[test]
    fn annotation_is_idempotent(steps in arb_steps()) {
        let built = build(&steps);
        let once = annotate(&built.graph).unwrap();
        let twice = annotate(&once).unwrap();
        prop_assert_eq!(twice, once);
    }
}
