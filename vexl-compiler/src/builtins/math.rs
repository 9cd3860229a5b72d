use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::env::VarEnvBuilder;
use crate::extension::{
    fold_by_eval, generic_prep, ConstantData, Extension, FunctionDeclaration, FunctionRegistry,
    SimpleFunction, Statistics,
};
use crate::runtime::ArgHandle;
use crate::typechecker::CallCheck;
use crate::types::ValueType;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MathKind {
    Abs,
    Clamp,
    Min,
    Max,
    Sum,
    Length,
    Dot,
    Mix,
}

fn declaration(kind: MathKind) -> FunctionDeclaration {
    let scalar = ValueType::scalar();
    let vec3 = ValueType::vector(3);
    match kind {
        MathKind::Abs => FunctionDeclaration::new(vec![scalar], scalar),
        MathKind::Clamp => FunctionDeclaration::new(vec![scalar; 3], scalar),
        MathKind::Min | MathKind::Max | MathKind::Sum => {
            FunctionDeclaration::variadic(Vec::new(), scalar, 1, None, scalar)
        }
        MathKind::Length => FunctionDeclaration::new(vec![vec3], scalar),
        MathKind::Dot => FunctionDeclaration::new(vec![vec3, vec3], scalar),
        MathKind::Mix => FunctionDeclaration::new(vec![vec3, vec3, scalar], vec3),
    }
}

const MATH_FUNCTIONS: &[(&str, MathKind)] = &[
    ("abs", MathKind::Abs),
    ("clamp", MathKind::Clamp),
    ("min", MathKind::Min),
    ("max", MathKind::Max),
    ("sum", MathKind::Sum),
    ("length", MathKind::Length),
    ("dot", MathKind::Dot),
    ("mix", MathKind::Mix),
];

struct MathFunction {
    kind: MathKind,
    declaration: FunctionDeclaration,
}

impl SimpleFunction for MathFunction {
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType {
        generic_prep(call, wants_scalar, env, &self.declaration)
    }

    fn eval_constant(&self, args: &mut ArgHandle<'_>) -> Option<ConstantData> {
        fold_by_eval(self, args)
    }

    fn eval(&self, args: &mut ArgHandle<'_>) {
        match self.kind {
            MathKind::Abs => {
                let value = args.in_scalar(0).abs();
                args.set_out_scalar(value);
            }
            MathKind::Clamp => {
                let (value, low, high) = (args.in_scalar(0), args.in_scalar(1), args.in_scalar(2));
                args.set_out_scalar(value.max(low).min(high));
            }
            MathKind::Min | MathKind::Max | MathKind::Sum => {
                let mut result = args.in_scalar(0);
                for index in 1..args.nargs() {
                    let value = args.in_scalar(index);
                    result = match self.kind {
                        MathKind::Min => result.min(value),
                        MathKind::Max => result.max(value),
                        _ => result + value,
                    };
                }
                args.set_out_scalar(result);
            }
            MathKind::Length => {
                let [x, y, z] = args.in_vec::<3>(0);
                args.set_out_scalar((x * x + y * y + z * z).sqrt());
            }
            MathKind::Dot => {
                let a = args.in_vec::<3>(0);
                let b = args.in_vec::<3>(1);
                args.set_out_scalar(a[0] * b[0] + a[1] * b[1] + a[2] * b[2]);
            }
            MathKind::Mix => {
                let a = args.in_vec::<3>(0);
                let b = args.in_vec::<3>(1);
                let t = args.in_scalar(2);
                let mixed = [
                    a[0] + (b[0] - a[0]) * t,
                    a[1] + (b[1] - a[1]) * t,
                    a[2] + (b[2] - a[2]) * t,
                ];
                args.set_out_fp(&mixed);
            }
        }
    }
}

/// Uniform values in `[0, 1)` from a shared xorshift generator. Each call
/// advances the generator, so the function is not thread-safe and never folds.
struct Rand {
    state: Mutex<u64>,
    draws: AtomicU64,
    declaration: FunctionDeclaration,
}

impl Rand {
    fn new(seed: u64) -> Self {
        Self {
            state: Mutex::new(seed.max(1)),
            draws: AtomicU64::new(0),
            declaration: FunctionDeclaration::new(Vec::new(), ValueType::scalar()),
        }
    }
}

impl SimpleFunction for Rand {
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType {
        call.mark_varying();
        generic_prep(call, wants_scalar, env, &self.declaration)
    }

    fn eval(&self, args: &mut ArgHandle<'_>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut x = *state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        *state = x;
        drop(state);
        self.draws.fetch_add(1, Ordering::Relaxed);
        args.set_out_scalar((x >> 11) as f64 / (1u64 << 53) as f64);
    }

    fn is_thread_safe(&self) -> bool {
        false
    }

    fn size_in_bytes(&self) -> usize {
        mem::size_of::<Self>()
    }

    fn statistics(&self, statistics: &mut Statistics) {
        statistics.insert(
            "rand.draws".to_string(),
            self.draws.load(Ordering::Relaxed) as f64,
        );
    }
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    for (name, kind) in MATH_FUNCTIONS {
        registry.insert(
            name,
            Extension::simple(MathFunction {
                kind: *kind,
                declaration: declaration(*kind),
            }),
        );
    }

    registry.insert(
        "floor",
        Extension::closure(
            FunctionDeclaration::new(vec![ValueType::scalar()], ValueType::scalar()),
            |args| {
                let value = args.in_scalar(0).floor();
                args.set_out_scalar(value);
            },
        ),
    );

    registry.insert("rand", Extension::simple(Rand::new(0x9e37_79b9_7f4a_7c15)));
}
