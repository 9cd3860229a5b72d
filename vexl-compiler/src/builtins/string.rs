use std::sync::Arc;

use crate::env::VarEnvBuilder;
use crate::extension::{
    fold_by_eval, generic_prep, ConstantData, Extension, FunctionDeclaration, FunctionRegistry,
    SimpleFunction,
};
use crate::runtime::ArgHandle;
use crate::typechecker::CallCheck;
use crate::types::ValueType;

struct Concat {
    declaration: FunctionDeclaration,
}

impl SimpleFunction for Concat {
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
        let mut joined = String::new();
        for index in 0..args.nargs() {
            joined.push_str(args.in_str(index));
        }
        args.set_out_str(Arc::<str>::from(joined));
    }
}

/// FNV-1a of the UTF-8 bytes, scaled into `[0, 1)`.
struct Hash {
    declaration: FunctionDeclaration,
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}

impl SimpleFunction for Hash {
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
        let hash = fnv1a(args.in_str(0));
        args.set_out_scalar((hash >> 11) as f64 / (1u64 << 53) as f64);
    }
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    let string = ValueType::string();
    registry.insert(
        "concat",
        Extension::simple(Concat {
            declaration: FunctionDeclaration::variadic(Vec::new(), string, 1, None, string),
        }),
    );
    registry.insert(
        "hash",
        Extension::simple(Hash {
            declaration: FunctionDeclaration::new(vec![string], ValueType::scalar()),
        }),
    );
    registry.insert(
        "strlen",
        Extension::closure(
            FunctionDeclaration::new(vec![string], ValueType::scalar()),
            |args| {
                let length = args.in_str(0).chars().count() as f64;
                args.set_out_scalar(length);
            },
        ),
    );
}
