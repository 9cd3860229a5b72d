use std::sync::Arc;

use vexl_support::{argument_type_error, arity_error, check_error};

use crate::env::VarEnvBuilder;
use crate::extension::{Arity, Extension, FunctionExtension, FunctionRegistry};
use crate::runtime::{CallEmit, EmitError, Instruction, Interpreter, Register};
use crate::typechecker::CallCheck;
use crate::types::ValueType;

/// `pick(cond, a, b)`: `a` when `cond` is non-zero, otherwise `b`. Only the
/// chosen branch is evaluated.
struct Pick;

impl FunctionExtension for Pick {
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType {
        if call.arg_count() != 3 {
            let message = arity_error(call.name(), Arity::Exact(3), call.arg_count());
            return call.error(message);
        }
        let condition = call.check_arg(0, true, env);
        let when_true = call.check_arg(1, wants_scalar, env);
        let when_false = call.check_arg(2, wants_scalar, env);
        if condition.is_error() || when_true.is_error() || when_false.is_error() {
            return ValueType::error();
        }
        if !condition.is_scalar() {
            let message = argument_type_error(call.name(), 0, ValueType::scalar(), condition);
            return call.arg_error(0, message);
        }
        let result = if when_true.is_string() && when_false.is_string() {
            ValueType::string()
        } else {
            when_true.combine(when_false)
        };
        if result.is_error() {
            let message = argument_type_error(call.name(), 2, when_true, when_false);
            return call.arg_error(2, message);
        }
        call.expect_arg(1, result);
        call.expect_arg(2, result);
        result
    }

    fn build_interpreter(
        &self,
        call: &mut CallEmit<'_, '_>,
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError> {
        let dest = interpreter.alloc(call.result_type())?;
        let cond = call.emit_arg(0, interpreter)?;
        let to_false = interpreter.push(Instruction::JumpIfZero { cond, target: 0 });

        let when_true = call.emit_arg(1, interpreter)?;
        interpreter.copy_into(when_true, dest);
        let to_end = interpreter.push(Instruction::Jump(0));

        let false_start = interpreter.next_position();
        interpreter.patch_jump(to_false, false_start);
        let when_false = call.emit_arg(2, interpreter)?;
        interpreter.copy_into(when_false, dest);

        let end = interpreter.next_position();
        interpreter.patch_jump(to_end, end);
        Ok(dest)
    }

    fn is_thread_safe(&self) -> bool {
        true
    }
}

/// Width of the variable named by a string literal, resolved while checking.
#[derive(Debug, Clone, Copy, PartialEq)]
struct VariableWidth(usize);

/// `vardim("name")` or `vardim("$name")`: the numeric width of a local or
/// host variable, zero for strings.
struct VarDim;

impl FunctionExtension for VarDim {
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        _wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType {
        if call.arg_count() != 1 {
            let message = arity_error(call.name(), Arity::Exact(1), call.arg_count());
            return call.error(message);
        }
        call.check_arg(0, false, env);
        let Some(name) = call.arg_string_literal(0) else {
            let message = check_error(call.name(), "expects a string literal naming a variable");
            return call.arg_error(0, message);
        };
        let ty = match name.strip_prefix('$') {
            Some(host) => env.lookup_host(host),
            None => env.lookup(name).or_else(|| env.lookup_host(name)),
        };
        match ty {
            Some(ty) if ty.is_valid() => {
                call.set_data(Arc::new(VariableWidth(ty.width())));
                ValueType::scalar()
            }
            _ => {
                let message = check_error(call.name(), format!("unknown variable '{name}'"));
                call.arg_error(0, message)
            }
        }
    }

    fn build_interpreter(
        &self,
        call: &mut CallEmit<'_, '_>,
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError> {
        let width = call
            .data()
            .and_then(|data| (**data).downcast_ref::<VariableWidth>())
            .map(|width| width.0)
            .ok_or_else(|| EmitError::Unresolved(call.name().to_string()))?;
        interpreter.constant_numeric(&[width as f64])
    }

    fn is_thread_safe(&self) -> bool {
        true
    }
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.insert("pick", Extension::custom(Pick));
    registry.insert("vardim", Extension::custom(VarDim));
}
