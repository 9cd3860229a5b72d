use std::sync::Arc;

use log::trace;
use vexl_support::{argument_type_error, arity_error};

use super::{ConstantData, FunctionDeclaration, Statistics};
use crate::env::VarEnvBuilder;
use crate::runtime::{ArgHandle, CallEmit, CallOperands, EmitError, Instruction, Interpreter, Register};
use crate::typechecker::CallCheck;
use crate::types::ValueType;

/// A function with numeric-vector or string arguments and a single output.
///
/// Emission is shared: every argument is evaluated into its own register, one
/// output register is allocated, and a single call instruction invokes
/// [`SimpleFunction::eval`] with an [`ArgHandle`] over those registers.
pub trait SimpleFunction: Send + Sync {
    /// Usually a thin wrapper over [`generic_prep`].
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType;

    /// Computes the result once for a call site whose arguments are all
    /// constant. The payload is stored on the call site and handed back
    /// through [`ArgHandle::data`]; a [`FoldedValue`] payload is copied into
    /// the output directly.
    ///
    /// [`FoldedValue`]: super::FoldedValue
    fn eval_constant(&self, _args: &mut ArgHandle<'_>) -> Option<ConstantData> {
        None
    }

    /// Writes the result into the handle's output. Must not fail; inputs that
    /// have no sensible result produce a neutral value.
    fn eval(&self, args: &mut ArgHandle<'_>);

    fn is_thread_safe(&self) -> bool {
        true
    }

    fn size_in_bytes(&self) -> usize {
        0
    }

    fn statistics(&self, _statistics: &mut Statistics) {}
}

/// Folds by running [`SimpleFunction::eval`] on the constant inputs and
/// capturing the output.
pub fn fold_by_eval<F>(function: &F, args: &mut ArgHandle<'_>) -> Option<ConstantData>
where
    F: SimpleFunction + ?Sized,
{
    function.eval(args);
    Some(args.fold_output())
}

/// Checks a call site against `declaration`.
///
/// Every argument is checked even after a failure so that all problems are
/// reported in one pass. Arguments narrower than their declared vector width
/// must be scalars; emission promotes them.
pub fn generic_prep(
    call: &mut CallCheck<'_, '_>,
    _wants_scalar: bool,
    env: &mut VarEnvBuilder,
    declaration: &FunctionDeclaration,
) -> ValueType {
    let count = call.arg_count();
    let arity = declaration.arity();
    let mut valid = true;

    if !arity.allows(count) {
        let message = arity_error(call.name(), arity, count);
        call.error(message);
        valid = false;
    }

    for index in 0..count {
        let expected = declaration.param(index);
        let wants_scalar = expected.map_or(false, ValueType::is_scalar);
        let actual = call.check_arg(index, wants_scalar, env);
        if actual.is_error() {
            valid = false;
            continue;
        }
        match expected {
            Some(expected) if expected.accepts(actual) => call.expect_arg(index, expected),
            Some(expected) => {
                let message = argument_type_error(call.name(), index, expected, actual);
                call.arg_error(index, message);
                valid = false;
            }
            None => {}
        }
    }

    if valid {
        declaration.result()
    } else {
        ValueType::error()
    }
}

/// Emission shared by every simple function.
///
/// Operands of the emitted call are laid out as function, constant-data slot,
/// output register, argument count, then one register per argument.
pub fn build_simple_call(
    function: &Arc<dyn SimpleFunction>,
    call: &mut CallEmit<'_, '_>,
    interpreter: &mut Interpreter,
) -> Result<Register, EmitError> {
    let result_type = call.result_type();
    let mut args = Vec::with_capacity(call.arg_count());
    for index in 0..call.arg_count() {
        let register = call.emit_arg(index, interpreter)?;
        let register = match call.expected_type(index) {
            Some(ValueType::Numeric(width)) if register.width() != width => {
                interpreter.promote(register, width)?
            }
            _ => register,
        };
        args.push(register);
    }

    let output = interpreter.alloc(result_type)?;
    let function_index = interpreter.intern_function(call.name(), Arc::clone(function));
    let data_slot = interpreter.add_constant_slot(call.is_constant(), call.take_data());
    trace!(
        "emit call '{}' -> {output} ({} args, slot {data_slot})",
        call.name(),
        args.len()
    );
    interpreter.push(Instruction::CallExternal(CallOperands {
        function: function_index,
        data_slot,
        output,
        arg_count: args.len(),
        args,
    }));
    Ok(output)
}
