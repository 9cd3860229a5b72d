use std::collections::HashMap;

use log::trace;

use super::bytecode::{Instruction, Register};
use super::interpreter::{EmitError, Interpreter};
use crate::ast::{CallExpression, CallSiteId, Expression, ExpressionKind, Script};
use crate::env::VariableLayout;
use crate::extension::{ConstantData, FunctionExtension, FunctionRegistry};
use crate::typechecker::{CallSiteInfo, CallSiteState, TypeChecker};
use crate::types::ValueType;

/// Lowers a checked script into interpreter instructions.
pub struct CodeGenerator<'r> {
    registry: &'r FunctionRegistry,
    variables: &'r VariableLayout,
    call_sites: HashMap<CallSiteId, CallSiteInfo>,
    locals: HashMap<String, Register>,
}

impl<'r> CodeGenerator<'r> {
    /// Takes over the call-site records `checker` produced. Emitting a call
    /// the checker never saw, or one it rejected, panics.
    pub fn new(
        registry: &'r FunctionRegistry,
        variables: &'r VariableLayout,
        checker: TypeChecker<'_>,
    ) -> Self {
        Self {
            registry,
            variables,
            call_sites: checker.into_call_sites(),
            locals: HashMap::new(),
        }
    }

    /// Emits every assignment and then the result expression. Returns the
    /// register holding the result.
    pub fn compile_script(
        &mut self,
        script: &Script,
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError> {
        for assignment in &script.assignments {
            let register = self.emit_expression(&assignment.value, interpreter)?;
            self.locals.insert(assignment.name.clone(), register);
        }
        self.emit_expression(&script.result, interpreter)
    }

    pub fn call_site_state(&self, id: CallSiteId) -> CallSiteState {
        self.call_sites
            .get(&id)
            .map_or(CallSiteState::Unchecked, |info| info.state)
    }

    pub(crate) fn into_call_sites(self) -> HashMap<CallSiteId, CallSiteInfo> {
        self.call_sites
    }

    fn emit_expression(
        &mut self,
        expression: &Expression,
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError> {
        match &expression.kind {
            ExpressionKind::Number(value) => interpreter.constant_numeric(&[*value]),
            ExpressionKind::String(text) => interpreter.constant_string(text),
            ExpressionKind::Vector(elements) => self.emit_vector(elements, interpreter),
            ExpressionKind::Local(name) => self
                .locals
                .get(name)
                .copied()
                .ok_or_else(|| EmitError::Unresolved(name.clone())),
            ExpressionKind::Variable(name) => {
                let slot = self
                    .variables
                    .slot(name)
                    .ok_or_else(|| EmitError::Unresolved(format!("${name}")))?;
                let ty = self.variables.slots()[slot].ty;
                let dest = interpreter.alloc(ty)?;
                interpreter.push(Instruction::LoadVariable { slot, dest });
                Ok(dest)
            }
            ExpressionKind::Unary(unary) => {
                let src = self.emit_expression(&unary.operand, interpreter)?;
                let dest = interpreter.alloc_numeric(src.width())?;
                interpreter.push(Instruction::Unary {
                    operator: unary.operator,
                    src,
                    dest,
                });
                Ok(dest)
            }
            ExpressionKind::Binary(binary) => {
                let lhs = self.emit_expression(&binary.left, interpreter)?;
                let rhs = self.emit_expression(&binary.right, interpreter)?;
                let dest = interpreter.alloc_numeric(lhs.width().max(rhs.width()))?;
                interpreter.push(Instruction::Binary {
                    operator: binary.operator,
                    lhs,
                    rhs,
                    dest,
                });
                Ok(dest)
            }
            ExpressionKind::Call(call) => self.emit_call(call, interpreter),
        }
    }

    fn emit_vector(
        &mut self,
        elements: &[Expression],
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError> {
        let literals: Option<Vec<f64>> = elements
            .iter()
            .map(|element| match element.kind {
                ExpressionKind::Number(value) => Some(value),
                _ => None,
            })
            .collect();
        if let Some(values) = literals {
            return interpreter.constant_numeric(&values);
        }

        let dest = interpreter.alloc_numeric(elements.len())?;
        let Register::Numeric { index: start, .. } = dest else {
            unreachable!("numeric allocation returned a string register");
        };
        for (lane, element) in elements.iter().enumerate() {
            let src = self.emit_expression(element, interpreter)?;
            interpreter.push(Instruction::Copy {
                src,
                dest: Register::Numeric {
                    index: start + lane,
                    width: 1,
                },
            });
        }
        Ok(dest)
    }

    fn emit_call(
        &mut self,
        call: &CallExpression,
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError> {
        let registry = self.registry;
        let extension = registry
            .get(&call.name)
            .ok_or_else(|| EmitError::Unresolved(call.name.clone()))?;
        let info = match self.call_sites.get(&call.id) {
            Some(info) => info.clone(),
            None => panic!("call to '{}' reached emission before checking", call.name),
        };
        match info.state {
            CallSiteState::Unchecked => {
                panic!("call to '{}' reached emission before checking", call.name)
            }
            CallSiteState::CodeEmitted(_) => {
                panic!("call to '{}' was already emitted", call.name)
            }
            CallSiteState::Checked(ty) if !ty.is_valid() => {
                panic!("call to '{}' failed checking and cannot be emitted", call.name)
            }
            CallSiteState::Checked(_) => {}
        }

        interpreter.note_extension(&call.name, extension);
        let mut emit = CallEmit {
            call,
            info,
            generator: &mut *self,
        };
        let register = extension.build_interpreter(&mut emit, interpreter)?;
        trace!("call '{}' #{} emitted into {register}", call.name, call.id.0);
        if let Some(info) = self.call_sites.get_mut(&call.id) {
            debug_assert!(
                info.result_type.is_string() == register.is_string()
                    && info.result_type.width() == register.width(),
                "call '{}' produced {register} for {}",
                call.name,
                info.result_type
            );
            info.state = CallSiteState::CodeEmitted(register);
        }
        Ok(register)
    }
}

/// A function's view of its own call site during emission.
pub struct CallEmit<'a, 'r> {
    call: &'a CallExpression,
    info: CallSiteInfo,
    generator: &'a mut CodeGenerator<'r>,
}

impl<'a, 'r> CallEmit<'a, 'r> {
    pub fn name(&self) -> &'a str {
        &self.call.name
    }

    pub fn arg_count(&self) -> usize {
        self.call.arguments.len()
    }

    /// The type checking settled on for this call.
    pub fn result_type(&self) -> ValueType {
        self.info.result_type
    }

    /// The type recorded for argument `index` while checking, if any.
    pub fn expected_type(&self, index: usize) -> Option<ValueType> {
        self.info.expected_types.get(index).copied().flatten()
    }

    /// Every argument is constant and the function did not mark the call as
    /// varying.
    pub fn is_constant(&self) -> bool {
        self.info.constant
    }

    pub fn data(&self) -> Option<&ConstantData> {
        self.info.data.as_ref()
    }

    pub fn take_data(&mut self) -> Option<ConstantData> {
        self.info.data.take()
    }

    /// Emits argument `index` and returns the register holding its value.
    pub fn emit_arg(
        &mut self,
        index: usize,
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError> {
        let call = self.call;
        self.generator
            .emit_expression(&call.arguments[index], interpreter)
    }
}
