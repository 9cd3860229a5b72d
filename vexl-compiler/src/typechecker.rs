use std::collections::HashMap;
use std::fmt;
use std::mem;

use log::trace;
use vexl_support::check_error;

use crate::ast::{
    BinaryExpression, CallExpression, CallSiteId, Expression, ExpressionKind, Script, SourceSpan,
    UnaryExpression,
};
use crate::diagnostics::Diagnostics;
use crate::env::VarEnvBuilder;
use crate::extension::{ConstantData, FunctionExtension, FunctionRegistry};
use crate::runtime::Register;
use crate::types::ValueType;

/// Progress of one call site through the pipeline.
///
/// There is no separate evaluable state: a [`Program`] exists only once every
/// call site in it reached `CodeEmitted`, so holding one is that state.
///
/// [`Program`]: crate::runtime::Program
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallSiteState {
    Unchecked,
    Checked(ValueType),
    CodeEmitted(Register),
}

/// What checking learned about a call site, consumed by emission.
#[derive(Clone)]
pub(crate) struct CallSiteInfo {
    pub state: CallSiteState,
    pub result_type: ValueType,
    pub expected_types: Vec<Option<ValueType>>,
    pub constant: bool,
    pub data: Option<ConstantData>,
}

impl fmt::Debug for CallSiteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSiteInfo")
            .field("state", &self.state)
            .field("result_type", &self.result_type)
            .field("expected_types", &self.expected_types)
            .field("constant", &self.constant)
            .field("has_data", &self.data.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckedType {
    pub ty: ValueType,
    /// Fully determined before evaluation.
    pub constant: bool,
}

impl CheckedType {
    fn constant(ty: ValueType) -> Self {
        Self { ty, constant: true }
    }

    fn varying(ty: ValueType) -> Self {
        Self {
            ty,
            constant: false,
        }
    }
}

pub struct TypeChecker<'r> {
    registry: &'r FunctionRegistry,
    diagnostics: Diagnostics,
    call_sites: HashMap<CallSiteId, CallSiteInfo>,
    local_constness: HashMap<String, bool>,
}

impl<'r> TypeChecker<'r> {
    pub fn new(registry: &'r FunctionRegistry) -> Self {
        Self {
            registry,
            diagnostics: Diagnostics::new(),
            call_sites: HashMap::new(),
            local_constness: HashMap::new(),
        }
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn call_site_state(&self, id: CallSiteId) -> CallSiteState {
        self.call_sites
            .get(&id)
            .map_or(CallSiteState::Unchecked, |info| info.state)
    }

    /// Moves the collected diagnostics out, leaving the call-site records.
    pub fn take_diagnostics(&mut self) -> Diagnostics {
        mem::take(&mut self.diagnostics)
    }

    pub(crate) fn into_call_sites(self) -> HashMap<CallSiteId, CallSiteInfo> {
        self.call_sites
    }

    /// Checks assignments in order, declaring each local, then the result.
    pub fn check_script(
        &mut self,
        script: &Script,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType {
        for assignment in &script.assignments {
            let checked = self.check_expression(&assignment.value, false, env);
            trace!("local '{}' : {}", assignment.name, checked.ty);
            // Errors are declared too so later references do not re-report.
            let ty = if checked.ty.is_valid() {
                checked.ty
            } else {
                ValueType::error()
            };
            env.declare(assignment.name.clone(), ty);
            self.local_constness
                .insert(assignment.name.clone(), checked.constant);
        }
        self.check_expression(&script.result, wants_scalar, env).ty
    }

    pub fn check_expression(
        &mut self,
        expression: &Expression,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> CheckedType {
        match &expression.kind {
            ExpressionKind::Number(_) => CheckedType::constant(ValueType::scalar()),
            ExpressionKind::String(_) => CheckedType::constant(ValueType::string()),
            ExpressionKind::Vector(elements) => {
                self.check_vector(elements, expression.span, env)
            }
            ExpressionKind::Local(name) => match env.lookup(name) {
                Some(ty) => CheckedType {
                    ty,
                    constant: self.local_constness.get(name).copied().unwrap_or(false),
                },
                None => {
                    self.report(name, "is not defined", expression.span);
                    CheckedType::varying(ValueType::error())
                }
            },
            ExpressionKind::Variable(name) => match env.lookup_host(name) {
                Some(ty) => CheckedType::varying(ty),
                None => {
                    self.report(&format!("${name}"), "is not a declared variable", expression.span);
                    CheckedType::varying(ValueType::error())
                }
            },
            ExpressionKind::Unary(unary) => self.check_unary(unary, expression.span, env),
            ExpressionKind::Binary(binary) => self.check_binary(binary, expression.span, env),
            ExpressionKind::Call(call) => self.check_call(call, wants_scalar, env),
        }
    }

    fn check_vector(
        &mut self,
        elements: &[Expression],
        span: SourceSpan,
        env: &mut VarEnvBuilder,
    ) -> CheckedType {
        if elements.is_empty() {
            self.report("[]", "vector literals need at least one element", span);
            return CheckedType::varying(ValueType::error());
        }
        let mut valid = true;
        let mut constant = true;
        for element in elements {
            let checked = self.check_expression(element, true, env);
            constant &= checked.constant;
            if checked.ty.is_error() {
                valid = false;
            } else if !checked.ty.is_scalar() {
                self.report(
                    "[]",
                    format!("vector elements must be Float, found {}", checked.ty),
                    element.span,
                );
                valid = false;
            }
        }
        let ty = if valid {
            ValueType::vector(elements.len())
        } else {
            ValueType::error()
        };
        CheckedType { ty, constant }
    }

    fn check_unary(
        &mut self,
        unary: &UnaryExpression,
        span: SourceSpan,
        env: &mut VarEnvBuilder,
    ) -> CheckedType {
        let operand = self.check_expression(&unary.operand, false, env);
        if operand.ty.is_error() || operand.ty.is_numeric() {
            return operand;
        }
        self.report("-", format!("cannot negate {}", operand.ty), span);
        CheckedType {
            ty: ValueType::error(),
            constant: operand.constant,
        }
    }

    fn check_binary(
        &mut self,
        binary: &BinaryExpression,
        span: SourceSpan,
        env: &mut VarEnvBuilder,
    ) -> CheckedType {
        let left = self.check_expression(&binary.left, false, env);
        let right = self.check_expression(&binary.right, false, env);
        let constant = left.constant && right.constant;
        if left.ty.is_error() || right.ty.is_error() {
            return CheckedType {
                ty: ValueType::error(),
                constant,
            };
        }
        let ty = left.ty.combine(right.ty);
        if ty.is_error() {
            self.report(
                binary.operator.symbol(),
                format!("cannot combine {} with {}", left.ty, right.ty),
                span,
            );
        }
        CheckedType { ty, constant }
    }

    fn check_call(
        &mut self,
        call: &CallExpression,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> CheckedType {
        let registry = self.registry;
        let Some(extension) = registry.get(&call.name) else {
            self.report(&call.name, "is not a registered function", call.name_span);
            self.call_sites.insert(call.id, CallSiteInfo::failed(call));
            // Still check arguments so their own errors surface.
            for argument in &call.arguments {
                self.check_expression(argument, false, env);
            }
            return CheckedType::varying(ValueType::error());
        };

        let errors_before = self.diagnostics.error_count();
        let mut check = CallCheck::new(self, call);
        let result = extension.check_types(&mut check, wants_scalar, env);
        let (info, constant) = check.finish(result);
        let result = info.result_type;
        if !result.is_valid() && self.diagnostics.error_count() == errors_before {
            self.report(&call.name, "failed to type check", call.name_span);
        }
        trace!(
            "call '{}' #{} : {result} (constant: {constant})",
            call.name,
            call.id.0
        );
        self.call_sites.insert(call.id, info);
        CheckedType {
            ty: if result.is_valid() {
                result
            } else {
                ValueType::error()
            },
            constant,
        }
    }

    fn report(&mut self, subject: &str, detail: impl fmt::Display, span: SourceSpan) {
        self.diagnostics
            .push_error_with_span(check_error(subject, detail), Some(span));
    }
}

impl CallSiteInfo {
    fn failed(call: &CallExpression) -> Self {
        Self {
            state: CallSiteState::Checked(ValueType::error()),
            result_type: ValueType::error(),
            expected_types: vec![None; call.arguments.len()],
            constant: false,
            data: None,
        }
    }
}

/// A function's view of its own call site while it is being checked.
pub struct CallCheck<'c, 'r> {
    checker: &'c mut TypeChecker<'r>,
    call: &'c CallExpression,
    argument_types: Vec<Option<CheckedType>>,
    expected_types: Vec<Option<ValueType>>,
    varying: bool,
    data: Option<ConstantData>,
}

impl<'c, 'r> CallCheck<'c, 'r> {
    fn new(checker: &'c mut TypeChecker<'r>, call: &'c CallExpression) -> Self {
        let count = call.arguments.len();
        Self {
            checker,
            call,
            argument_types: vec![None; count],
            expected_types: vec![None; count],
            varying: false,
            data: None,
        }
    }

    pub fn name(&self) -> &'c str {
        &self.call.name
    }

    pub fn arg_count(&self) -> usize {
        self.call.arguments.len()
    }

    /// Checks argument `index` and returns its type.
    pub fn check_arg(
        &mut self,
        index: usize,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType {
        let call = self.call;
        let checked = self
            .checker
            .check_expression(&call.arguments[index], wants_scalar, env);
        self.argument_types[index] = Some(checked);
        checked.ty
    }

    /// Type of an argument already passed through [`Self::check_arg`].
    pub fn arg_type(&self, index: usize) -> Option<ValueType> {
        self.argument_types[index].map(|checked| checked.ty)
    }

    /// The text of argument `index` when it is a string literal.
    pub fn arg_string_literal(&self, index: usize) -> Option<&'c str> {
        match &self.call.arguments.get(index)?.kind {
            ExpressionKind::String(text) => Some(text),
            _ => None,
        }
    }

    /// Records the type emission must deliver for argument `index`. A scalar
    /// argument recorded against a wider vector is promoted.
    pub fn expect_arg(&mut self, index: usize, expected: ValueType) {
        self.expected_types[index] = Some(expected);
    }

    /// Marks the call's result as changing between evaluations even when its
    /// arguments are constant.
    pub fn mark_varying(&mut self) {
        self.varying = true;
    }

    /// Attaches a payload computed while checking. Evaluation hands it back
    /// through the call's argument handle.
    pub fn set_data(&mut self, data: ConstantData) {
        self.data = Some(data);
    }

    /// Reports an error at the call and returns the error type.
    pub fn error(&mut self, message: impl Into<String>) -> ValueType {
        self.checker
            .diagnostics
            .push_error_with_span(message, Some(self.call.name_span));
        ValueType::error()
    }

    /// Reports an error at argument `index` and returns the error type.
    pub fn arg_error(&mut self, index: usize, message: impl Into<String>) -> ValueType {
        let span = self.call.arguments[index].span;
        self.checker
            .diagnostics
            .push_error_with_span(message, Some(span));
        ValueType::error()
    }

    fn finish(self, result: ValueType) -> (CallSiteInfo, bool) {
        let constant = !self.varying
            && self
                .argument_types
                .iter()
                .all(|checked| checked.map_or(false, |checked| checked.constant));
        let result_type = if result.is_valid() {
            result
        } else {
            ValueType::error()
        };
        let info = CallSiteInfo {
            state: CallSiteState::Checked(result_type),
            result_type,
            expected_types: self.expected_types,
            constant,
            data: self.data,
        };
        (info, constant)
    }
}
