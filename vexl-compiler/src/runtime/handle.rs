use std::any::Any;
use std::sync::Arc;

use super::bytecode::{CallOperands, Register};
use super::value::VariableBlock;
use crate::extension::{ConstantData, FoldedValue};
use crate::types::ValueType;

/// One function invocation's view of the register files.
///
/// Built fresh by the call instruction for every evaluation. Inputs are read
/// by argument position; the only writable register is the call's output.
pub struct ArgHandle<'a> {
    numeric: &'a mut [f64],
    strings: &'a mut [Arc<str>],
    operands: &'a CallOperands,
    data: Option<&'a ConstantData>,
    variables: &'a VariableBlock,
}

impl<'a> ArgHandle<'a> {
    pub(crate) fn new(
        numeric: &'a mut [f64],
        strings: &'a mut [Arc<str>],
        operands: &'a CallOperands,
        data: Option<&'a ConstantData>,
        variables: &'a VariableBlock,
    ) -> Self {
        Self {
            numeric,
            strings,
            operands,
            data,
            variables,
        }
    }

    /// Arguments at this call site. Fixed when the call was emitted.
    pub fn nargs(&self) -> usize {
        self.operands.arg_count
    }

    pub fn arg_type(&self, index: usize) -> ValueType {
        self.arg(index).value_type()
    }

    pub fn in_fp(&self, index: usize) -> &[f64] {
        match self.arg(index) {
            Register::Numeric { index: start, width } => &self.numeric[start..start + width],
            Register::String(_) => panic!("argument {index} is a string, not numeric"),
        }
    }

    pub fn in_scalar(&self, index: usize) -> f64 {
        self.in_fp(index)[0]
    }

    /// Argument `index` as a fixed-size vector. Panics on a width mismatch.
    pub fn in_vec<const N: usize>(&self, index: usize) -> [f64; N] {
        let values = self.in_fp(index);
        let mut out = [0.0; N];
        out.copy_from_slice(values);
        out
    }

    pub fn in_str(&self, index: usize) -> &str {
        match self.arg(index) {
            Register::String(slot) => &self.strings[slot],
            Register::Numeric { .. } => panic!("argument {index} is numeric, not a string"),
        }
    }

    pub fn out_fp(&mut self) -> &mut [f64] {
        match self.operands.output {
            Register::Numeric { index, width } => &mut self.numeric[index..index + width],
            Register::String(_) => panic!("call output is a string register"),
        }
    }

    /// Writes `value` into every lane of the output.
    pub fn set_out_scalar(&mut self, value: f64) {
        self.out_fp().fill(value);
    }

    pub fn set_out_fp(&mut self, values: &[f64]) {
        self.out_fp().copy_from_slice(values);
    }

    pub fn set_out_str(&mut self, value: impl Into<Arc<str>>) {
        match self.operands.output {
            Register::String(slot) => self.strings[slot] = value.into(),
            Register::Numeric { .. } => panic!("call output is a numeric register"),
        }
    }

    /// The call site's payload, if checking or folding produced one.
    pub fn data(&self) -> Option<&ConstantData> {
        self.data
    }

    pub fn data_as<T: Any>(&self) -> Option<&T> {
        self.data.and_then(|data| (**data).downcast_ref::<T>())
    }

    /// Host variables of the current evaluation.
    pub fn var_block(&self) -> &VariableBlock {
        self.variables
    }

    /// Captures the current output as a [`FoldedValue`] payload.
    pub fn fold_output(&self) -> ConstantData {
        let folded = match self.operands.output {
            Register::Numeric { index, width } => {
                FoldedValue::Numeric(self.numeric[index..index + width].to_vec())
            }
            Register::String(slot) => FoldedValue::Text(Arc::clone(&self.strings[slot])),
        };
        Arc::new(folded)
    }

    fn arg(&self, index: usize) -> Register {
        assert!(
            index < self.operands.arg_count,
            "argument {index} out of range for a call with {} arguments",
            self.operands.arg_count
        );
        self.operands.args[index]
    }
}
