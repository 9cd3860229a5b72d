use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use vexl_support::emit_error;

use super::bytecode::{ConstantSlot, FunctionEntry, Instruction, Program, Register};
use crate::env::VariableLayout;
use crate::extension::{ConstantData, Extension, FunctionExtension, SimpleFunction};
use crate::types::ValueType;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterKind {
    Numeric,
    String,
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegisterKind::Numeric => f.write_str("numeric"),
            RegisterKind::String => f.write_str("string"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EmitError {
    #[error("{}", emit_error("registers", format!("{} register budget of {} exhausted ({} more requested)", .kind, .limit, .requested)))]
    RegisterExhausted {
        kind: RegisterKind,
        requested: usize,
        limit: usize,
    },
    #[error("{}", emit_error(.0, "has no value to emit"))]
    Unresolved(String),
    #[error("{}", emit_error(.name, format!("cannot allocate a register for {}", .ty)))]
    InvalidType { name: String, ty: ValueType },
}

/// Upper bounds on register file sizes for one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterBudget {
    pub numeric: usize,
    pub strings: usize,
}

impl Default for RegisterBudget {
    fn default() -> Self {
        Self {
            numeric: 1 << 16,
            strings: 1 << 12,
        }
    }
}

/// Builds a [`Program`]: allocates registers, records their initial contents
/// and appends instructions.
///
/// Registers are never reused, so an index handed out stays valid for the
/// lifetime of the program.
pub struct Interpreter {
    budget: RegisterBudget,
    numeric: Vec<f64>,
    strings: Vec<Arc<str>>,
    instructions: Vec<Instruction>,
    functions: Vec<FunctionEntry>,
    function_indices: HashMap<String, usize>,
    constant_slots: Vec<ConstantSlot>,
    extensions: Vec<(String, Extension)>,
}

impl Interpreter {
    pub fn new(budget: RegisterBudget) -> Self {
        Self {
            budget,
            numeric: Vec::new(),
            strings: Vec::new(),
            instructions: Vec::new(),
            functions: Vec::new(),
            function_indices: HashMap::new(),
            constant_slots: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn alloc_numeric(&mut self, width: usize) -> Result<Register, EmitError> {
        assert!(width > 0, "numeric registers need a width of at least one");
        let index = self.numeric.len();
        if index + width > self.budget.numeric {
            return Err(EmitError::RegisterExhausted {
                kind: RegisterKind::Numeric,
                requested: width,
                limit: self.budget.numeric,
            });
        }
        self.numeric.resize(index + width, 0.0);
        Ok(Register::Numeric { index, width })
    }

    pub fn alloc_string(&mut self) -> Result<Register, EmitError> {
        let index = self.strings.len();
        if index + 1 > self.budget.strings {
            return Err(EmitError::RegisterExhausted {
                kind: RegisterKind::String,
                requested: 1,
                limit: self.budget.strings,
            });
        }
        self.strings.push(Arc::from(""));
        Ok(Register::String(index))
    }

    /// Allocates a register shaped like `ty`.
    pub fn alloc(&mut self, ty: ValueType) -> Result<Register, EmitError> {
        match ty {
            ValueType::Numeric(width) => self.alloc_numeric(width),
            ValueType::String => self.alloc_string(),
            other => Err(EmitError::InvalidType {
                name: "alloc".to_string(),
                ty: other,
            }),
        }
    }

    /// A fresh register whose initial contents are `values`.
    pub fn constant_numeric(&mut self, values: &[f64]) -> Result<Register, EmitError> {
        let register = self.alloc_numeric(values.len())?;
        if let Register::Numeric { index, width } = register {
            self.numeric[index..index + width].copy_from_slice(values);
        }
        Ok(register)
    }

    pub fn constant_string(&mut self, text: &str) -> Result<Register, EmitError> {
        let register = self.alloc_string()?;
        if let Register::String(index) = register {
            self.strings[index] = Arc::from(text);
        }
        Ok(register)
    }

    /// Appends an instruction and returns its position.
    pub fn push(&mut self, instruction: Instruction) -> usize {
        self.instructions.push(instruction);
        self.instructions.len() - 1
    }

    /// Position the next pushed instruction will occupy.
    pub fn next_position(&self) -> usize {
        self.instructions.len()
    }

    /// Points the jump at `position` to `target`.
    pub fn patch_jump(&mut self, position: usize, target: usize) {
        match &mut self.instructions[position] {
            Instruction::Jump(to) => *to = target,
            Instruction::JumpIfZero { target: to, .. } => *to = target,
            other => panic!("instruction {position} is not a jump: {other}"),
        }
    }

    /// Widens a scalar register to `width` lanes.
    pub fn promote(&mut self, src: Register, width: usize) -> Result<Register, EmitError> {
        assert_eq!(src.width(), 1, "only scalars can be promoted");
        let dest = self.alloc_numeric(width)?;
        self.push(Instruction::Promote { src, dest });
        Ok(dest)
    }

    /// Copies `src` into `dest`, broadcasting a scalar into a wider register.
    pub fn copy_into(&mut self, src: Register, dest: Register) {
        if src.width() == 1 && dest.width() > 1 {
            self.push(Instruction::Promote { src, dest });
        } else {
            debug_assert_eq!(src.width(), dest.width());
            self.push(Instruction::Copy { src, dest });
        }
    }

    pub(crate) fn intern_function(&mut self, name: &str, function: Arc<dyn SimpleFunction>) -> usize {
        if let Some(index) = self.function_indices.get(name) {
            return *index;
        }
        let index = self.functions.len();
        self.functions
            .push(FunctionEntry::new(name.to_string(), function));
        self.function_indices.insert(name.to_string(), index);
        index
    }

    pub(crate) fn add_constant_slot(&mut self, constant: bool, seed: Option<ConstantData>) -> usize {
        self.constant_slots.push(ConstantSlot::new(constant, seed));
        self.constant_slots.len() - 1
    }

    pub(crate) fn note_extension(&mut self, name: &str, extension: &Extension) {
        if !self.extensions.iter().any(|(known, _)| known == name) {
            self.extensions.push((name.to_string(), extension.clone()));
        }
    }

    pub(crate) fn finish(self, result: Register, variables: VariableLayout) -> Program {
        let thread_safe = self
            .extensions
            .iter()
            .all(|(_, extension)| extension.is_thread_safe());
        Program {
            instructions: self.instructions,
            numeric_image: self.numeric,
            string_image: self.strings,
            functions: self.functions,
            constant_slots: self.constant_slots,
            extensions: self.extensions,
            result,
            variables,
            thread_safe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_respects_the_budget() {
        let mut interpreter = Interpreter::new(RegisterBudget {
            numeric: 4,
            strings: 1,
        });
        assert_eq!(
            interpreter.alloc_numeric(3),
            Ok(Register::Numeric { index: 0, width: 3 })
        );
        assert!(matches!(
            interpreter.alloc_numeric(2),
            Err(EmitError::RegisterExhausted {
                kind: RegisterKind::Numeric,
                requested: 2,
                limit: 4
            })
        ));
        assert_eq!(interpreter.alloc_string(), Ok(Register::String(0)));
        assert!(interpreter.alloc_string().is_err());
    }

    #[test]
    fn jumps_are_patched_in_place() {
        let mut interpreter = Interpreter::new(RegisterBudget::default());
        let jump = interpreter.push(Instruction::Jump(0));
        interpreter.patch_jump(jump, 7);
        assert_eq!(interpreter.instructions[jump], Instruction::Jump(7));
    }

    #[test]
    #[should_panic(expected = "not a jump")]
    fn patching_a_non_jump_is_a_bug() {
        let mut interpreter = Interpreter::new(RegisterBudget::default());
        let register = interpreter.alloc_numeric(1).expect("alloc");
        let position = interpreter.push(Instruction::Copy {
            src: register,
            dest: register,
        });
        interpreter.patch_jump(position, 0);
    }
}
