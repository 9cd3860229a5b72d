use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::env::VariableLayout;
use crate::extension::{ConstantData, Extension, FunctionExtension, SimpleFunction, Statistics};
use crate::types::ValueType;

/// A location in one of the two register files. Numeric registers span
/// `width` consecutive slots starting at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Numeric { index: usize, width: usize },
    String(usize),
}

impl Register {
    /// Numeric width; zero for string registers.
    pub fn width(self) -> usize {
        match self {
            Register::Numeric { width, .. } => width,
            Register::String(_) => 0,
        }
    }

    pub fn value_type(self) -> ValueType {
        match self {
            Register::Numeric { width, .. } => ValueType::vector(width),
            Register::String(_) => ValueType::string(),
        }
    }

    pub fn is_string(self) -> bool {
        matches!(self, Register::String(_))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Numeric { index, width: 1 } => write!(f, "n{index}"),
            Register::Numeric { index, width } => write!(f, "n{index}..{}", index + width),
            Register::String(index) => write!(f, "s{index}"),
        }
    }
}

/// Operands of the generic external call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOperands {
    /// Index into [`Program::functions`].
    pub function: usize,
    pub data_slot: usize,
    pub output: Register,
    pub arg_count: usize,
    pub args: Vec<Register>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    LoadVariable {
        slot: usize,
        dest: Register,
    },
    Copy {
        src: Register,
        dest: Register,
    },
    /// Broadcasts a scalar into every lane of `dest`.
    Promote {
        src: Register,
        dest: Register,
    },
    Unary {
        operator: UnaryOperator,
        src: Register,
        dest: Register,
    },
    /// Element-wise; a scalar operand broadcasts. Comparisons yield 1 or 0.
    Binary {
        operator: BinaryOperator,
        lhs: Register,
        rhs: Register,
        dest: Register,
    },
    Jump(usize),
    JumpIfZero {
        cond: Register,
        target: usize,
    },
    CallExternal(CallOperands),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::LoadVariable { slot, dest } => write!(f, "LOAD_VAR {dest} <- ${slot}"),
            Instruction::Copy { src, dest } => write!(f, "COPY {dest} <- {src}"),
            Instruction::Promote { src, dest } => write!(f, "PROMOTE {dest} <- {src}"),
            Instruction::Unary {
                operator: UnaryOperator::Negate,
                src,
                dest,
            } => write!(f, "NEG {dest} <- {src}"),
            Instruction::Binary {
                operator,
                lhs,
                rhs,
                dest,
            } => write!(f, "BINARY {dest} <- {lhs} {operator} {rhs}"),
            Instruction::Jump(target) => write!(f, "JUMP @{target}"),
            Instruction::JumpIfZero { cond, target } => write!(f, "JUMP_IF_ZERO {cond} @{target}"),
            Instruction::CallExternal(call) => {
                write!(
                    f,
                    "CALL f{} slot{} {} <- ({}",
                    call.function, call.data_slot, call.output, call.arg_count
                )?;
                for arg in &call.args {
                    write!(f, " {arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A simple function referenced by call instructions, with its call counter.
pub struct FunctionEntry {
    pub name: String,
    pub function: Arc<dyn SimpleFunction>,
    pub(crate) calls: AtomicU64,
}

impl FunctionEntry {
    pub(crate) fn new(name: String, function: Arc<dyn SimpleFunction>) -> Self {
        Self {
            name,
            function,
            calls: AtomicU64::new(0),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for FunctionEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("name", &self.name)
            .field("calls", &self.calls())
            .finish()
    }
}

/// Per-call-site payload storage. Filled at most once: seeded from checking,
/// or by the folding hook on the first evaluation of a constant call.
pub(crate) struct ConstantSlot {
    pub constant: bool,
    pub payload: OnceLock<Option<ConstantData>>,
}

impl ConstantSlot {
    pub fn new(constant: bool, seed: Option<ConstantData>) -> Self {
        let payload = OnceLock::new();
        if seed.is_some() {
            let _ = payload.set(seed);
        }
        Self { constant, payload }
    }
}

/// A compiled expression. Immutable apart from folding caches and call
/// counters, so one program may be shared by many evaluations.
pub struct Program {
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) numeric_image: Vec<f64>,
    pub(crate) string_image: Vec<Arc<str>>,
    pub(crate) functions: Vec<FunctionEntry>,
    pub(crate) constant_slots: Vec<ConstantSlot>,
    pub(crate) extensions: Vec<(String, Extension)>,
    pub(crate) result: Register,
    pub(crate) variables: VariableLayout,
    pub(crate) thread_safe: bool,
}

impl Program {
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn functions(&self) -> &[FunctionEntry] {
        &self.functions
    }

    pub fn result_register(&self) -> Register {
        self.result
    }

    pub fn result_type(&self) -> ValueType {
        self.result.value_type()
    }

    pub fn variables(&self) -> &VariableLayout {
        &self.variables
    }

    /// True only when every function the expression calls is thread-safe.
    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    pub fn numeric_register_count(&self) -> usize {
        self.numeric_image.len()
    }

    pub fn string_register_count(&self) -> usize {
        self.string_image.len()
    }

    /// Names of the functions this program calls, in first-use order.
    pub fn extension_names(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(|(name, _)| name.as_str())
    }

    pub fn size_in_bytes(&self) -> usize {
        let extensions: usize = self
            .extensions
            .iter()
            .map(|(_, extension)| extension.size_in_bytes())
            .sum();
        extensions
            + self.instructions.len() * std::mem::size_of::<Instruction>()
            + self.numeric_image.len() * std::mem::size_of::<f64>()
            + self
                .string_image
                .iter()
                .map(|text| std::mem::size_of::<Arc<str>>() + text.len())
                .sum::<usize>()
    }

    pub fn statistics(&self) -> Statistics {
        let mut statistics = Statistics::new();
        for (_, extension) in &self.extensions {
            extension.statistics(&mut statistics);
        }
        for entry in &self.functions {
            *statistics
                .entry(format!("calls.{}", entry.name))
                .or_insert(0.0) += entry.calls() as f64;
        }
        statistics.insert("instructions".into(), self.instructions.len() as f64);
        statistics.insert("registers.numeric".into(), self.numeric_image.len() as f64);
        statistics.insert("registers.string".into(), self.string_image.len() as f64);
        statistics
    }

    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        for (index, instruction) in self.instructions.iter().enumerate() {
            out.push_str(&format!("{index:04} {instruction}\n"));
        }
        for (index, entry) in self.functions.iter().enumerate() {
            out.push_str(&format!("f{index} = {}\n", entry.name));
        }
        out.push_str(&format!("result {} : {}\n", self.result, self.result_type()));
        out
    }
}

impl fmt::Debug for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Program")
            .field("instructions", &self.instructions)
            .field("numeric_registers", &self.numeric_image.len())
            .field("string_registers", &self.string_image.len())
            .field("functions", &self.functions)
            .field("result", &self.result)
            .field("thread_safe", &self.thread_safe)
            .finish()
    }
}
