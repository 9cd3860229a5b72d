use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use log::{debug, trace, warn};
use thiserror::Error;

use super::bytecode::{CallOperands, Instruction, Program, Register};
use super::handle::ArgHandle;
use super::value::{Value, VariableBlock};
use crate::ast::{BinaryOperator, UnaryOperator};
use crate::extension::FoldedValue;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum VmError {
    #[error("variable block does not match the layout the program was compiled against")]
    LayoutMismatch,
    #[error("batch evaluation needs at least one thread")]
    NoThreads,
}

/// Numeric and string registers plus the call stack of one evaluation.
///
/// Belongs to exactly one evaluation at a time.
#[derive(Debug, Clone)]
pub struct RegisterFile {
    numeric: Vec<f64>,
    strings: Vec<Arc<str>>,
    call_stack: Vec<usize>,
}

impl RegisterFile {
    pub fn for_program(program: &Program) -> Self {
        Self {
            numeric: program.numeric_image.clone(),
            strings: program.string_image.clone(),
            call_stack: Vec::new(),
        }
    }

    pub fn numeric(&self) -> &[f64] {
        &self.numeric
    }

    pub fn numeric_mut(&mut self) -> &mut [f64] {
        &mut self.numeric
    }

    pub fn strings(&self) -> &[Arc<str>] {
        &self.strings
    }

    pub fn strings_mut(&mut self) -> &mut [Arc<str>] {
        &mut self.strings
    }

    /// Positions of the call instructions currently executing.
    pub fn call_stack(&self) -> &[usize] {
        &self.call_stack
    }

    pub fn read(&self, register: Register) -> Value {
        match register {
            Register::Numeric { index, width } => {
                Value::from_numeric(&self.numeric[index..index + width])
            }
            Register::String(index) => Value::String(self.strings[index].to_string()),
        }
    }
}

pub struct Vm<'p> {
    program: &'p Program,
    registers: RegisterFile,
}

impl<'p> Vm<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self {
            program,
            registers: RegisterFile::for_program(program),
        }
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.registers
    }

    /// Runs the program once against `variables` and returns its result.
    ///
    /// Registers keep their contents between runs; every register is written
    /// before it is read, so stale values never leak into a result.
    pub fn run(&mut self, variables: &VariableBlock) -> Result<Value, VmError> {
        if variables.layout() != &self.program.variables {
            return Err(VmError::LayoutMismatch);
        }
        let program = self.program;
        let mut ip = 0;
        while let Some(instruction) = program.instructions.get(ip) {
            ip += 1;
            match instruction {
                Instruction::LoadVariable { slot, dest } => match *dest {
                    Register::Numeric { index, width } => {
                        let values = variables.numeric(*slot);
                        self.registers.numeric[index..index + width].copy_from_slice(values);
                    }
                    Register::String(index) => {
                        self.registers.strings[index] = Arc::clone(variables.text(*slot));
                    }
                },
                Instruction::Copy { src, dest } => self.copy(*src, *dest),
                Instruction::Promote { src, dest } => {
                    let (src, _) = numeric_range(*src);
                    let (start, width) = numeric_range(*dest);
                    let value = self.registers.numeric[src];
                    self.registers.numeric[start..start + width].fill(value);
                }
                Instruction::Unary {
                    operator: UnaryOperator::Negate,
                    src,
                    dest,
                } => {
                    let (src, _) = numeric_range(*src);
                    let (start, width) = numeric_range(*dest);
                    for lane in 0..width {
                        self.registers.numeric[start + lane] = -self.registers.numeric[src + lane];
                    }
                }
                Instruction::Binary {
                    operator,
                    lhs,
                    rhs,
                    dest,
                } => self.binary(*operator, *lhs, *rhs, *dest),
                Instruction::Jump(target) => ip = *target,
                Instruction::JumpIfZero { cond, target } => {
                    let (index, _) = numeric_range(*cond);
                    if self.registers.numeric[index] == 0.0 {
                        ip = *target;
                    }
                }
                Instruction::CallExternal(call) => self.call_external(ip - 1, call, variables),
            }
        }
        Ok(self.registers.read(program.result))
    }

    fn copy(&mut self, src: Register, dest: Register) {
        match (src, dest) {
            (Register::String(src), Register::String(dest)) => {
                let value = Arc::clone(&self.registers.strings[src]);
                self.registers.strings[dest] = value;
            }
            (
                Register::Numeric { index: src, width },
                Register::Numeric { index: dest, .. },
            ) => {
                self.registers
                    .numeric
                    .copy_within(src..src + width, dest);
            }
            (src, dest) => panic!("cannot copy {src} into {dest}"),
        }
    }

    fn binary(&mut self, operator: BinaryOperator, lhs: Register, rhs: Register, dest: Register) {
        let (left, left_width) = numeric_range(lhs);
        let (right, right_width) = numeric_range(rhs);
        let (start, width) = numeric_range(dest);
        let numeric = &mut self.registers.numeric;
        for lane in 0..width {
            let a = numeric[left + lane.min(left_width - 1)];
            let b = numeric[right + lane.min(right_width - 1)];
            numeric[start + lane] = apply_binary(operator, a, b);
        }
    }

    fn call_external(&mut self, position: usize, call: &'p CallOperands, variables: &VariableBlock) {
        let program = self.program;
        let entry = &program.functions[call.function];
        let slot = &program.constant_slots[call.data_slot];
        entry.calls.fetch_add(1, Ordering::Relaxed);
        self.registers.call_stack.push(position);

        let registers = &mut self.registers;
        let payload = slot.payload.get_or_init(|| {
            if !slot.constant {
                return None;
            }
            trace!("folding constant call to '{}'", entry.name);
            let mut handle = ArgHandle::new(
                &mut registers.numeric,
                &mut registers.strings,
                call,
                None,
                variables,
            );
            entry.function.eval_constant(&mut handle)
        });

        let folded = payload
            .as_ref()
            .and_then(|data| (**data).downcast_ref::<FoldedValue>());
        match folded {
            Some(folded) => write_folded(registers, call.output, folded),
            None => {
                let mut handle = ArgHandle::new(
                    &mut registers.numeric,
                    &mut registers.strings,
                    call,
                    payload.as_ref(),
                    variables,
                );
                entry.function.eval(&mut handle);
            }
        }
        self.registers.call_stack.pop();
    }
}

fn numeric_range(register: Register) -> (usize, usize) {
    match register {
        Register::Numeric { index, width } => (index, width),
        Register::String(index) => panic!("s{index} used where a numeric register is required"),
    }
}

fn write_folded(registers: &mut RegisterFile, output: Register, folded: &FoldedValue) {
    match (output, folded) {
        (Register::Numeric { index, width }, FoldedValue::Numeric(values)) => {
            assert_eq!(values.len(), width, "folded value does not fit {output}");
            registers.numeric[index..index + width].copy_from_slice(values);
        }
        (Register::String(index), FoldedValue::Text(text)) => {
            registers.strings[index] = Arc::clone(text);
        }
        (output, folded) => panic!("folded value {folded:?} does not fit {output}"),
    }
}

fn truth(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

pub(crate) fn apply_binary(operator: BinaryOperator, a: f64, b: f64) -> f64 {
    match operator {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => a / b,
        BinaryOperator::Modulo => a % b,
        BinaryOperator::Power => a.powf(b),
        BinaryOperator::Equal => truth(a == b),
        BinaryOperator::NotEqual => truth(a != b),
        BinaryOperator::Less => truth(a < b),
        BinaryOperator::LessEqual => truth(a <= b),
        BinaryOperator::Greater => truth(a > b),
        BinaryOperator::GreaterEqual => truth(a >= b),
    }
}

impl Program {
    /// A variable block laid out for this program, with every variable unset.
    pub fn new_variable_block(&self) -> VariableBlock {
        VariableBlock::new(&self.variables)
    }

    /// Evaluates once with a fresh register file.
    pub fn evaluate(&self, variables: &VariableBlock) -> Result<Value, VmError> {
        Vm::new(self).run(variables)
    }

    /// Evaluates every block, spreading the work over up to `threads` workers.
    ///
    /// Programs that call a function which is not thread-safe always run on
    /// the calling thread. Results keep the order of `blocks`.
    pub fn evaluate_batch(
        &self,
        blocks: &[VariableBlock],
        threads: usize,
    ) -> Result<Vec<Value>, VmError> {
        if threads == 0 {
            return Err(VmError::NoThreads);
        }
        if threads == 1 || blocks.len() < 2 {
            return self.evaluate_sequential(blocks);
        }
        if !self.thread_safe {
            warn!(
                "expression calls a function that is not thread-safe; evaluating {} inputs on one thread",
                blocks.len()
            );
            return self.evaluate_sequential(blocks);
        }

        let chunk_size = blocks.len().div_ceil(threads);
        debug!(
            "evaluating {} inputs on {} threads",
            blocks.len(),
            blocks.len().div_ceil(chunk_size)
        );
        thread::scope(|scope| -> Result<Vec<Value>, VmError> {
            let workers: Vec<_> = blocks
                .chunks(chunk_size)
                .map(|chunk| scope.spawn(move || self.evaluate_sequential(chunk)))
                .collect();
            let mut results = Vec::with_capacity(blocks.len());
            for worker in workers {
                match worker.join() {
                    Ok(chunk) => results.extend(chunk?),
                    Err(panic) => std::panic::resume_unwind(panic),
                }
            }
            Ok(results)
        })
    }

    fn evaluate_sequential(&self, blocks: &[VariableBlock]) -> Result<Vec<Value>, VmError> {
        let mut vm = Vm::new(self);
        blocks.iter().map(|block| vm.run(block)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparisons_produce_zero_or_one() {
        assert_eq!(apply_binary(BinaryOperator::Less, 1.0, 2.0), 1.0);
        assert_eq!(apply_binary(BinaryOperator::GreaterEqual, 1.0, 2.0), 0.0);
        assert_eq!(apply_binary(BinaryOperator::Equal, 3.0, 3.0), 1.0);
    }

    #[test]
    fn arithmetic_follows_ieee_rules() {
        assert!(apply_binary(BinaryOperator::Divide, 1.0, 0.0).is_infinite());
        assert!(apply_binary(BinaryOperator::Modulo, 1.0, 0.0).is_nan());
        assert_eq!(apply_binary(BinaryOperator::Power, 2.0, 10.0), 1024.0);
    }
}
