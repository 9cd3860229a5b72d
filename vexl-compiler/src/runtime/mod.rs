mod bytecode;
mod codegen;
mod handle;
mod interpreter;
mod value;
mod vm;

pub use bytecode::{CallOperands, FunctionEntry, Instruction, Program, Register};
pub use codegen::{CallEmit, CodeGenerator};
pub use handle::ArgHandle;
pub use interpreter::{EmitError, Interpreter, RegisterBudget, RegisterKind};
pub use value::{Value, VariableBlock};
pub use vm::{RegisterFile, Vm, VmError};
