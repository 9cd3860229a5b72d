mod ast;
mod builtins;
mod compiler;
mod diagnostics;
mod env;
mod lexer;
mod parser;
mod source;
mod typechecker;
mod types;

pub mod extension;
pub mod runtime;

pub use crate::ast::{
    Assignment, BinaryExpression, BinaryOperator, CallExpression, CallSiteId, Expression,
    ExpressionKind, Script, SourceSpan, UnaryExpression, UnaryOperator,
};
pub use crate::compiler::{Compilation, CompileOptions, Compiler};
pub use crate::diagnostics::{Diagnostic, DiagnosticLevel, Diagnostics};
pub use crate::env::{EnvError, VarEnvBuilder, VariableLayout, VariableSlot};
pub use crate::extension::{
    global_registry, init_global_registry, Arity, ConstantData, Extension, FoldedValue,
    FunctionDeclaration, FunctionExtension, FunctionRegistry, RegistryError, SimpleFunction,
    Statistics,
};
pub use crate::lexer::{Lexer, LexerError, Token, TokenKind};
pub use crate::parser::Parser;
pub use crate::runtime::{ArgHandle, Program, Value, VariableBlock};
pub use crate::source::{SourceFile, SourceId};
pub use crate::typechecker::{CallCheck, CallSiteState, CheckedType, TypeChecker};
pub use crate::types::ValueType;
