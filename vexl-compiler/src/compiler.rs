use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use log::debug;

use crate::ast::{CallSiteId, Script, SourceSpan};
use crate::diagnostics::Diagnostics;
use crate::env::{EnvError, VarEnvBuilder, VariableLayout};
use crate::extension::{global_registry, FunctionRegistry};
use crate::lexer::Lexer;
use crate::parser::Parser;
use crate::runtime::{CodeGenerator, Interpreter, Program, RegisterBudget};
use crate::source::SourceFile;
use crate::typechecker::{CallSiteState, TypeChecker};
use crate::types::ValueType;

#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub dump_tokens: bool,
    /// Hint forwarded to the result expression while checking.
    pub wants_scalar: bool,
    pub register_budget: RegisterBudget,
}

pub struct Compilation {
    pub script: Script,
    pub program: Program,
    pub result_type: ValueType,
    pub call_sites: BTreeMap<CallSiteId, CallSiteState>,
}

/// Turns expression source into an evaluable [`Program`].
///
/// Failures leave their details in [`Compiler::diagnostics`]; nothing from a
/// failed compilation is ever returned.
pub struct Compiler {
    diagnostics: Diagnostics,
    options: CompileOptions,
    registry: Arc<FunctionRegistry>,
    variables: VariableLayout,
}

impl Compiler {
    pub fn new(options: CompileOptions) -> Self {
        Self::with_registry(options, global_registry())
    }

    pub fn with_registry(options: CompileOptions, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            diagnostics: Diagnostics::new(),
            options,
            registry,
            variables: VariableLayout::new(),
        }
    }

    /// Makes `$name` available to compiled expressions.
    pub fn declare_variable<S: Into<String>>(
        &mut self,
        name: S,
        ty: ValueType,
    ) -> Result<usize, EnvError> {
        self.variables.declare(name, ty)
    }

    pub fn set_variables(&mut self, variables: VariableLayout) {
        self.variables = variables;
    }

    pub fn variables(&self) -> &VariableLayout {
        &self.variables
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn compile(&mut self, source: &SourceFile) -> Result<Compilation> {
        self.diagnostics.clear();

        let mut lexer = Lexer::new(source);
        let tokens = match lexer.tokenize() {
            Ok(tokens) => tokens,
            Err(err) => {
                let (line, column) = (err.line(), err.column());
                self.diagnostics.push_error_with_span(
                    err.to_string(),
                    Some(SourceSpan::single_point(line, column)),
                );
                bail!("Lexing failed");
            }
        };

        if self.options.dump_tokens {
            for token in &tokens {
                println!("{token:?}");
            }
        }

        let mut parser = Parser::new(source, tokens);
        let parsed = parser.parse();
        self.diagnostics.extend(parser.into_diagnostics());
        let script = parsed?;

        let registry = Arc::clone(&self.registry);
        let mut checker = TypeChecker::new(&registry);
        let mut env = VarEnvBuilder::from_layout(&self.variables);
        let result_type = checker.check_script(&script, self.options.wants_scalar, &mut env);
        let check_diagnostics = checker.take_diagnostics();
        let check_errors = check_diagnostics.has_errors();
        self.diagnostics.extend(check_diagnostics);
        if check_errors || !result_type.is_valid() {
            bail!("Type checking failed");
        }
        debug!("checked {}: result {result_type}", source.display_name());

        let mut interpreter = Interpreter::new(self.options.register_budget);
        let mut generator = CodeGenerator::new(&registry, &self.variables, checker);
        let result = match generator.compile_script(&script, &mut interpreter) {
            Ok(result) => result,
            Err(err) => {
                debug!("discarding partially emitted program: {err}");
                self.diagnostics
                    .push_error_with_span(err.to_string(), Some(script.result.span));
                bail!("Code generation failed");
            }
        };
        let call_sites = generator
            .into_call_sites()
            .into_iter()
            .map(|(id, info)| (id, info.state))
            .collect();

        let program = interpreter.finish(result, self.variables.clone());
        debug!(
            "compiled {}: {} instructions, {} numeric and {} string registers, thread-safe: {}",
            source.display_name(),
            program.instructions().len(),
            program.numeric_register_count(),
            program.string_register_count(),
            program.is_thread_safe()
        );

        Ok(Compilation {
            script,
            program,
            result_type,
            call_sites,
        })
    }
}
