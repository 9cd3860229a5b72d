//! The contract every function callable from an expression implements.
//!
//! A function takes part in three phases. During checking it validates its
//! argument sub-expressions and reports a result type. During emission it
//! allocates registers and appends instructions. At evaluation time the
//! generic call instruction hands simple functions an [`ArgHandle`] over the
//! live register files.
//!
//! [`ArgHandle`]: crate::runtime::ArgHandle

mod closure;
mod declaration;
mod registry;
mod simple;

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::env::VarEnvBuilder;
use crate::runtime::{CallEmit, EmitError, Interpreter, Register};
use crate::typechecker::CallCheck;
use crate::types::ValueType;

pub use closure::ClosureFunction;
pub use declaration::{Arity, FunctionDeclaration};
pub use registry::{global_registry, init_global_registry, FunctionRegistry, RegistryError};
pub use simple::{build_simple_call, fold_by_eval, generic_prep, SimpleFunction};

/// Named counters reported by extensions for diagnostics.
pub type Statistics = BTreeMap<String, f64>;

/// Type-erased payload attached to one call site. Only the extension that
/// produced it knows its concrete type.
pub type ConstantData = Arc<dyn Any + Send + Sync>;

/// A precomputed call result. When a call site's payload downcasts to this,
/// the call instruction copies it into the output register instead of
/// invoking the function.
#[derive(Debug, Clone, PartialEq)]
pub enum FoldedValue {
    Numeric(Vec<f64>),
    Text(Arc<str>),
}

pub trait FunctionExtension: Send + Sync {
    /// Validates the call's arguments and returns the call's result type, or
    /// [`ValueType::Error`] after reporting through `call`. Never aborts the
    /// surrounding check.
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType;

    /// Emits the instructions that compute this call and returns the register
    /// holding its result. Runs exactly once per checked call site.
    fn build_interpreter(
        &self,
        call: &mut CallEmit<'_, '_>,
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError>;

    fn is_thread_safe(&self) -> bool;

    fn size_in_bytes(&self) -> usize {
        0
    }

    fn statistics(&self, _statistics: &mut Statistics) {}
}

/// A registered function, tagged by how it plugs into the pipeline.
#[derive(Clone)]
pub enum Extension {
    /// Declares its own types and evaluates through an [`ArgHandle`].
    ///
    /// [`ArgHandle`]: crate::runtime::ArgHandle
    Simple(Arc<dyn SimpleFunction>),
    /// A bare evaluation callable; checking is driven by the declaration it
    /// was registered with.
    Closure {
        declaration: Arc<FunctionDeclaration>,
        function: Arc<dyn SimpleFunction>,
    },
    /// Owns both checking and emission.
    Custom(Arc<dyn FunctionExtension>),
}

impl Extension {
    pub fn simple<F: SimpleFunction + 'static>(function: F) -> Self {
        Extension::Simple(Arc::new(function))
    }

    pub fn closure<F>(declaration: FunctionDeclaration, function: F) -> Self
    where
        F: Fn(&mut crate::runtime::ArgHandle<'_>) + Send + Sync + 'static,
    {
        Extension::Closure {
            declaration: Arc::new(declaration),
            function: Arc::new(ClosureFunction::new(function)),
        }
    }

    pub fn custom<F: FunctionExtension + 'static>(function: F) -> Self {
        Extension::Custom(Arc::new(function))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Extension::Simple(_) => "simple",
            Extension::Closure { .. } => "closure",
            Extension::Custom(_) => "custom",
        }
    }
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Extension::Closure { declaration, .. } => f
                .debug_struct("Closure")
                .field("declaration", &declaration.to_string())
                .finish(),
            other => f.debug_tuple(other.kind()).finish(),
        }
    }
}

impl FunctionExtension for Extension {
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        wants_scalar: bool,
        env: &mut VarEnvBuilder,
    ) -> ValueType {
        match self {
            Extension::Simple(function) => function.check_types(call, wants_scalar, env),
            Extension::Closure { declaration, .. } => {
                generic_prep(call, wants_scalar, env, declaration)
            }
            Extension::Custom(extension) => extension.check_types(call, wants_scalar, env),
        }
    }

    fn build_interpreter(
        &self,
        call: &mut CallEmit<'_, '_>,
        interpreter: &mut Interpreter,
    ) -> Result<Register, EmitError> {
        match self {
            Extension::Simple(function) | Extension::Closure { function, .. } => {
                build_simple_call(function, call, interpreter)
            }
            Extension::Custom(extension) => extension.build_interpreter(call, interpreter),
        }
    }

    fn is_thread_safe(&self) -> bool {
        match self {
            Extension::Simple(function) => function.is_thread_safe(),
            Extension::Closure { .. } => true,
            Extension::Custom(extension) => extension.is_thread_safe(),
        }
    }

    fn size_in_bytes(&self) -> usize {
        match self {
            Extension::Simple(function) | Extension::Closure { function, .. } => {
                function.size_in_bytes()
            }
            Extension::Custom(extension) => extension.size_in_bytes(),
        }
    }

    fn statistics(&self, statistics: &mut Statistics) {
        match self {
            Extension::Simple(function) | Extension::Closure { function, .. } => {
                function.statistics(statistics)
            }
            Extension::Custom(extension) => extension.statistics(statistics),
        }
    }
}
