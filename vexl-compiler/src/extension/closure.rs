use std::fmt;

use super::SimpleFunction;
use crate::env::VarEnvBuilder;
use crate::runtime::ArgHandle;
use crate::typechecker::CallCheck;
use crate::types::ValueType;

/// Adapts a plain evaluation callable into a [`SimpleFunction`].
///
/// Always thread-safe and never folds. Checking belongs to whatever
/// registered the closure; see [`super::Extension::Closure`].
pub struct ClosureFunction<F> {
    function: F,
}

impl<F> ClosureFunction<F>
where
    F: Fn(&mut ArgHandle<'_>) + Send + Sync,
{
    pub fn new(function: F) -> Self {
        Self { function }
    }
}

impl<F> SimpleFunction for ClosureFunction<F>
where
    F: Fn(&mut ArgHandle<'_>) + Send + Sync,
{
    fn check_types(
        &self,
        call: &mut CallCheck<'_, '_>,
        _wants_scalar: bool,
        _env: &mut VarEnvBuilder,
    ) -> ValueType {
        panic!(
            "closure function '{}' has no type checker of its own; register it with a declaration",
            call.name()
        )
    }

    fn eval(&self, args: &mut ArgHandle<'_>) {
        (self.function)(args)
    }
}

impl<F> fmt::Debug for ClosureFunction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureFunction").finish_non_exhaustive()
    }
}
