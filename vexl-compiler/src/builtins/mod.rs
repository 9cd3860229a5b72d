//! Functions every registry starts with.

mod control;
mod math;
mod string;

use crate::extension::FunctionRegistry;

pub(crate) fn register_builtins(registry: &mut FunctionRegistry) {
    math::register(registry);
    string::register(registry);
    control::register(registry);
}
