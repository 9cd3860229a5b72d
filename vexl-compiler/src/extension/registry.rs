use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use log::debug;
use thiserror::Error;

use super::{Extension, FunctionDeclaration, FunctionExtension, SimpleFunction};
use crate::builtins;
use crate::runtime::ArgHandle;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("function '{0}' is already registered")]
    Duplicate(String),
    #[error("the global function registry has already been initialized")]
    AlreadyInitialized,
}

/// Maps function names to the extensions that implement them.
///
/// Built once, then shared immutably by every compilation.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Extension>,
}

impl FunctionRegistry {
    /// An empty registry without the builtin functions.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        builtins::register_builtins(&mut registry);
        registry
    }

    pub fn register<S: Into<String>>(
        &mut self,
        name: S,
        extension: Extension,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.functions.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        debug!("registering {} function '{name}'", extension.kind());
        self.functions.insert(name, extension);
        Ok(())
    }

    pub fn register_simple<S, F>(&mut self, name: S, function: F) -> Result<(), RegistryError>
    where
        S: Into<String>,
        F: SimpleFunction + 'static,
    {
        self.register(name, Extension::simple(function))
    }

    pub fn register_closure<S, F>(
        &mut self,
        name: S,
        declaration: FunctionDeclaration,
        function: F,
    ) -> Result<(), RegistryError>
    where
        S: Into<String>,
        F: Fn(&mut ArgHandle<'_>) + Send + Sync + 'static,
    {
        self.register(name, Extension::closure(declaration, function))
    }

    pub fn register_custom<S, F>(&mut self, name: S, extension: F) -> Result<(), RegistryError>
    where
        S: Into<String>,
        F: FunctionExtension + 'static,
    {
        self.register(name, Extension::custom(extension))
    }

    /// Builtin tables use unique names, so insertion cannot collide.
    pub(crate) fn insert(&mut self, name: &str, extension: Extension) {
        self.functions.insert(name.to_string(), extension);
    }

    pub fn get(&self, name: &str) -> Option<&Extension> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

static GLOBAL_REGISTRY: OnceLock<Arc<FunctionRegistry>> = OnceLock::new();

/// Installs the process-wide registry: the builtins plus whatever `configure`
/// adds. Fails if the registry was already installed or read.
pub fn init_global_registry<F>(configure: F) -> Result<Arc<FunctionRegistry>, RegistryError>
where
    F: FnOnce(&mut FunctionRegistry) -> Result<(), RegistryError>,
{
    if GLOBAL_REGISTRY.get().is_some() {
        return Err(RegistryError::AlreadyInitialized);
    }
    let mut registry = FunctionRegistry::with_builtins();
    configure(&mut registry)?;
    let registry = Arc::new(registry);
    GLOBAL_REGISTRY
        .set(Arc::clone(&registry))
        .map_err(|_| RegistryError::AlreadyInitialized)?;
    debug!("global function registry initialized with {} functions", registry.len());
    Ok(registry)
}

/// The process-wide registry. Falls back to the builtins if nothing was
/// installed, after which [`init_global_registry`] fails.
pub fn global_registry() -> Arc<FunctionRegistry> {
    Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(FunctionRegistry::with_builtins())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueType;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = FunctionRegistry::new();
        let declaration = FunctionDeclaration::new(vec![ValueType::scalar()], ValueType::scalar());
        registry
            .register_closure("twice", declaration.clone(), |args| {
                let value = args.in_scalar(0) * 2.0;
                args.set_out_scalar(value);
            })
            .expect("first registration");
        let error = registry
            .register_closure("twice", declaration, |args| args.set_out_scalar(0.0))
            .expect_err("duplicate");
        assert_eq!(error, RegistryError::Duplicate("twice".to_string()));
    }

    #[test]
    fn builtin_names_are_sorted() {
        let registry = FunctionRegistry::with_builtins();
        let names = registry.names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(registry.contains("concat"));
        assert!(registry.contains("pick"));
    }
}
