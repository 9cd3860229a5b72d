use std::collections::HashMap;

use thiserror::Error;
use vexl_support::variable_error;

use crate::types::ValueType;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EnvError {
    #[error("{}", variable_error(.0, "declared more than once"))]
    Duplicate(String),
    #[error("{}", variable_error(.0, "is not declared"))]
    Unknown(String),
    #[error("{}", variable_error(.name, format!("cannot hold a value of type {}", .ty)))]
    InvalidType { name: String, ty: ValueType },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VariableSlot {
    pub name: String,
    pub ty: ValueType,
}

/// Host variables an embedder makes available to expressions as `$name`.
///
/// Slots are numbered in declaration order; compiled programs refer to
/// variables by slot, never by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableLayout {
    slots: Vec<VariableSlot>,
    by_name: HashMap<String, usize>,
}

impl VariableLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare<S: Into<String>>(&mut self, name: S, ty: ValueType) -> Result<usize, EnvError> {
        let name = name.into();
        if !ty.is_valid() {
            return Err(EnvError::InvalidType { name, ty });
        }
        if self.by_name.contains_key(&name) {
            return Err(EnvError::Duplicate(name));
        }
        let slot = self.slots.len();
        self.by_name.insert(name.clone(), slot);
        self.slots.push(VariableSlot { name, ty });
        Ok(slot)
    }

    pub fn slot(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, slot: usize) -> Option<&VariableSlot> {
        self.slots.get(slot)
    }

    pub fn slots(&self) -> &[VariableSlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Accumulates variable types while a script is checked.
///
/// Locals are declared by assignments as they are checked; host variables are
/// seeded from a [`VariableLayout`] and are read-only.
#[derive(Debug, Clone, Default)]
pub struct VarEnvBuilder {
    locals: HashMap<String, ValueType>,
    host: HashMap<String, ValueType>,
}

impl VarEnvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_layout(layout: &VariableLayout) -> Self {
        let host = layout
            .slots()
            .iter()
            .map(|slot| (slot.name.clone(), slot.ty))
            .collect();
        Self {
            locals: HashMap::new(),
            host,
        }
    }

    pub fn lookup(&self, name: &str) -> Option<ValueType> {
        self.locals.get(name).copied()
    }

    pub fn lookup_host(&self, name: &str) -> Option<ValueType> {
        self.host.get(name).copied()
    }

    /// Declares (or redeclares) a local. Returns the previous type, if any.
    pub fn declare<S: Into<String>>(&mut self, name: S, ty: ValueType) -> Option<ValueType> {
        self.locals.insert(name.into(), ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_assigns_slots_in_declaration_order() {
        let mut layout = VariableLayout::new();
        assert_eq!(layout.declare("P", ValueType::vector(3)), Ok(0));
        assert_eq!(layout.declare("name", ValueType::string()), Ok(1));
        assert_eq!(layout.slot("name"), Some(1));
        assert_eq!(
            layout.declare("P", ValueType::scalar()),
            Err(EnvError::Duplicate("P".to_string()))
        );
    }

    #[test]
    fn layout_rejects_error_types() {
        let mut layout = VariableLayout::new();
        assert!(matches!(
            layout.declare("bad", ValueType::error()),
            Err(EnvError::InvalidType { .. })
        ));
    }

    #[test]
    fn builder_keeps_locals_and_host_variables_apart() {
        let mut layout = VariableLayout::new();
        layout.declare("u", ValueType::scalar()).expect("declare");
        let mut env = VarEnvBuilder::from_layout(&layout);
        assert_eq!(env.lookup("u"), None);
        assert_eq!(env.lookup_host("u"), Some(ValueType::scalar()));
        assert_eq!(env.declare("u", ValueType::vector(2)), None);
        assert_eq!(env.lookup("u"), Some(ValueType::vector(2)));
    }
}
