use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::env::{EnvError, VariableLayout};
use crate::types::ValueType;

/// A fully evaluated expression result or host variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Vector(Vec<f64>),
    String(String),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Number(_) => ValueType::scalar(),
            Value::Vector(values) if values.is_empty() => ValueType::error(),
            Value::Vector(values) => ValueType::vector(values.len()),
            Value::String(_) => ValueType::string(),
        }
    }

    pub fn from_numeric(values: &[f64]) -> Self {
        match values {
            [single] => Value::Number(*single),
            _ => Value::Vector(values.to_vec()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(value) => Some(*value),
            Value::Vector(values) if values.len() == 1 => Some(values[0]),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(value) => write!(f, "{value}"),
            Value::Vector(values) => {
                write!(f, "[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::String(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VariableValue {
    Numeric(Vec<f64>),
    Text(Arc<str>),
}

/// Per-evaluation storage for host variables, laid out by a [`VariableLayout`].
///
/// Unset numeric variables read as zeros and unset strings as the empty string.
#[derive(Debug, Clone)]
pub struct VariableBlock {
    layout: VariableLayout,
    values: Vec<VariableValue>,
}

impl VariableBlock {
    pub fn new(layout: &VariableLayout) -> Self {
        let values = layout
            .slots()
            .iter()
            .map(|slot| match slot.ty {
                ValueType::String => VariableValue::Text(Arc::from("")),
                other => VariableValue::Numeric(vec![0.0; other.width()]),
            })
            .collect();
        Self {
            layout: layout.clone(),
            values,
        }
    }

    pub fn layout(&self) -> &VariableLayout {
        &self.layout
    }

    /// Stores `value` into the named variable. A scalar fills every lane of a
    /// vector variable.
    pub fn set(&mut self, name: &str, value: Value) -> Result<(), EnvError> {
        let slot = self
            .layout
            .slot(name)
            .ok_or_else(|| EnvError::Unknown(name.to_string()))?;
        let declared = self.layout.slots()[slot].ty;
        let actual = value.value_type();
        if !declared.accepts(actual) {
            return Err(EnvError::InvalidType {
                name: name.to_string(),
                ty: actual,
            });
        }
        self.values[slot] = match value {
            Value::String(text) => VariableValue::Text(Arc::from(text)),
            Value::Number(number) => VariableValue::Numeric(vec![number; declared.width()]),
            Value::Vector(values) if values.len() == 1 => {
                VariableValue::Numeric(vec![values[0]; declared.width()])
            }
            Value::Vector(values) => VariableValue::Numeric(values),
        };
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let slot = self.layout.slot(name)?;
        Some(match &self.values[slot] {
            VariableValue::Numeric(values) => Value::from_numeric(values),
            VariableValue::Text(text) => Value::String(text.to_string()),
        })
    }

    pub(crate) fn numeric(&self, slot: usize) -> &[f64] {
        match &self.values[slot] {
            VariableValue::Numeric(values) => values,
            VariableValue::Text(_) => {
                panic!("variable slot {slot} holds a string, not a numeric value")
            }
        }
    }

    pub(crate) fn text(&self, slot: usize) -> &Arc<str> {
        match &self.values[slot] {
            VariableValue::Text(text) => text,
            VariableValue::Numeric(_) => {
                panic!("variable slot {slot} holds a numeric value, not a string")
            }
        }
    }
}
