use std::fmt;

use crate::types::ValueType;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Arity {
    Exact(usize),
    Range { min: usize, max: Option<usize> },
}

impl Arity {
    pub fn allows(self, count: usize) -> bool {
        match self {
            Arity::Exact(expected) => expected == count,
            Arity::Range { min, max } => {
                if count < min {
                    return false;
                }
                if let Some(limit) = max {
                    if count > limit {
                        return false;
                    }
                }
                true
            }
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = |count: usize| if count == 1 { "argument" } else { "arguments" };
        match *self {
            Arity::Exact(count) => write!(f, "{count} {}", noun(count)),
            Arity::Range { min, max: None } => write!(f, "at least {min} {}", noun(min)),
            Arity::Range {
                min,
                max: Some(max),
            } => write!(f, "{min} to {max} arguments"),
        }
    }
}

/// Static signature of a function: argument types, optional variadic tail
/// and result type.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    params: Vec<ValueType>,
    variadic: Option<ValueType>,
    arity: Arity,
    result: ValueType,
}

impl FunctionDeclaration {
    /// Fixed arity: exactly one argument per entry in `params`.
    pub fn new(params: Vec<ValueType>, result: ValueType) -> Self {
        let arity = Arity::Exact(params.len());
        Self {
            params,
            variadic: None,
            arity,
            result,
        }
    }

    /// Leading `params`, then any number of `tail` arguments, with the total
    /// count bounded by `min` and `max`.
    pub fn variadic(
        params: Vec<ValueType>,
        tail: ValueType,
        min: usize,
        max: Option<usize>,
        result: ValueType,
    ) -> Self {
        assert!(
            min >= params.len(),
            "variadic declaration allows fewer arguments than its {} leading parameters",
            params.len()
        );
        assert!(
            max.map_or(true, |max| max >= min),
            "variadic declaration has max below min"
        );
        Self {
            params,
            variadic: Some(tail),
            arity: Arity::Range { min, max },
            result,
        }
    }

    pub fn arity(&self) -> Arity {
        self.arity
    }

    /// Expected type of argument `index`, falling back to the variadic tail.
    pub fn param(&self, index: usize) -> Option<ValueType> {
        self.params.get(index).copied().or(self.variadic)
    }

    pub fn result(&self) -> ValueType {
        self.result
    }
}

impl fmt::Display for FunctionDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (index, param) in self.params.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        if let Some(tail) = self.variadic {
            if !self.params.is_empty() {
                write!(f, ", ")?;
            }
            write!(f, "{tail}...")?;
        }
        write!(f, ") -> {}", self.result)
    }
}
