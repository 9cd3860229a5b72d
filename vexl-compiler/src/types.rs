use std::fmt;

/// Shape of an expression value as seen by the checking pass.
///
/// Numeric values carry their width; a scalar is a numeric value of width 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ValueType {
    #[default]
    None,
    Error,
    Numeric(usize),
    String,
}

impl ValueType {
    pub fn none() -> Self {
        ValueType::None
    }

    pub fn error() -> Self {
        ValueType::Error
    }

    pub fn scalar() -> Self {
        ValueType::Numeric(1)
    }

    pub fn vector(width: usize) -> Self {
        assert!(width > 0, "numeric values need a width of at least one");
        ValueType::Numeric(width)
    }

    pub fn string() -> Self {
        ValueType::String
    }

    pub fn is_error(self) -> bool {
        matches!(self, ValueType::Error)
    }

    pub fn is_none(self) -> bool {
        matches!(self, ValueType::None)
    }

    /// Neither error nor unset.
    pub fn is_valid(self) -> bool {
        matches!(self, ValueType::Numeric(_) | ValueType::String)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ValueType::Numeric(_))
    }

    pub fn is_scalar(self) -> bool {
        matches!(self, ValueType::Numeric(1))
    }

    pub fn is_string(self) -> bool {
        matches!(self, ValueType::String)
    }

    /// Number of numeric slots a value of this type occupies.
    pub fn width(self) -> usize {
        match self {
            ValueType::Numeric(width) => width,
            _ => 0,
        }
    }

    /// Result shape of an element-wise numeric operation.
    ///
    /// Errors absorb everything; a scalar broadcasts over a vector; vectors of
    /// different widths and anything involving strings or unset values yield
    /// an error.
    pub fn combine(self, other: ValueType) -> ValueType {
        match (self, other) {
            (ValueType::Error, _) | (_, ValueType::Error) => ValueType::Error,
            (ValueType::Numeric(a), ValueType::Numeric(b)) if a == b => ValueType::Numeric(a),
            (ValueType::Numeric(1), ValueType::Numeric(b)) => ValueType::Numeric(b),
            (ValueType::Numeric(a), ValueType::Numeric(1)) => ValueType::Numeric(a),
            _ => ValueType::Error,
        }
    }

    /// Whether a value of type `actual` may be passed where `self` is expected.
    /// Scalars are accepted for any numeric width and promoted during emission.
    pub fn accepts(self, actual: ValueType) -> bool {
        match (self, actual) {
            (ValueType::Numeric(expected), ValueType::Numeric(found)) => {
                expected == found || found == 1
            }
            (ValueType::String, ValueType::String) => true,
            _ => false,
        }
    }

    pub fn describe(self) -> String {
        match self {
            ValueType::None => "None".to_string(),
            ValueType::Error => "Error".to_string(),
            ValueType::Numeric(1) => "Float".to_string(),
            ValueType::Numeric(width) => format!("Float[{width}]"),
            ValueType::String => "String".to_string(),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_value_type() -> impl Strategy<Value = ValueType> {
        prop_oneof![
            Just(ValueType::None),
            Just(ValueType::Error),
            Just(ValueType::String),
            (1usize..6).prop_map(ValueType::Numeric),
        ]
    }

    proptest! {
        #[test]
        fn error_absorbs_every_combination(ty in any_value_type()) {
            prop_assert!(ValueType::error().combine(ty).is_error());
            prop_assert!(ty.combine(ValueType::error()).is_error());
        }

        #[test]
        fn combine_is_commutative(a in any_value_type(), b in any_value_type()) {
            prop_assert_eq!(a.combine(b), b.combine(a));
        }

        #[test]
        fn scalar_broadcasts_over_any_width(width in 1usize..16) {
            prop_assert_eq!(
                ValueType::scalar().combine(ValueType::vector(width)),
                ValueType::vector(width)
            );
        }

        #[test]
        fn accepted_numeric_arguments_combine_to_the_expected_width(
            width in 1usize..8,
            found in 1usize..8,
        ) {
            let expected = ValueType::vector(width);
            let actual = ValueType::vector(found);
            if expected.accepts(actual) {
                prop_assert_eq!(expected.combine(actual), expected);
            }
        }
    }

    #[test]
    fn strings_do_not_mix_with_numbers() {
        assert!(ValueType::string()
            .combine(ValueType::scalar())
            .is_error());
        assert!(!ValueType::scalar().accepts(ValueType::string()));
        assert!(ValueType::string().accepts(ValueType::string()));
    }

    #[test]
    fn mismatched_vector_widths_are_rejected() {
        assert!(ValueType::vector(2)
            .combine(ValueType::vector(3))
            .is_error());
        assert!(!ValueType::vector(3).accepts(ValueType::vector(2)));
    }

    #[test]
    fn descriptors_compare_structurally() {
        assert_eq!(ValueType::vector(3), ValueType::Numeric(3));
        assert_eq!(ValueType::scalar(), ValueType::vector(1));
        assert_ne!(ValueType::scalar(), ValueType::string());
    }
}
