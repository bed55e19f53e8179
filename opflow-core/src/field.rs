//! Input and output field descriptors for node ports.

use crate::value::{Value, ValueKind};
use std::fmt;

/// Direction of a field on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldDirection {
    /// Input port.
    Input,
    /// Output port.
    Output,
}

impl fmt::Display for FieldDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Set of value kinds a port accepts or declares.
///
/// `Any` accepts everything; otherwise the spec is an explicit kind set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeSpec {
    /// Accepts any value.
    Any,
    /// Accepts exactly one kind.
    One(ValueKind),
    /// Accepts any of the listed kinds.
    AnyOf(Vec<ValueKind>),
}

impl TypeSpec {
    /// Whether a concrete kind is accepted.
    #[must_use]
    pub fn accepts_kind(&self, kind: ValueKind) -> bool {
        match self {
            Self::Any => true,
            Self::One(k) => *k == kind,
            Self::AnyOf(kinds) => kinds.contains(&kind),
        }
    }

    /// Whether a concrete value is accepted.
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        self.accepts_kind(value.kind())
    }

    /// Whether every kind `declared` may produce is accepted here.
    ///
    /// This is the link-time compatibility test: a link is valid when the
    /// destination validator accepts the full declared output spec.
    #[must_use]
    pub fn accepts_spec(&self, declared: &TypeSpec) -> bool {
        match (self, declared) {
            (Self::Any, _) => true,
            (_, Self::Any) => false,
            (_, Self::One(k)) => self.accepts_kind(*k),
            (_, Self::AnyOf(kinds)) => kinds.iter().all(|k| self.accepts_kind(*k)),
        }
    }
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::One(k) => write!(f, "{k}"),
            Self::AnyOf(kinds) => {
                let mut first = true;
                for k in kinds {
                    if !first {
                        write!(f, "|")?;
                    }
                    write!(f, "{k}")?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

impl From<ValueKind> for TypeSpec {
    fn from(kind: ValueKind) -> Self {
        Self::One(kind)
    }
}

/// An input port on a node.
#[derive(Debug, Clone)]
pub struct InputField {
    /// Field key, unique among the owning node's inputs.
    pub key: String,
    /// Human-readable description.
    pub description: String,
    /// Whether execution may proceed without a value on this field.
    pub optional: bool,
    /// Fixed fields cannot be overwritten or removed (built-in ports).
    pub fixed: bool,
    /// Validator applied to every value arriving on this field.
    pub validator: TypeSpec,
}

impl InputField {
    /// Create a required input accepting any value.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            optional: false,
            fixed: false,
            validator: TypeSpec::Any,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Restrict accepted values to the given spec.
    #[must_use]
    pub fn with_validator(mut self, validator: impl Into<TypeSpec>) -> Self {
        self.validator = validator.into();
        self
    }

    /// Mark the field as optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Mark the field as fixed.
    #[must_use]
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

/// An output port on a node.
#[derive(Debug, Clone)]
pub struct OutputField {
    /// Field key, unique among the owning node's outputs.
    pub key: String,
    /// Human-readable description.
    pub description: String,
    /// Fixed fields cannot be overwritten or removed.
    pub fixed: bool,
    /// Declared type of values this port produces, used by downstream
    /// link validation.
    pub output_type: TypeSpec,
}

impl OutputField {
    /// Create an output declaring any type.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            fixed: false,
            output_type: TypeSpec::Any,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// Declare the produced type.
    #[must_use]
    pub fn with_type(mut self, spec: impl Into<TypeSpec>) -> Self {
        self.output_type = spec.into();
        self
    }

    /// Mark the field as fixed.
    #[must_use]
    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_accepts_everything() {
        assert!(TypeSpec::Any.accepts(&Value::int(1)));
        assert!(TypeSpec::Any.accepts(&Value::null()));
        assert!(TypeSpec::Any.accepts_spec(&TypeSpec::One(ValueKind::String)));
        assert!(TypeSpec::Any.accepts_spec(&TypeSpec::Any));
    }

    #[test]
    fn one_kind_is_exact() {
        let numbers = TypeSpec::One(ValueKind::Number);
        assert!(numbers.accepts(&Value::int(3)));
        assert!(!numbers.accepts(&Value::string("3")));
        assert!(numbers.accepts_spec(&TypeSpec::One(ValueKind::Number)));
        assert!(!numbers.accepts_spec(&TypeSpec::One(ValueKind::String)));
        // A declared-any output may produce kinds the validator rejects.
        assert!(!numbers.accepts_spec(&TypeSpec::Any));
    }

    #[test]
    fn any_of_is_a_union() {
        let spec = TypeSpec::AnyOf(vec![ValueKind::Number, ValueKind::String]);
        assert!(spec.accepts(&Value::string("x")));
        assert!(spec.accepts(&Value::float(0.5)));
        assert!(!spec.accepts(&Value::bool(true)));
        assert!(spec.accepts_spec(&TypeSpec::One(ValueKind::String)));
        assert!(!spec.accepts_spec(&TypeSpec::AnyOf(vec![
            ValueKind::String,
            ValueKind::Bool
        ])));
    }

    #[test]
    fn field_builders() {
        let input = InputField::new("count")
            .with_description("How many items to emit")
            .with_validator(ValueKind::Number)
            .optional();
        assert_eq!(input.key, "count");
        assert!(input.optional);
        assert!(!input.fixed);
        assert_eq!(input.validator, TypeSpec::One(ValueKind::Number));

        let output = OutputField::new("items").with_type(ValueKind::Array).fixed();
        assert!(output.fixed);
        assert_eq!(output.output_type, TypeSpec::One(ValueKind::Array));
    }
}
