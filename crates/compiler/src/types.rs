//! Type model for llforth
//!
//! The set of value types is closed. There is no implicit coercion between
//! them: an explicit cast word is the only way to turn one type into another.
//!
//! `Any` is a wildcard that only appears in the signatures of the polymorphic
//! stack shufflers (`dup`, `swap`, `over`, `rot`, `drop`). It is never the type
//! of a literal or of a call result produced by a concrete word.

use crate::error::{CompileError, CompileResult};
use std::fmt;

/// Type tag carried by every value produced in an expression graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// "Has no output". Never a poppable type.
    Null,
    /// 32-bit signed integer
    Int32,
    /// 32-bit IEEE 754 float
    Float,
    /// Immutable string
    String,
    /// Wildcard accepted by polymorphic built-ins
    Any,
}

impl ValueType {
    /// Check a popped value against the type an operation requires.
    ///
    /// True iff the types are equal or the requirement is the `Any` wildcard.
    pub fn compatible(required: ValueType, actual: ValueType) -> bool {
        required == actual || required == ValueType::Any
    }

    /// Parse a single-letter type code as used in `extern` signatures
    ///
    /// `i` = Int32, `f` = Float, `s` = String, `?` = Any
    pub fn from_code(code: &str) -> Option<ValueType> {
        match code {
            "i" => Some(ValueType::Int32),
            "f" => Some(ValueType::Float),
            "s" => Some(ValueType::String),
            "?" => Some(ValueType::Any),
            _ => None,
        }
    }

    /// The single-letter code used when printing signatures
    pub fn code(self) -> &'static str {
        match self {
            ValueType::Null => "*",
            ValueType::Int32 => "i",
            ValueType::Float => "f",
            ValueType::String => "s",
            ValueType::Any => "?",
        }
    }

    /// True for types a backend can represent directly
    pub fn is_concrete(self) -> bool {
        matches!(
            self,
            ValueType::Int32 | ValueType::Float | ValueType::String
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Null => write!(f, "Null"),
            ValueType::Int32 => write!(f, "Int32"),
            ValueType::Float => write!(f, "Float"),
            ValueType::String => write!(f, "String"),
            ValueType::Any => write!(f, "Any"),
        }
    }
}

/// Input and output types of a word, in argument order and output order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    /// `inputs[0]` is the value on top of the stack when the word is called
    pub inputs: Vec<ValueType>,
    /// Bottom-to-top order of the values left on the stack
    pub outputs: Vec<ValueType>,
}

impl Signature {
    pub fn new(inputs: Vec<ValueType>, outputs: Vec<ValueType>) -> Self {
        Signature { inputs, outputs }
    }

    /// Parse a pair of whitespace-separated type-code lists, e.g. `"i i"` and `"i"`
    pub fn from_codes(word: &str, inputs: &str, outputs: &str) -> CompileResult<Self> {
        Ok(Signature {
            inputs: parse_type_list(word, inputs.split_whitespace())?,
            outputs: parse_type_list(word, outputs.split_whitespace())?,
        })
    }

    pub fn input_arity(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_arity(&self) -> usize {
        self.outputs.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for ty in &self.inputs {
            write!(f, " {}", ty.code())?;
        }
        write!(f, " --")?;
        for ty in &self.outputs {
            write!(f, " {}", ty.code())?;
        }
        write!(f, " )")
    }
}

/// Convert type codes to types, rejecting anything that is not a value type
pub fn parse_type_list<'a>(
    word: &str,
    codes: impl IntoIterator<Item = &'a str>,
) -> CompileResult<Vec<ValueType>> {
    codes
        .into_iter()
        .map(|code| {
            ValueType::from_code(code).ok_or_else(|| CompileError::ArityError {
                word: word.to_string(),
                reason: format!("unknown type `{}' in signature", code),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatible_exact_and_wildcard() {
        assert!(ValueType::compatible(ValueType::Int32, ValueType::Int32));
        assert!(ValueType::compatible(ValueType::Any, ValueType::String));
        assert!(ValueType::compatible(ValueType::Any, ValueType::Float));
        assert!(!ValueType::compatible(ValueType::Int32, ValueType::Float));
        // The wildcard only works on the required side
        assert!(!ValueType::compatible(ValueType::Int32, ValueType::Any));
    }

    #[test]
    fn test_type_codes() {
        for ty in [
            ValueType::Int32,
            ValueType::Float,
            ValueType::String,
            ValueType::Any,
        ] {
            assert_eq!(ValueType::from_code(ty.code()), Some(ty));
        }
        assert_eq!(ValueType::from_code("x"), None);
        assert_eq!(ValueType::from_code("*"), None);
    }

    #[test]
    fn test_signature_display() {
        let sig = Signature::new(
            vec![ValueType::Int32, ValueType::String],
            vec![ValueType::Float],
        );
        assert_eq!(sig.to_string(), "( i s -- f )");
        assert_eq!(Signature::default().to_string(), "( -- )");
    }

    #[test]
    fn test_signature_from_codes() {
        let sig = Signature::from_codes("foo", "i i", "i").unwrap();
        assert_eq!(sig.input_arity(), 2);
        assert_eq!(sig.output_arity(), 1);

        let err = Signature::from_codes("foo", "i q", "").unwrap_err();
        assert!(matches!(err, CompileError::ArityError { .. }));
    }

    #[test]
    fn test_polymorphic_signature() {
        let sig = Signature::new(vec![ValueType::Any], vec![ValueType::Any; 2]);
        assert_eq!(sig.to_string(), "( ? -- ? ? )");
    }
}
