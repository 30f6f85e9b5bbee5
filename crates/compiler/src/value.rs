//! Constant values
//!
//! A `Value` is both the payload of a literal node and the unit held on the
//! runtime stack during immediate execution.

use crate::types::ValueType;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i32),
    Float(f32),
    Str(String),
}

impl Value {
    /// The concrete type of this value (never `Any` or `Null`)
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int(_) => ValueType::Int32,
            Value::Float(_) => ValueType::Float,
            Value::Str(_) => ValueType::String,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{}", s),
        }
    }
}
