//! Compile error types.
//!
//! Every failure in the front end is fatal to the definition being parsed.
//! Nothing is retried; the dictionary keeps all definitions that completed
//! before the error, so an interactive session can carry on.

use crate::types::ValueType;
use std::fmt;

/// Error type for the whole compilation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    /// Token is neither a dictionary word nor a valid literal
    UnknownToken { name: String },

    /// A pop found a value whose type the consuming word does not accept
    TypeError {
        word: String,
        /// Index of the offending token in the definition body (or in the
        /// top-level stream for immediate execution)
        position: usize,
        expected: ValueType,
        actual: ValueType,
    },

    /// Input count does not match a callee, or an extern signature is malformed
    ArityError { word: String, reason: String },

    /// Named failure for a path that is not supported
    UnsupportedOperation { operation: String },

    /// Output or input index outside a node's declared arity
    IndexError { index: usize, arity: usize },

    /// Input type requested from a node that takes no inputs
    InvalidInput { node: String },

    /// Immediate execution needed more values than the runtime stack holds
    StackUnderflow {
        word: String,
        required: usize,
        available: usize,
    },

    /// Token stream ended inside a colon definition
    UnterminatedDefinition { name: String },

    /// Token stream ended inside a string literal
    UnterminatedString { line: usize },

    /// Failure while executing code immediately
    Runtime { message: String },

    /// Configuration could not be loaded
    Config(String),

    /// Source or output file could not be read or written
    Io { path: String, message: String },

    /// Formatting error while emitting backend text
    Format(fmt::Error),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::UnknownToken { name } => write!(f, "unknown token `{}'", name),
            CompileError::TypeError {
                word,
                position,
                expected,
                actual,
            } => write!(
                f,
                "{}: type mismatch at position {}: expected {}, got {}",
                word, position, expected, actual
            ),
            CompileError::ArityError { word, reason } => write!(f, "{}: {}", word, reason),
            CompileError::UnsupportedOperation { operation } => {
                write!(f, "unsupported operation: {}", operation)
            }
            CompileError::IndexError { index, arity } => {
                write!(f, "index {} out of range for arity {}", index, arity)
            }
            CompileError::InvalidInput { node } => write!(f, "{} takes no inputs", node),
            CompileError::StackUnderflow {
                word,
                required,
                available,
            } => write!(
                f,
                "{}: stack underflow: requires {} value(s), {} available",
                word, required, available
            ),
            CompileError::UnterminatedDefinition { name } => {
                write!(f, "unterminated definition of `{}'", name)
            }
            CompileError::UnterminatedString { line } => {
                write!(f, "unterminated string literal starting on line {}", line)
            }
            CompileError::Runtime { message } => write!(f, "runtime error: {}", message),
            CompileError::Config(message) => write!(f, "configuration error: {}", message),
            CompileError::Io { path, message } => write!(f, "{}: {}", path, message),
            CompileError::Format(e) => write!(f, "IR generation error: {}", e),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<fmt::Error> for CompileError {
    fn from(e: fmt::Error) -> Self {
        CompileError::Format(e)
    }
}

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;
