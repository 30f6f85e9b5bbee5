//! Built-in words for llforth
//!
//! The language fixes two kinds of built-ins:
//!
//! - **Primitives** splice a node into the definition being compiled
//!   (stack shufflers, arithmetic, casts). At the top level they operate
//!   directly on the runtime stack.
//! - **Directives** only make sense at the top level (`.`, `.s`, `inline`,
//!   `see`, `words`). Using one inside a definition is an error.
//!
//! Operand lists are always bottom-to-top: the last element was on top of
//! the stack.

use crate::error::{CompileError, CompileResult};
use crate::types::ValueType;
use crate::value::Value;

/// Arithmetic operators. The operand type is carried by `Primitive::Binary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "mod",
        }
    }

    /// Evaluate on constant operands. Integer arithmetic wraps.
    pub fn apply(self, lhs: &Value, rhs: &Value) -> CompileResult<Value> {
        match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => {
                let (a, b) = (*a, *b);
                let result = match self {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div | BinaryOp::Mod if b == 0 => {
                        return Err(CompileError::Runtime {
                            message: format!("{}: division by zero", self.symbol()),
                        });
                    }
                    BinaryOp::Div => a.wrapping_div(b),
                    BinaryOp::Mod => a.wrapping_rem(b),
                };
                Ok(Value::Int(result))
            }
            (Value::Float(a), Value::Float(b)) => {
                let result = match self {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    BinaryOp::Mul => a * b,
                    BinaryOp::Div => a / b,
                    BinaryOp::Mod => a % b,
                };
                Ok(Value::Float(result))
            }
            _ => Err(CompileError::Runtime {
                message: format!(
                    "{}: cannot combine {} and {}",
                    self.symbol(),
                    lhs.value_type(),
                    rhs.value_type()
                ),
            }),
        }
    }
}

/// Explicit conversions, the only way to change a value's type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cast {
    IntToString,
    IntToFloat,
    FloatToInt,
}

impl Cast {
    pub fn name(self) -> &'static str {
        match self {
            Cast::IntToString => "i>s",
            Cast::IntToFloat => "i>f",
            Cast::FloatToInt => "f>i",
        }
    }

    pub fn source(self) -> ValueType {
        match self {
            Cast::IntToString | Cast::IntToFloat => ValueType::Int32,
            Cast::FloatToInt => ValueType::Float,
        }
    }

    pub fn target(self) -> ValueType {
        match self {
            Cast::IntToString => ValueType::String,
            Cast::IntToFloat => ValueType::Float,
            Cast::FloatToInt => ValueType::Int32,
        }
    }

    pub fn apply(self, value: &Value) -> CompileResult<Value> {
        match (self, value) {
            (Cast::IntToString, Value::Int(n)) => Ok(Value::Str(n.to_string())),
            (Cast::IntToFloat, Value::Int(n)) => Ok(Value::Float(*n as f32)),
            (Cast::FloatToInt, Value::Float(x)) => Ok(Value::Int(*x as i32)),
            _ => Err(CompileError::Runtime {
                message: format!("{}: cannot convert {}", self.name(), value.value_type()),
            }),
        }
    }
}

/// Operations that become expression nodes when used inside a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Dup,
    Swap,
    Over,
    Rot,
    Drop,
    Binary(BinaryOp, ValueType),
    Cast(Cast),
}

impl Primitive {
    /// Source-level name, used in traces
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Dup => "dup",
            Primitive::Swap => "swap",
            Primitive::Over => "over",
            Primitive::Rot => "rot",
            Primitive::Drop => "drop",
            Primitive::Binary(op, ValueType::Float) => match op {
                BinaryOp::Add => "+.",
                BinaryOp::Sub => "-.",
                BinaryOp::Mul => "*.",
                BinaryOp::Div => "/.",
                BinaryOp::Mod => "mod.",
            },
            Primitive::Binary(op, _) => op.symbol(),
            Primitive::Cast(cast) => cast.name(),
        }
    }

    pub fn input_arity(self) -> usize {
        match self {
            Primitive::Dup | Primitive::Drop | Primitive::Cast(_) => 1,
            Primitive::Swap | Primitive::Over | Primitive::Binary(..) => 2,
            Primitive::Rot => 3,
        }
    }

    /// Required type of operand `index` (bottom-to-top)
    pub fn input_type(self, index: usize) -> CompileResult<ValueType> {
        let arity = self.input_arity();
        if index >= arity {
            return Err(CompileError::IndexError { index, arity });
        }
        Ok(match self {
            Primitive::Binary(_, ty) => ty,
            Primitive::Cast(cast) => cast.source(),
            _ => ValueType::Any,
        })
    }

    /// For stack shufflers: which operand each output aliases.
    ///
    /// `Over` on `a b` yields `a b a`, so its map is `[0, 1, 0]`.
    pub fn shuffle(self) -> Option<&'static [usize]> {
        match self {
            Primitive::Dup => Some(&[0, 0]),
            Primitive::Swap => Some(&[1, 0]),
            Primitive::Over => Some(&[0, 1, 0]),
            Primitive::Rot => Some(&[1, 2, 0]),
            Primitive::Drop => Some(&[]),
            Primitive::Binary(..) | Primitive::Cast(_) => None,
        }
    }

    pub fn output_arity(self) -> usize {
        match self.shuffle() {
            Some(map) => map.len(),
            None => 1,
        }
    }

    /// Type of output `index` when it does not depend on the operands.
    ///
    /// `None` for shufflers, whose outputs take the type of the operand
    /// they alias.
    pub fn fixed_output_type(self, index: usize) -> Option<ValueType> {
        match self {
            Primitive::Binary(_, ty) if index == 0 => Some(ty),
            Primitive::Cast(cast) if index == 0 => Some(cast.target()),
            _ => None,
        }
    }

    /// Evaluate on constant operands (bottom-to-top), producing outputs in order
    pub fn eval(self, operands: &[Value]) -> CompileResult<Vec<Value>> {
        if operands.len() != self.input_arity() {
            return Err(CompileError::ArityError {
                word: self.name().to_string(),
                reason: format!(
                    "expected {} operand(s), got {}",
                    self.input_arity(),
                    operands.len()
                ),
            });
        }
        match self {
            Primitive::Binary(op, _) => Ok(vec![op.apply(&operands[0], &operands[1])?]),
            Primitive::Cast(cast) => Ok(vec![cast.apply(&operands[0])?]),
            _ => Ok(self
                .shuffle()
                .unwrap_or(&[])
                .iter()
                .map(|&i| operands[i].clone())
                .collect()),
        }
    }
}

/// Words that act on the session rather than on the stack being compiled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Directive {
    /// `.` pops and prints the top of the runtime stack
    Print,
    /// `.s` prints the runtime stack bottom-to-top
    PrintStack,
    /// `inline` marks the most recent definition inline
    Inline,
    /// `see name` prints a definition without compiling it
    See,
    /// `words` lists the visible dictionary, newest first
    Words,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Primitive(Primitive),
    Directive(Directive),
}

/// Every built-in word, in the order it is entered into a fresh dictionary
pub const BUILTIN_WORDS: &[(&str, Builtin)] = &[
    ("dup", Builtin::Primitive(Primitive::Dup)),
    ("swap", Builtin::Primitive(Primitive::Swap)),
    ("over", Builtin::Primitive(Primitive::Over)),
    ("rot", Builtin::Primitive(Primitive::Rot)),
    ("drop", Builtin::Primitive(Primitive::Drop)),
    ("+", int_op(BinaryOp::Add)),
    ("-", int_op(BinaryOp::Sub)),
    ("*", int_op(BinaryOp::Mul)),
    ("/", int_op(BinaryOp::Div)),
    ("mod", int_op(BinaryOp::Mod)),
    ("+.", float_op(BinaryOp::Add)),
    ("-.", float_op(BinaryOp::Sub)),
    ("*.", float_op(BinaryOp::Mul)),
    ("/.", float_op(BinaryOp::Div)),
    ("mod.", float_op(BinaryOp::Mod)),
    ("i>s", Builtin::Primitive(Primitive::Cast(Cast::IntToString))),
    ("i>f", Builtin::Primitive(Primitive::Cast(Cast::IntToFloat))),
    ("f>i", Builtin::Primitive(Primitive::Cast(Cast::FloatToInt))),
    (".", Builtin::Directive(Directive::Print)),
    (".s", Builtin::Directive(Directive::PrintStack)),
    ("inline", Builtin::Directive(Directive::Inline)),
    ("see", Builtin::Directive(Directive::See)),
    ("words", Builtin::Directive(Directive::Words)),
];

const fn int_op(op: BinaryOp) -> Builtin {
    Builtin::Primitive(Primitive::Binary(op, ValueType::Int32))
}

const fn float_op(op: BinaryOp) -> Builtin {
    Builtin::Primitive(Primitive::Binary(op, ValueType::Float))
}
