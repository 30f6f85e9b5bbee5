//! Register bytecode backend with an interpreter
//!
//! Each compiled body is a straight-line list of [`Instruction`]s writing
//! to numbered registers. Shufflers never appear: by the time a body is
//! lowered they have been resolved to register aliases.
//!
//! Functions declared without a body are externs. When executed they are
//! resolved by symbol against a small table of host natives.

use super::Backend;
use crate::builtins::{BinaryOp, Cast, Primitive};
use crate::error::{CompileError, CompileResult};
use crate::types::{Signature, ValueType};
use crate::value::Value;
use std::fmt;
use tracing::trace;

/// Nested calls deeper than this abort execution
const MAX_CALL_DEPTH: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register(pub usize);

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Arg {
        dst: Register,
        index: usize,
    },
    Const {
        dst: Register,
        value: Value,
    },
    Binary {
        dst: Register,
        op: BinaryOp,
        lhs: Register,
        rhs: Register,
    },
    Cast {
        dst: Register,
        cast: Cast,
        src: Register,
    },
    Call {
        dsts: Vec<Register>,
        function: VmFunction,
        args: Vec<Register>,
    },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Arg { dst, index } => write!(f, "{} = arg {}", dst, index),
            Instruction::Const { dst, value } => write!(f, "{} = const {:?}", dst, value),
            Instruction::Binary { dst, op, lhs, rhs } => {
                write!(f, "{} = {} {} {}", dst, op.symbol(), lhs, rhs)
            }
            Instruction::Cast { dst, cast, src } => write!(f, "{} = {} {}", dst, cast.name(), src),
            Instruction::Call {
                dsts,
                function,
                args,
            } => {
                let list = |regs: &[Register]| {
                    regs.iter()
                        .map(|r| r.to_string())
                        .collect::<Vec<_>>()
                        .join(" ")
                };
                write!(f, "[{}] = call f{} {}", list(dsts), function.0, list(args))
            }
        }
    }
}

/// Index into the backend's function table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmFunction(pub usize);

#[derive(Debug, Clone)]
struct FunctionEntry {
    name: String,
    symbol: String,
    signature: Signature,
    /// `None` until a body is finished; externs never get one
    body: Option<Body>,
}

#[derive(Debug, Clone, Default)]
struct Body {
    registers: usize,
    code: Vec<Instruction>,
    outputs: Vec<Register>,
}

#[derive(Debug, Default)]
pub struct VmBackend {
    functions: Vec<FunctionEntry>,
    building: Option<Body>,
    output: String,
}

impl VmBackend {
    pub fn new() -> Self {
        VmBackend::default()
    }

    /// Instructions of a finished body
    pub fn code(&self, function: VmFunction) -> Option<&[Instruction]> {
        self.functions
            .get(function.0)?
            .body
            .as_ref()
            .map(|body| body.code.as_slice())
    }

    /// Readable listing of a finished body
    pub fn disassemble(&self, function: VmFunction) -> Option<String> {
        let entry = self.functions.get(function.0)?;
        let body = entry.body.as_ref()?;
        let mut text = format!("f{} {} {}\n", function.0, entry.name, entry.signature);
        for instruction in &body.code {
            text.push_str(&format!("  {}\n", instruction));
        }
        let outputs: Vec<_> = body.outputs.iter().map(|r| r.to_string()).collect();
        text.push_str(&format!("  ret {}\n", outputs.join(" ")));
        Some(text)
    }

    fn entry(&self, function: VmFunction) -> CompileResult<&FunctionEntry> {
        self.functions
            .get(function.0)
            .ok_or_else(|| CompileError::Runtime {
                message: format!("no function f{}", function.0),
            })
    }

    fn body_mut(&mut self) -> CompileResult<&mut Body> {
        self.building
            .as_mut()
            .ok_or_else(|| CompileError::UnsupportedOperation {
                operation: "emitting code outside a function body".to_string(),
            })
    }

    fn emit(&mut self, build: impl FnOnce(Register) -> Instruction) -> CompileResult<Register> {
        let body = self.body_mut()?;
        let dst = Register(body.registers);
        body.registers += 1;
        body.code.push(build(dst));
        Ok(dst)
    }

    fn run(
        &mut self,
        function: VmFunction,
        arguments: Vec<Value>,
        depth: usize,
    ) -> CompileResult<Vec<Value>> {
        if depth > MAX_CALL_DEPTH {
            return Err(CompileError::Runtime {
                message: "call depth exceeded".to_string(),
            });
        }
        let entry = self.entry(function)?;
        let Some(body) = entry.body.clone() else {
            let symbol = entry.symbol.clone();
            return self.call_native(&symbol, arguments);
        };
        if arguments.len() != entry.signature.input_arity() {
            return Err(CompileError::Runtime {
                message: format!(
                    "{}: given {} argument(s), takes {}",
                    entry.name,
                    arguments.len(),
                    entry.signature.input_arity()
                ),
            });
        }

        let mut registers: Vec<Option<Value>> = vec![None; body.registers];
        let read = |registers: &[Option<Value>], r: Register| -> CompileResult<Value> {
            registers
                .get(r.0)
                .cloned()
                .flatten()
                .ok_or_else(|| CompileError::Runtime {
                    message: format!("read of unset register {}", r),
                })
        };

        for instruction in &body.code {
            match instruction {
                Instruction::Arg { dst, index } => {
                    registers[dst.0] = arguments.get(*index).cloned();
                }
                Instruction::Const { dst, value } => registers[dst.0] = Some(value.clone()),
                Instruction::Binary { dst, op, lhs, rhs } => {
                    let value = op.apply(&read(&registers, *lhs)?, &read(&registers, *rhs)?)?;
                    registers[dst.0] = Some(value);
                }
                Instruction::Cast { dst, cast, src } => {
                    registers[dst.0] = Some(cast.apply(&read(&registers, *src)?)?);
                }
                Instruction::Call {
                    dsts,
                    function,
                    args,
                } => {
                    let values = args
                        .iter()
                        .map(|r| read(&registers, *r))
                        .collect::<CompileResult<Vec<_>>>()?;
                    let results = self.run(*function, values, depth + 1)?;
                    if results.len() != dsts.len() {
                        return Err(CompileError::Runtime {
                            message: format!(
                                "f{} returned {} value(s), expected {}",
                                function.0,
                                results.len(),
                                dsts.len()
                            ),
                        });
                    }
                    for (dst, value) in dsts.iter().zip(results) {
                        registers[dst.0] = Some(value);
                    }
                }
            }
        }

        body.outputs.iter().map(|r| read(&registers, *r)).collect()
    }

    /// Host implementations for extern words
    fn call_native(&mut self, symbol: &str, arguments: Vec<Value>) -> CompileResult<Vec<Value>> {
        trace!(symbol, "calling native");
        match (symbol, arguments.as_slice()) {
            ("print", [Value::Str(s)]) => {
                self.output.push_str(s);
                Ok(Vec::new())
            }
            ("print-int", [Value::Int(n)]) => {
                self.output.push_str(&format!("{}\n", n));
                Ok(Vec::new())
            }
            ("print-float", [Value::Float(x)]) => {
                self.output.push_str(&format!("{:?}\n", x));
                Ok(Vec::new())
            }
            ("strlen", [Value::Str(s)]) => Ok(vec![Value::Int(s.len() as i32)]),
            ("print" | "print-int" | "print-float" | "strlen", _) => Err(CompileError::Runtime {
                message: format!("{}: bad arguments {:?}", symbol, arguments),
            }),
            _ => Err(CompileError::Runtime {
                message: format!("unresolved extern `{}'", symbol),
            }),
        }
    }
}

impl Backend for VmBackend {
    type Value = Register;
    type Function = VmFunction;

    fn declare_function(
        &mut self,
        name: &str,
        symbol: &str,
        signature: &Signature,
    ) -> CompileResult<VmFunction> {
        let function = VmFunction(self.functions.len());
        self.functions.push(FunctionEntry {
            name: name.to_string(),
            symbol: symbol.to_string(),
            signature: signature.clone(),
            body: None,
        });
        trace!(name, index = function.0, "declared function");
        Ok(function)
    }

    fn begin_body(&mut self, _function: &VmFunction) -> CompileResult<()> {
        self.building = Some(Body::default());
        Ok(())
    }

    fn emit_argument(&mut self, index: usize, _ty: ValueType) -> CompileResult<Register> {
        self.emit(|dst| Instruction::Arg { dst, index })
    }

    fn emit_literal(&mut self, value: &Value) -> CompileResult<Register> {
        let value = value.clone();
        self.emit(|dst| Instruction::Const { dst, value })
    }

    fn emit_primitive(
        &mut self,
        primitive: Primitive,
        operands: &[Register],
    ) -> CompileResult<Vec<Register>> {
        let dst = match (primitive, operands) {
            (Primitive::Binary(op, _), [lhs, rhs]) => {
                let (lhs, rhs) = (*lhs, *rhs);
                self.emit(|dst| Instruction::Binary { dst, op, lhs, rhs })?
            }
            (Primitive::Cast(cast), [src]) => {
                let src = *src;
                self.emit(|dst| Instruction::Cast { dst, cast, src })?
            }
            _ => {
                return Err(CompileError::UnsupportedOperation {
                    operation: format!(
                        "emitting `{}' with {} operand(s)",
                        primitive.name(),
                        operands.len()
                    ),
                });
            }
        };
        Ok(vec![dst])
    }

    fn emit_call(
        &mut self,
        function: &VmFunction,
        arguments: &[Register],
    ) -> CompileResult<Vec<Register>> {
        let outputs = self.entry(*function)?.signature.output_arity();
        let body = self.body_mut()?;
        let dsts: Vec<_> = (0..outputs).map(|i| Register(body.registers + i)).collect();
        body.registers += outputs;
        body.code.push(Instruction::Call {
            dsts: dsts.clone(),
            function: *function,
            args: arguments.to_vec(),
        });
        Ok(dsts)
    }

    fn finish_body(&mut self, function: &VmFunction, outputs: &[Register]) -> CompileResult<()> {
        let mut body = self
            .building
            .take()
            .ok_or_else(|| CompileError::UnsupportedOperation {
                operation: "finishing a body that was never begun".to_string(),
            })?;
        body.outputs = outputs.to_vec();
        let entry = self
            .functions
            .get_mut(function.0)
            .ok_or_else(|| CompileError::Runtime {
                message: format!("no function f{}", function.0),
            })?;
        entry.body = Some(body);
        Ok(())
    }

    fn execute(
        &mut self,
        function: &VmFunction,
        arguments: Vec<Value>,
    ) -> CompileResult<Vec<Value>> {
        self.run(*function, arguments, 0)
    }

    fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
