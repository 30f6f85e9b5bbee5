//! LLVM IR text backend
//!
//! Emits a textual `.ll` module. Values are SSA operands (`%t3`, `%arg0`,
//! immediate constants or `@.str.N` globals), functions are symbols.
//!
//! Type lowering: Int32 is `i32`, Float is `float`, String is `ptr` to a
//! NUL-terminated byte array. A word with several outputs returns a literal
//! struct of its output types; callers unpack it with `extractvalue`.
//! Polymorphic (`Any`) signatures cannot be lowered.

use super::Backend;
use crate::builtins::{BinaryOp, Cast, Primitive};
use crate::error::{CompileError, CompileResult};
use crate::types::{Signature, ValueType};
use crate::value::Value;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::trace;

/// Runtime helper backing `i>s`
const INT_TO_STRING: &str = "llforth_int_to_string";

#[derive(Debug, Clone, PartialEq)]
pub struct LlvmFunction {
    pub symbol: String,
    pub signature: Signature,
}

#[derive(Debug)]
pub struct LlvmBackend {
    module_name: String,
    target_triple: String,
    /// Every declared function, in declaration order, with its body flag
    declared: Vec<(LlvmFunction, bool)>,
    string_globals: String,
    string_constants: HashMap<String, String>,
    string_counter: usize,
    functions: String,
    body: String,
    temp_counter: usize,
    uses_int_to_string: bool,
}

impl Default for LlvmBackend {
    fn default() -> Self {
        LlvmBackend::new("llforth", get_target_triple())
    }
}

impl LlvmBackend {
    pub fn new(module_name: &str, target_triple: &str) -> Self {
        LlvmBackend {
            module_name: module_name.to_string(),
            target_triple: target_triple.to_string(),
            declared: Vec::new(),
            string_globals: String::new(),
            string_constants: HashMap::new(),
            string_counter: 0,
            functions: String::new(),
            body: String::new(),
            temp_counter: 0,
            uses_int_to_string: false,
        }
    }

    /// The complete module text
    pub fn module_ir(&self) -> CompileResult<String> {
        let mut ir = String::new();
        writeln!(&mut ir, "; ModuleID = '{}'", self.module_name)?;
        writeln!(&mut ir, "source_filename = \"{}\"", self.module_name)?;
        writeln!(&mut ir, "target triple = \"{}\"", self.target_triple)?;
        writeln!(&mut ir)?;

        if !self.string_globals.is_empty() {
            ir.push_str(&self.string_globals);
            writeln!(&mut ir)?;
        }

        ir.push_str(&self.functions);

        let mut declares = String::new();
        for (function, has_body) in &self.declared {
            if !has_body {
                writeln!(
                    &mut declares,
                    "declare {} @{}({})",
                    return_type(&function.signature)?,
                    function.symbol,
                    parameter_types(&function.signature)?
                )?;
            }
        }
        if self.uses_int_to_string {
            writeln!(&mut declares, "declare ptr @{}(i32)", INT_TO_STRING)?;
        }
        if !declares.is_empty() {
            writeln!(&mut ir, "; External declarations")?;
            ir.push_str(&declares);
        }
        Ok(ir)
    }

    fn fresh_temp(&mut self) -> String {
        let name = format!("%t{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn string_global(&mut self, s: &str) -> CompileResult<String> {
        if let Some(global) = self.string_constants.get(s) {
            return Ok(global.clone());
        }
        let global = format!("@.str.{}", self.string_counter);
        self.string_counter += 1;
        writeln!(
            &mut self.string_globals,
            "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
            global,
            s.len() + 1,
            escape_llvm_string(s)?
        )?;
        self.string_constants.insert(s.to_string(), global.clone());
        Ok(global)
    }

    /// Pick a symbol that no function with a body already uses
    fn unique_symbol(&self, base: &str, signature: &Signature) -> Option<String> {
        let taken = |sym: &str| self.declared.iter().find(|(f, _)| f.symbol == sym);
        match taken(base) {
            None => Some(base.to_string()),
            // A repeated bodyless declaration names the same external symbol
            Some((existing, false)) if existing.signature == *signature => None,
            Some(_) => (1..)
                .map(|n| format!("{}.{}", base, n))
                .find(|candidate| taken(candidate).is_none()),
        }
    }
}

impl Backend for LlvmBackend {
    type Value = String;
    type Function = LlvmFunction;

    fn declare_function(
        &mut self,
        name: &str,
        symbol: &str,
        signature: &Signature,
    ) -> CompileResult<LlvmFunction> {
        // Reject unlowerable signatures up front
        return_type(signature)?;
        parameter_types(signature)?;

        let base = mangle_name(symbol);
        let function = match self.unique_symbol(&base, signature) {
            Some(symbol) => {
                let function = LlvmFunction {
                    symbol,
                    signature: signature.clone(),
                };
                self.declared.push((function.clone(), false));
                function
            }
            None => LlvmFunction {
                symbol: base,
                signature: signature.clone(),
            },
        };
        trace!(name, symbol = %function.symbol, "declared function");
        Ok(function)
    }

    fn begin_body(&mut self, function: &LlvmFunction) -> CompileResult<()> {
        self.body.clear();
        self.temp_counter = 0;
        let params = function
            .signature
            .inputs
            .iter()
            .enumerate()
            .map(|(i, ty)| Ok(format!("{} %arg{}", llvm_type(*ty)?, i)))
            .collect::<CompileResult<Vec<_>>>()?
            .join(", ");
        writeln!(
            &mut self.body,
            "define {} @{}({}) {{",
            return_type(&function.signature)?,
            function.symbol,
            params
        )?;
        writeln!(&mut self.body, "entry:")?;
        Ok(())
    }

    fn emit_argument(&mut self, index: usize, ty: ValueType) -> CompileResult<String> {
        llvm_type(ty)?;
        Ok(format!("%arg{}", index))
    }

    fn emit_literal(&mut self, value: &Value) -> CompileResult<String> {
        Ok(match value {
            Value::Int(n) => n.to_string(),
            // LLVM spells float constants as the hex bits of the equivalent double
            Value::Float(x) => format!("0x{:016X}", f64::from(*x).to_bits()),
            Value::Str(s) => self.string_global(s)?,
        })
    }

    fn emit_primitive(
        &mut self,
        primitive: Primitive,
        operands: &[String],
    ) -> CompileResult<Vec<String>> {
        let result = self.fresh_temp();
        match primitive {
            Primitive::Binary(op, ValueType::Int32) => {
                let instruction = match op {
                    BinaryOp::Add => "add",
                    BinaryOp::Sub => "sub",
                    BinaryOp::Mul => "mul",
                    BinaryOp::Div => "sdiv",
                    BinaryOp::Mod => "srem",
                };
                writeln!(
                    &mut self.body,
                    "  {} = {} i32 {}, {}",
                    result, instruction, operands[0], operands[1]
                )?;
            }
            Primitive::Binary(op, ValueType::Float) => {
                let instruction = match op {
                    BinaryOp::Add => "fadd",
                    BinaryOp::Sub => "fsub",
                    BinaryOp::Mul => "fmul",
                    BinaryOp::Div => "fdiv",
                    BinaryOp::Mod => "frem",
                };
                writeln!(
                    &mut self.body,
                    "  {} = {} float {}, {}",
                    result, instruction, operands[0], operands[1]
                )?;
            }
            Primitive::Cast(Cast::IntToFloat) => {
                writeln!(&mut self.body, "  {} = sitofp i32 {} to float", result, operands[0])?;
            }
            Primitive::Cast(Cast::FloatToInt) => {
                writeln!(&mut self.body, "  {} = fptosi float {} to i32", result, operands[0])?;
            }
            Primitive::Cast(Cast::IntToString) => {
                self.uses_int_to_string = true;
                writeln!(
                    &mut self.body,
                    "  {} = call ptr @{}(i32 {})",
                    result, INT_TO_STRING, operands[0]
                )?;
            }
            other => {
                return Err(CompileError::UnsupportedOperation {
                    operation: format!("lowering `{}' to LLVM IR", other.name()),
                });
            }
        }
        Ok(vec![result])
    }

    fn emit_call(
        &mut self,
        function: &LlvmFunction,
        arguments: &[String],
    ) -> CompileResult<Vec<String>> {
        let signature = &function.signature;
        let args = signature
            .inputs
            .iter()
            .zip(arguments)
            .map(|(ty, arg)| Ok(format!("{} {}", llvm_type(*ty)?, arg)))
            .collect::<CompileResult<Vec<_>>>()?
            .join(", ");
        let ret = return_type(signature)?;

        match signature.output_arity() {
            0 => {
                writeln!(&mut self.body, "  call void @{}({})", function.symbol, args)?;
                Ok(Vec::new())
            }
            1 => {
                let result = self.fresh_temp();
                writeln!(
                    &mut self.body,
                    "  {} = call {} @{}({})",
                    result, ret, function.symbol, args
                )?;
                Ok(vec![result])
            }
            n => {
                let aggregate = self.fresh_temp();
                writeln!(
                    &mut self.body,
                    "  {} = call {} @{}({})",
                    aggregate, ret, function.symbol, args
                )?;
                let mut results = Vec::with_capacity(n);
                for i in 0..n {
                    let field = self.fresh_temp();
                    writeln!(
                        &mut self.body,
                        "  {} = extractvalue {} {}, {}",
                        field, ret, aggregate, i
                    )?;
                    results.push(field);
                }
                Ok(results)
            }
        }
    }

    fn finish_body(&mut self, function: &LlvmFunction, outputs: &[String]) -> CompileResult<()> {
        let signature = &function.signature;
        match outputs {
            [] => writeln!(&mut self.body, "  ret void")?,
            [single] => writeln!(
                &mut self.body,
                "  ret {} {}",
                llvm_type(signature.outputs.first().copied().unwrap_or(ValueType::Null))?,
                single
            )?,
            many => {
                let ret = return_type(signature)?;
                let mut aggregate = "undef".to_string();
                for (i, (value, ty)) in many.iter().zip(&signature.outputs).enumerate() {
                    let next = self.fresh_temp();
                    writeln!(
                        &mut self.body,
                        "  {} = insertvalue {} {}, {} {}, {}",
                        next,
                        ret,
                        aggregate,
                        llvm_type(*ty)?,
                        value,
                        i
                    )?;
                    aggregate = next;
                }
                writeln!(&mut self.body, "  ret {} {}", ret, aggregate)?;
            }
        }
        writeln!(&mut self.body, "}}")?;
        writeln!(&mut self.body)?;

        self.functions.push_str(&self.body);
        self.body.clear();
        if let Some(entry) = self
            .declared
            .iter_mut()
            .find(|(f, _)| f.symbol == function.symbol)
        {
            entry.1 = true;
        }
        Ok(())
    }
}

fn llvm_type(ty: ValueType) -> CompileResult<&'static str> {
    match ty {
        ValueType::Int32 => Ok("i32"),
        ValueType::Float => Ok("float"),
        ValueType::String => Ok("ptr"),
        ValueType::Null | ValueType::Any => Err(CompileError::UnsupportedOperation {
            operation: format!("lowering type {} to LLVM IR", ty),
        }),
    }
}

fn return_type(signature: &Signature) -> CompileResult<String> {
    match signature.outputs.as_slice() {
        [] => Ok("void".to_string()),
        [single] => Ok(llvm_type(*single)?.to_string()),
        many => {
            let fields = many
                .iter()
                .map(|ty| llvm_type(*ty))
                .collect::<CompileResult<Vec<_>>>()?;
            Ok(format!("{{ {} }}", fields.join(", ")))
        }
    }
}

fn parameter_types(signature: &Signature) -> CompileResult<String> {
    Ok(signature
        .inputs
        .iter()
        .map(|ty| llvm_type(*ty))
        .collect::<CompileResult<Vec<_>>>()?
        .join(", "))
}

/// Spellings for punctuation common in word names
const MANGLED_PUNCTUATION: &[(char, &str)] = &[
    ('?', "_Q_"),
    ('>', "_GT_"),
    ('<', "_LT_"),
    ('!', "_BANG_"),
    ('*', "_STAR_"),
    ('/', "_SLASH_"),
    ('+', "_PLUS_"),
    ('=', "_EQ_"),
    ('@', "_AT_"),
    ('-', "_"),
];

/// Turn a word name into a bare LLVM identifier: `i>s` becomes `i_GT_s`.
/// Characters without a spelling are hex-escaped as `_xNN_`.
pub fn mangle_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$') {
                return c.to_string();
            }
            MANGLED_PUNCTUATION
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| format!("_x{:02X}_", c as u32))
        })
        .collect()
}

/// Escape a string for an LLVM `c"..."` literal
fn escape_llvm_string(s: &str) -> Result<String, std::fmt::Error> {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b' '..=b'!' | b'#'..=b'[' | b']'..=b'~' => result.push(byte as char),
            _ => write!(&mut result, r"\{:02X}", byte)?,
        }
    }
    Ok(result)
}

/// Target triple for the host platform, or `"unknown"`
pub fn get_target_triple() -> &'static str {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("macos", "aarch64") => "arm64-apple-macosx14.0.0",
        ("macos", "x86_64") => "x86_64-apple-darwin",
        ("linux", "x86_64") => "x86_64-unknown-linux-gnu",
        ("linux", "aarch64") => "aarch64-unknown-linux-gnu",
        ("windows", "x86_64") => "x86_64-pc-windows-msvc",
        _ => "unknown",
    }
}
