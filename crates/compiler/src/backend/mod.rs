//! Code generation backends
//!
//! The front end never looks inside a handle: it only threads `Value`
//! handles between node compilations and keeps one `Function` handle per
//! defined word.
//!
//! A body is generated in one pass:
//! 1. `declare_function` once per word (externs stop here)
//! 2. `begin_body`
//! 3. one `emit_*` per non-shuffler node, each at most once
//! 4. `finish_body` with the output values, bottom-to-top

mod llvm;
mod vm;

pub use llvm::{LlvmBackend, LlvmFunction, get_target_triple, mangle_name};
pub use vm::{Instruction, Register, VmBackend, VmFunction};

use crate::builtins::Primitive;
use crate::error::{CompileError, CompileResult};
use crate::types::{Signature, ValueType};
use crate::value::Value;
use std::fmt::Debug;

pub trait Backend {
    /// Handle for one produced value (register, SSA name, ...)
    type Value: Clone + Debug;
    /// Handle for one declared function
    type Function: Clone + Debug;

    /// Declare a function. `symbol` is the external name for externs and
    /// the word name for definitions.
    fn declare_function(
        &mut self,
        name: &str,
        symbol: &str,
        signature: &Signature,
    ) -> CompileResult<Self::Function>;

    fn begin_body(&mut self, function: &Self::Function) -> CompileResult<()>;

    fn emit_argument(&mut self, index: usize, ty: ValueType) -> CompileResult<Self::Value>;

    fn emit_literal(&mut self, value: &Value) -> CompileResult<Self::Value>;

    /// Operands are bottom-to-top. Never called for stack shufflers.
    fn emit_primitive(
        &mut self,
        primitive: Primitive,
        operands: &[Self::Value],
    ) -> CompileResult<Vec<Self::Value>>;

    /// Arguments are in argument order; results are the callee's outputs
    fn emit_call(
        &mut self,
        function: &Self::Function,
        arguments: &[Self::Value],
    ) -> CompileResult<Vec<Self::Value>>;

    fn finish_body(
        &mut self,
        function: &Self::Function,
        outputs: &[Self::Value],
    ) -> CompileResult<()>;

    /// Run a compiled function on constant arguments (argument order) and
    /// return its outputs bottom-to-top.
    fn execute(
        &mut self,
        function: &Self::Function,
        arguments: Vec<Value>,
    ) -> CompileResult<Vec<Value>> {
        let _ = (function, arguments);
        Err(CompileError::UnsupportedOperation {
            operation: "immediate execution on this backend".to_string(),
        })
    }

    /// Text printed by executed code since the last call
    fn take_output(&mut self) -> String {
        String::new()
    }
}
