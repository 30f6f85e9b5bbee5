//! llforth compiler library
//!
//! A front end for a Forth-style concatenative language. Word signatures
//! are never declared: they are inferred from how each body uses the stack,
//! and every body becomes a shared, typed expression graph that a
//! [`Backend`] turns into code.
//!
//! ```rust,ignore
//! use llforthc::{CompilerConfig, compile_to_ir};
//!
//! let ir = compile_to_ir(": square dup * ;", &CompilerConfig::default())?;
//! assert!(ir.contains("define i32 @square(i32 %arg0)"));
//! ```

pub mod backend;
pub mod builtins;
pub mod config;
pub mod definition;
pub mod dictionary;
pub mod driver;
pub mod error;
pub mod graph;
pub mod inference;
pub mod lexer;
pub mod types;
pub mod value;

pub use backend::{Backend, LlvmBackend, VmBackend};
pub use config::{CompilerConfig, ExternDecl};
pub use definition::FunctionDefinition;
pub use dictionary::{Dictionary, Word, WordId, WordKind};
pub use driver::{Session, State};
pub use error::{CompileError, CompileResult};
pub use graph::{Graph, NodeId, NodeKind, OutputRef};
pub use inference::InferenceStack;
pub use lexer::{Lexer, Token, TokenKind};
pub use types::{Signature, ValueType};
pub use value::Value;

use std::fs;
use std::path::Path;

/// A session generating LLVM IR for the configured target
pub fn llvm_session(config: &CompilerConfig) -> CompileResult<Session<LlvmBackend>> {
    let triple = config
        .target_triple
        .as_deref()
        .unwrap_or(backend::get_target_triple());
    let backend = LlvmBackend::new(&config.module_name, triple);
    Session::with_config(backend, config.clone())
}

/// Compile source text to an LLVM IR module.
///
/// Top-level code may use built-ins and directives; calling a compiled word
/// at the top level needs immediate execution, which this backend lacks.
pub fn compile_to_ir(source: &str, config: &CompilerConfig) -> CompileResult<String> {
    let mut session = llvm_session(config)?;
    session.run(source)?;
    session.backend().module_ir()
}

/// Compile a source file and write the IR to `output_path`
pub fn compile_file(
    source_path: &Path,
    output_path: &Path,
    config: &CompilerConfig,
) -> CompileResult<()> {
    let source = read_source(source_path)?;
    let ir = compile_to_ir(&source, config)?;
    fs::write(output_path, ir).map_err(|e| CompileError::Io {
        path: output_path.display().to_string(),
        message: e.to_string(),
    })
}

/// Run source text on the bytecode VM and return everything it printed
pub fn run_source(source: &str, config: &CompilerConfig) -> CompileResult<String> {
    let mut session = Session::with_config(VmBackend::new(), config.clone())?;
    let result = session.run(source);
    let output = session.take_output();
    result.map(|()| output)
}

/// Inferred signatures of every user word in a source text, in definition order
pub fn check_source(
    source: &str,
    config: &CompilerConfig,
) -> CompileResult<Vec<(String, Signature)>> {
    let mut session = Session::with_config(VmBackend::new(), config.clone())?;
    session.run(source)?;
    Ok(session.user_words())
}

pub fn read_source(path: &Path) -> CompileResult<String> {
    fs::read_to_string(path).map_err(|e| CompileError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
