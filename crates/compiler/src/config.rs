//! Compiler configuration
//!
//! Configuration is optional. It can be built in code or loaded from TOML:
//!
//! ```toml
//! module_name = "demo"
//! target_triple = "x86_64-unknown-linux-gnu"
//! trace_definitions = true
//!
//! [[externs]]
//! name = "puts"
//! inputs = "s"
//! outputs = ""
//!
//! [[externs]]
//! name = "add"
//! symbol = "runtime_add"
//! inputs = "i i"
//! outputs = "i"
//! ```

use crate::error::{CompileError, CompileResult};
use crate::types::Signature;
use serde::Deserialize;
use std::path::Path;

/// An extern word declared before any source is read
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExternDecl {
    /// The name used in source code
    pub name: String,

    /// The symbol name for linking; defaults to `name`
    ///
    /// Must contain only alphanumeric characters, underscores, and periods.
    #[serde(default)]
    pub symbol: Option<String>,

    /// Input type codes in argument order, e.g. `"i i"`
    #[serde(default)]
    pub inputs: String,

    /// Output type codes bottom-to-top
    #[serde(default)]
    pub outputs: String,
}

impl ExternDecl {
    pub fn new(
        name: impl Into<String>,
        inputs: impl Into<String>,
        outputs: impl Into<String>,
    ) -> Self {
        ExternDecl {
            name: name.into(),
            symbol: None,
            inputs: inputs.into(),
            outputs: outputs.into(),
        }
    }

    /// Link against a symbol other than the word name
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> CompileResult<Self> {
        let symbol = symbol.into();
        validate_symbol(&symbol)?;
        self.symbol = Some(symbol);
        Ok(self)
    }

    pub fn symbol(&self) -> &str {
        self.symbol.as_deref().unwrap_or(&self.name)
    }

    pub fn signature(&self) -> CompileResult<Signature> {
        Signature::from_codes(&self.name, &self.inputs, &self.outputs)
    }

    fn validate(&self) -> CompileResult<()> {
        if self.name.is_empty() {
            return Err(CompileError::Config("extern with empty name".to_string()));
        }
        if let Some(symbol) = &self.symbol {
            validate_symbol(symbol)?;
        }
        self.signature().map(|_| ())
    }
}

/// Valid symbols contain only alphanumeric characters, underscores and
/// periods, so they can be written into LLVM IR unescaped.
fn validate_symbol(symbol: &str) -> CompileResult<()> {
    if symbol.is_empty() {
        return Err(CompileError::Config("symbol name cannot be empty".to_string()));
    }
    if let Some(c) = symbol
        .chars()
        .find(|c| !c.is_alphanumeric() && *c != '_' && *c != '.')
    {
        return Err(CompileError::Config(format!(
            "invalid character '{}' in symbol '{}'",
            c, symbol
        )));
    }
    Ok(())
}

fn default_module_name() -> String {
    "llforth".to_string()
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Overrides the host triple in emitted IR
    #[serde(default)]
    pub target_triple: Option<String>,

    #[serde(default = "default_module_name")]
    pub module_name: String,

    /// Externs entered into the dictionary before the source
    #[serde(default)]
    pub externs: Vec<ExternDecl>,

    /// Print every finished definition's node trace
    #[serde(default)]
    pub trace_definitions: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        CompilerConfig {
            target_triple: None,
            module_name: default_module_name(),
            externs: Vec::new(),
            trace_definitions: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        CompilerConfig::default()
    }

    pub fn from_toml(toml_str: &str) -> CompileResult<Self> {
        let config: CompilerConfig = toml::from_str(toml_str)
            .map_err(|e| CompileError::Config(format!("failed to parse config: {}", e)))?;
        for decl in &config.externs {
            decl.validate()?;
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> CompileResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            CompileError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
    }

    pub fn with_extern(mut self, decl: ExternDecl) -> Self {
        self.externs.push(decl);
        self
    }

    pub fn with_target_triple(mut self, triple: impl Into<String>) -> Self {
        self.target_triple = Some(triple.into());
        self
    }

    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    pub fn with_trace_definitions(mut self, enabled: bool) -> Self {
        self.trace_definitions = enabled;
        self
    }
}
