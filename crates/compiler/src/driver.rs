//! Definition driver
//!
//! A [`Session`] reads tokens and routes each one either into the
//! definition being built or to immediate execution. It is a small state
//! machine:
//!
//! - `TopLevel`: `:` starts a definition, `extern` starts a declaration,
//!   anything else runs immediately against the runtime stack.
//! - `DefiningBody`: tokens are spliced into the inference engine until `;`.
//! - `DefiningExtern`: the raw words of `name ( in* -- out* )` are read.
//!
//! Errors abort the current `run` but leave the session usable: every
//! definition completed before the error stays in the dictionary.

use crate::backend::Backend;
use crate::builtins::{Builtin, Directive, Primitive};
use crate::config::CompilerConfig;
use crate::definition::FunctionDefinition;
use crate::dictionary::{Dictionary, Word, WordId, WordKind};
use crate::error::{CompileError, CompileResult};
use crate::graph::CallTarget;
use crate::inference::InferenceStack;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::types::{Signature, ValueType, parse_type_list};
use crate::value::Value;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    TopLevel,
    DefiningBody,
    DefiningExtern,
}

pub struct Session<B: Backend> {
    dictionary: Dictionary,
    backend: B,
    /// Function handle per word, indexed by `WordId`
    functions: Vec<Option<B::Function>>,
    engine: InferenceStack,
    /// Runtime stack for immediate execution, bottom-to-top
    stack: Vec<Value>,
    config: CompilerConfig,
    output: String,
    state: State,
}

impl<B: Backend> Session<B> {
    pub fn new(backend: B) -> Self {
        let dictionary = Dictionary::with_builtins();
        let functions = vec![None; dictionary.len()];
        Session {
            dictionary,
            backend,
            functions,
            engine: InferenceStack::new(),
            stack: Vec::new(),
            config: CompilerConfig::default(),
            output: String::new(),
            state: State::TopLevel,
        }
    }

    /// A session with the configured externs already declared
    pub fn with_config(backend: B, config: CompilerConfig) -> CompileResult<Self> {
        let mut session = Session::new(backend);
        for decl in &config.externs {
            let signature = decl.signature()?;
            session.declare_extern_word(&decl.name, decl.symbol(), signature)?;
        }
        info!(
            module = %config.module_name,
            externs = config.externs.len(),
            "session configured"
        );
        session.config = config;
        Ok(session)
    }

    /// Process a whole source text
    pub fn run(&mut self, source: &str) -> CompileResult<()> {
        let mut lexer = Lexer::new(source);
        let result = self.run_tokens(&mut lexer);
        if result.is_err() {
            self.state = State::TopLevel;
            self.engine.clear();
        }
        let printed = self.backend.take_output();
        self.output.push_str(&printed);
        result
    }

    /// Top-level positions index the whole token stream, definitions included
    fn run_tokens(&mut self, lexer: &mut Lexer) -> CompileResult<()> {
        while let Some(token) = lexer.next_token()? {
            let position = lexer.tokens_consumed() - 1;
            match (&token.kind, token.text.as_str()) {
                (TokenKind::Word, ":") => self.define(lexer)?,
                (TokenKind::Word, "extern") => self.declare_extern(lexer)?,
                _ => self.execute(lexer, &token, position)?,
            }
        }
        Ok(())
    }

    // ---- DefiningBody ----

    fn define(&mut self, lexer: &mut Lexer) -> CompileResult<()> {
        self.state = State::DefiningBody;
        let name = lexer
            .next_token()?
            .ok_or_else(|| CompileError::UnterminatedDefinition {
                name: String::new(),
            })?
            .text;
        debug!(name = %name, "begin definition");

        // Hidden until `;`, so the body sees any older word with this name
        let placeholder = self.define_word(Word::pending(&name));
        self.engine.clear();
        let mut definition = FunctionDefinition::new(&name);

        let mut position = 0;
        loop {
            let token = lexer
                .next_token()?
                .ok_or_else(|| CompileError::UnterminatedDefinition { name: name.clone() })?;
            if token.kind == TokenKind::Word {
                match token.text.as_str() {
                    ";" => break,
                    ":" | "extern" => {
                        return Err(CompileError::UnsupportedOperation {
                            operation: format!(
                                "`{}' inside the definition of `{}'",
                                token.text, name
                            ),
                        });
                    }
                    _ => {}
                }
            }
            self.compile_token(&mut definition, &token, position)?;
            definition.source.push(token.text);
            position += 1;
        }

        let (outputs, arguments) = self.engine.finish();
        definition.outputs = outputs;
        definition.arguments = arguments;
        let signature = definition.signature()?;

        let function = self.backend.declare_function(&name, &name, &signature)?;
        definition.compile(&function, &mut self.backend, &self.functions)?;

        debug!(name = %name, %signature, nodes = definition.graph.len(), "finished definition");
        if self.config.trace_definitions {
            self.output.push_str(&definition.trace());
            self.output.push('\n');
        }

        self.functions[placeholder.0] = Some(function);
        self.dictionary.get_mut(placeholder).kind = WordKind::Compiled(definition);
        self.dictionary.unhide(placeholder);
        self.state = State::TopLevel;
        Ok(())
    }

    /// Splice one body token into the definition being built
    fn compile_token(
        &mut self,
        definition: &mut FunctionDefinition,
        token: &Token,
        position: usize,
    ) -> CompileResult<()> {
        let graph = &mut definition.graph;

        if let TokenKind::Str(text) = &token.kind {
            let node = graph.add_literal(Value::Str(text.clone()));
            self.engine.push(graph, node);
            return Ok(());
        }

        if let Some(id) = self.dictionary.find(&token.text) {
            let word = self.dictionary.get(id);
            return match &word.kind {
                WordKind::Builtin(Builtin::Primitive(primitive)) => {
                    self.engine.apply(graph, *primitive, position).map(|_| ())
                }
                WordKind::Builtin(Builtin::Directive(_)) => Err(CompileError::UnsupportedOperation {
                    operation: format!("`{}' inside a definition", word.name),
                }),
                WordKind::Compiled(callee) if word.inline => {
                    callee.inline_into(graph, &mut self.engine, position)
                }
                WordKind::Compiled(_) | WordKind::Extern { .. } => {
                    let signature = word.signature()?;
                    let mut inputs = Vec::with_capacity(signature.input_arity());
                    for &ty in &signature.inputs {
                        inputs.push(self.engine.pop(graph, ty, &word.name, position)?);
                    }
                    let target = CallTarget {
                        word: id,
                        name: word.name.clone(),
                        signature,
                    };
                    let node = graph.add_call(target, inputs)?;
                    self.engine.push(graph, node);
                    Ok(())
                }
                WordKind::Pending => Err(CompileError::UnsupportedOperation {
                    operation: format!("calling `{}' before it is defined", word.name),
                }),
            };
        }

        let value = literal(token)?;
        let node = graph.add_literal(value);
        self.engine.push(graph, node);
        Ok(())
    }

    // ---- DefiningExtern ----

    fn declare_extern(&mut self, lexer: &mut Lexer) -> CompileResult<()> {
        self.state = State::DefiningExtern;
        let malformed = |reason: &str| CompileError::ArityError {
            word: "extern".to_string(),
            reason: reason.to_string(),
        };

        let name = lexer.next_word().ok_or_else(|| malformed("missing name"))?.text;
        match lexer.next_word() {
            Some(open) if open.text == "(" => {}
            _ => return Err(malformed("expected `(' after the name")),
        }

        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        let mut after_separator = false;
        loop {
            let word = lexer
                .next_word()
                .ok_or_else(|| malformed("unterminated signature"))?;
            match word.text.as_str() {
                ")" if after_separator => break,
                ")" => return Err(malformed("missing `--' in signature")),
                "--" if !after_separator => after_separator = true,
                "--" => return Err(malformed("repeated `--' in signature")),
                _ if after_separator => outputs.push(word.text),
                _ => inputs.push(word.text),
            }
        }

        let signature = Signature::new(
            parse_type_list(&name, inputs.iter().map(String::as_str))?,
            parse_type_list(&name, outputs.iter().map(String::as_str))?,
        );
        self.declare_extern_word(&name, &name, signature)?;
        self.state = State::TopLevel;
        Ok(())
    }

    fn declare_extern_word(
        &mut self,
        name: &str,
        symbol: &str,
        signature: Signature,
    ) -> CompileResult<WordId> {
        let function = self.backend.declare_function(name, symbol, &signature)?;
        debug!(name, symbol, %signature, "declared extern");
        let id = self.define_word(Word::external(name, symbol, signature));
        self.functions[id.0] = Some(function);
        Ok(id)
    }

    fn define_word(&mut self, word: Word) -> WordId {
        let id = self.dictionary.define(word);
        self.functions.resize(self.dictionary.len(), None);
        id
    }

    // ---- TopLevel: immediate execution ----

    fn execute(&mut self, lexer: &mut Lexer, token: &Token, position: usize) -> CompileResult<()> {
        if let TokenKind::Str(text) = &token.kind {
            self.stack.push(Value::Str(text.clone()));
            return Ok(());
        }

        let Some(id) = self.dictionary.find(&token.text) else {
            let value = literal(token)?;
            self.stack.push(value);
            return Ok(());
        };

        let word = self.dictionary.get(id);
        match &word.kind {
            WordKind::Builtin(Builtin::Primitive(primitive)) => {
                let primitive = *primitive;
                self.execute_primitive(primitive, position)
            }
            WordKind::Builtin(Builtin::Directive(directive)) => {
                let directive = *directive;
                self.execute_directive(directive, lexer)
            }
            WordKind::Compiled(_) | WordKind::Extern { .. } => {
                let name = word.name.clone();
                let signature = word.signature()?;
                self.execute_word(id, &name, &signature, position)
            }
            WordKind::Pending => Err(CompileError::UnsupportedOperation {
                operation: format!("executing `{}' before it is defined", word.name),
            }),
        }
    }

    fn execute_primitive(&mut self, primitive: Primitive, position: usize) -> CompileResult<()> {
        let arity = primitive.input_arity();
        let operands = self.take_operands(primitive.name(), arity)?;
        let checked = operands.iter().enumerate().try_for_each(|(slot, operand)| {
            check_operand(primitive.name(), position, primitive.input_type(slot)?, operand)
        });
        match checked.and_then(|()| primitive.eval(&operands)) {
            Ok(results) => {
                self.stack.extend(results);
                Ok(())
            }
            Err(e) => {
                self.stack.extend(operands);
                Err(e)
            }
        }
    }

    /// Call a compiled or extern word through the backend
    fn execute_word(
        &mut self,
        id: WordId,
        name: &str,
        signature: &Signature,
        position: usize,
    ) -> CompileResult<()> {
        let mut operands = self.take_operands(name, signature.input_arity())?;
        // Argument 0 is the top of the stack
        operands.reverse();
        for (&ty, operand) in signature.inputs.iter().zip(&operands) {
            if let Err(e) = check_operand(name, position, ty, operand) {
                operands.reverse();
                self.stack.extend(operands);
                return Err(e);
            }
        }

        let function = self
            .functions
            .get(id.0)
            .and_then(|f| f.as_ref())
            .ok_or_else(|| CompileError::UnsupportedOperation {
                operation: format!("executing `{}' without a compiled function", name),
            })?;
        let results = self.backend.execute(function, operands)?;
        let printed = self.backend.take_output();
        self.output.push_str(&printed);
        self.stack.extend(results);
        Ok(())
    }

    /// Remove the top `count` values, bottom-to-top
    fn take_operands(&mut self, word: &str, count: usize) -> CompileResult<Vec<Value>> {
        if self.stack.len() < count {
            return Err(CompileError::StackUnderflow {
                word: word.to_string(),
                required: count,
                available: self.stack.len(),
            });
        }
        Ok(self.stack.split_off(self.stack.len() - count))
    }

    fn execute_directive(&mut self, directive: Directive, lexer: &mut Lexer) -> CompileResult<()> {
        match directive {
            Directive::Print => {
                let value = self.take_operands(".", 1)?.remove(0);
                self.output.push_str(&format!("{} ", value));
            }
            Directive::PrintStack => {
                let items: Vec<_> = self.stack.iter().map(|v| v.to_string()).collect();
                self.output
                    .push_str(&format!("<{}> {}\n", items.len(), items.join(" ")));
            }
            Directive::Inline => {
                let id = self.dictionary.latest_definition().ok_or_else(|| {
                    CompileError::UnsupportedOperation {
                        operation: "`inline' with no definition to mark".to_string(),
                    }
                })?;
                self.dictionary.get_mut(id).inline = true;
                debug!(name = %self.dictionary.get(id).name, "marked inline");
            }
            Directive::See => {
                let name = lexer
                    .next_token()?
                    .ok_or_else(|| CompileError::UnknownToken {
                        name: "see".to_string(),
                    })?
                    .text;
                let id = self
                    .dictionary
                    .find(&name)
                    .ok_or(CompileError::UnknownToken { name })?;
                let word = self.dictionary.get(id);
                let text = match &word.kind {
                    WordKind::Compiled(definition) => definition.trace(),
                    _ => word.to_string(),
                };
                self.output.push_str(&text);
                self.output.push('\n');
            }
            Directive::Words => {
                let names: Vec<_> = self
                    .dictionary
                    .visible()
                    .map(|(_, word)| word.name.as_str())
                    .collect();
                self.output.push_str(&names.join(" "));
                self.output.push('\n');
            }
        }
        Ok(())
    }

    // ---- accessors ----

    /// Inferred or declared signature of a visible word
    pub fn signature(&self, name: &str) -> CompileResult<Signature> {
        let id = self.dictionary.find(name).ok_or_else(|| CompileError::UnknownToken {
            name: name.to_string(),
        })?;
        self.dictionary.get(id).signature()
    }

    /// Visible colon definition by name
    pub fn definition(&self, name: &str) -> Option<&FunctionDefinition> {
        let id = self.dictionary.find(name)?;
        match &self.dictionary.get(id).kind {
            WordKind::Compiled(definition) => Some(definition),
            _ => None,
        }
    }

    /// Visible user words (definitions and externs), oldest first
    pub fn user_words(&self) -> Vec<(String, Signature)> {
        let mut words: Vec<_> = self
            .dictionary
            .visible()
            .filter(|(_, word)| {
                matches!(word.kind, WordKind::Compiled(_) | WordKind::Extern { .. })
            })
            .filter_map(|(_, word)| word.signature().ok().map(|s| (word.name.clone(), s)))
            .collect();
        words.reverse();
        words
    }

    /// Everything printed since the last call
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> State {
        self.state
    }
}

fn literal(token: &Token) -> CompileResult<Value> {
    match &token.kind {
        TokenKind::Integer(n) => Ok(Value::Int(*n)),
        TokenKind::Float(x) => Ok(Value::Float(*x)),
        TokenKind::Str(s) => Ok(Value::Str(s.clone())),
        TokenKind::Word => Err(CompileError::UnknownToken {
            name: token.text.clone(),
        }),
    }
}

fn check_operand(
    word: &str,
    position: usize,
    required: ValueType,
    value: &Value,
) -> CompileResult<()> {
    let actual = value.value_type();
    if ValueType::compatible(required, actual) {
        Ok(())
    } else {
        Err(CompileError::TypeError {
            word: word.to_string(),
            position,
            expected: required,
            actual,
        })
    }
}

/// True when `source` stops inside a colon definition or extern signature,
/// so an interactive reader should ask for more lines.
pub fn is_incomplete(source: &str) -> bool {
    let mut lexer = Lexer::new(source);
    let mut in_definition = false;
    loop {
        match lexer.next_token() {
            Ok(Some(token)) if token.kind == TokenKind::Word => match token.text.as_str() {
                ":" => in_definition = true,
                ";" => in_definition = false,
                "extern" if !in_definition => {
                    let mut closed = false;
                    while let Some(word) = lexer.next_word() {
                        if word.text == ")" {
                            closed = true;
                            break;
                        }
                    }
                    if !closed {
                        return true;
                    }
                }
                _ => {}
            },
            Ok(Some(_)) => {}
            Ok(None) => return in_definition,
            Err(_) => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VmBackend;

    fn session() -> Session<VmBackend> {
        Session::new(VmBackend::new())
    }

    #[test]
    fn test_immediate_arithmetic() {
        let mut s = session();
        s.run("2 3 + 4 * .").unwrap();
        assert_eq!(s.take_output(), "20 ");
        assert!(s.stack().is_empty());
    }

    #[test]
    fn test_immediate_underflow_keeps_stack() {
        let mut s = session();
        let err = s.run("1 +").unwrap_err();
        assert_eq!(
            err,
            CompileError::StackUnderflow {
                word: "+".to_string(),
                required: 2,
                available: 1,
            }
        );
        assert_eq!(s.stack(), &[Value::Int(1)]);
    }

    #[test]
    fn test_immediate_type_error() {
        let mut s = session();
        let err = s.run("1 \" x\" +").unwrap_err();
        assert!(matches!(err, CompileError::TypeError { position: 2, .. }));
        assert_eq!(s.stack().len(), 2);
    }

    #[test]
    fn test_immediate_position_counts_definition_tokens() {
        let mut s = session();
        // Twelve tokens; the comment is not one of them and `+` is the last
        let err = s
            .run(": one 1 ; extern n ( -- ) \\ comment\n1 \" x\" +")
            .unwrap_err();
        assert!(matches!(err, CompileError::TypeError { position: 11, .. }));
    }

    #[test]
    fn test_definition_then_call() {
        let mut s = session();
        s.run(": square dup * ; 7 square .").unwrap();
        assert_eq!(s.take_output(), "49 ");
        assert_eq!(s.signature("square").unwrap().to_string(), "( i -- i )");
        assert_eq!(s.state(), State::TopLevel);
    }

    #[test]
    fn test_argument_order_follows_stack() {
        let mut s = session();
        s.run(": sub - ; 10 3 sub .").unwrap();
        assert_eq!(s.take_output(), "7 ");
    }

    #[test]
    fn test_unknown_token_in_body() {
        let mut s = session();
        let err = s.run(": f frob ;").unwrap_err();
        assert_eq!(
            err,
            CompileError::UnknownToken {
                name: "frob".to_string()
            }
        );
        // The failed word never becomes visible
        assert!(s.signature("f").is_err());
        s.run("1 .").unwrap();
        assert_eq!(s.take_output(), "1 ");
    }

    #[test]
    fn test_unterminated_definition() {
        let mut s = session();
        let err = s.run(": f 1 2").unwrap_err();
        assert!(matches!(err, CompileError::UnterminatedDefinition { .. }));
        assert_eq!(s.state(), State::TopLevel);
    }

    #[test]
    fn test_nested_definition_rejected() {
        let mut s = session();
        let err = s.run(": f : g ; ;").unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedOperation { .. }));
    }

    #[test]
    fn test_directive_in_body_rejected() {
        let mut s = session();
        assert!(matches!(
            s.run(": f . ;"),
            Err(CompileError::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_extern_declaration() {
        let mut s = session();
        s.run("extern strlen ( s -- i ) \" hello\" strlen .").unwrap();
        assert_eq!(s.take_output(), "5 ");
        assert_eq!(s.signature("strlen").unwrap().to_string(), "( s -- i )");
    }

    #[test]
    fn test_malformed_extern() {
        let mut s = session();
        for source in [
            "extern",
            "extern f i -- i )",
            "extern f ( i i",
            "extern f ( i )",
            "extern f ( q -- )",
        ] {
            assert!(
                matches!(s.run(source), Err(CompileError::ArityError { .. })),
                "{}",
                source
            );
        }
    }

    #[test]
    fn test_self_shadowing_calls_previous_definition() {
        let mut s = session();
        s.run(": f 1 ; : f f 10 + ; f .").unwrap();
        assert_eq!(s.take_output(), "11 ");
    }

    #[test]
    fn test_print_stack_and_words() {
        let mut s = session();
        s.run(": two 2 ; 1 two .s words").unwrap();
        let output = s.take_output();
        assert!(output.starts_with("<2> 1 2\n"));
        assert!(output.contains("two words see inline"));
    }

    #[test]
    fn test_see_prints_trace() {
        let mut s = session();
        s.run(": square dup * ; see square").unwrap();
        let output = s.take_output();
        assert!(output.starts_with(": square ( i -- i )"));
        assert!(output.contains("#1 = dup #0"));
    }

    #[test]
    fn test_inline_directive() {
        let mut s = session();
        s.run(": square dup * ; inline : quad square square ;").unwrap();
        let quad = s.definition("quad").unwrap();
        assert!(quad.body().all(|id| !matches!(
            quad.graph.node(id).kind,
            crate::graph::NodeKind::Call(_)
        )));
        s.run("3 quad .").unwrap();
        assert_eq!(s.take_output(), "81 ");
    }

    #[test]
    fn test_inline_without_definition() {
        let mut s = session();
        assert!(s.run("inline").is_err());
    }

    #[test]
    fn test_trace_definitions() {
        let config = CompilerConfig::new().with_trace_definitions(true);
        let mut s = Session::with_config(VmBackend::new(), config).unwrap();
        s.run(": one 1 ;").unwrap();
        assert!(s.take_output().starts_with(": one ( -- i )"));
    }

    #[test]
    fn test_is_incomplete() {
        assert!(is_incomplete(": f 1"));
        assert!(!is_incomplete(": f 1 ;"));
        assert!(is_incomplete("extern f ( i"));
        assert!(!is_incomplete("extern f ( i -- ) 1 2"));
        assert!(!is_incomplete("1 2 +"));
    }
}
