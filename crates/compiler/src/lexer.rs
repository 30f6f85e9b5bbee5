//! Token stream for llforth source
//!
//! Tokens are whitespace-delimited. Comments are whole words:
//! `\` runs to the end of the line, `(` runs to the next `)` word and
//! `(*` to the next `*)` word.
//!
//! A string literal starts with `"`. One delimiter space after the opening
//! quote is skipped, then the text runs to the next `"`:
//! ```text
//! " hello world"   \ the string `hello world`
//! ```
//!
//! Line and column numbers are 1-based.

use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Word,
    Integer(i32),
    Float(f32),
    Str(String),
}

/// A token with its source position
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

impl Token {
    /// A token that carries a literal value rather than naming a word
    pub fn is_literal(&self) -> bool {
        !matches!(self.kind, TokenKind::Word)
    }
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    /// Tokens handed out so far; comments are not counted
    consumed: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 1,
            column: 1,
            consumed: 0,
        }
    }

    /// Next token after skipping comments. `None` at end of input.
    pub fn next_token(&mut self) -> CompileResult<Option<Token>> {
        loop {
            self.skip_whitespace();
            if self.peek() == Some('"') {
                let token = self.read_string()?;
                self.consumed += 1;
                return Ok(Some(token));
            }
            let Some(token) = self.read_word() else {
                return Ok(None);
            };
            match token.text.as_str() {
                "\\" => self.skip_line(),
                "(" => self.skip_until(")"),
                "(*" => self.skip_until("*)"),
                _ => {
                    self.consumed += 1;
                    return Ok(Some(token));
                }
            }
        }
    }

    /// Next raw whitespace-delimited word, with no comment handling
    pub fn next_word(&mut self) -> Option<Token> {
        let token = self.read_word()?;
        self.consumed += 1;
        Some(token)
    }

    /// Index the next token will have in the stream
    pub fn tokens_consumed(&self) -> usize {
        self.consumed
    }

    fn read_word(&mut self) -> Option<Token> {
        self.skip_whitespace();
        let (line, column) = (self.line, self.column);
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                break;
            }
            text.push(c);
            self.advance();
        }
        if text.is_empty() {
            return None;
        }
        let kind = classify(&text);
        Some(Token {
            text,
            kind,
            line,
            column,
        })
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn skip_line(&mut self) {
        while let Some(c) = self.advance() {
            if c == '\n' {
                break;
            }
        }
    }

    /// An unclosed comment swallows the rest of the input
    fn skip_until(&mut self, close: &str) {
        while let Some(word) = self.read_word() {
            if word.text == close {
                break;
            }
        }
    }

    fn read_string(&mut self) -> CompileResult<Token> {
        let (line, column) = (self.line, self.column);
        self.advance();
        if self.peek().is_some_and(char::is_whitespace) {
            self.advance();
        }
        let mut text = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some(c) => text.push(c),
                None => return Err(CompileError::UnterminatedString { line }),
            }
        }
        Ok(Token {
            text: format!("\"{}\"", text),
            kind: TokenKind::Str(text),
            line,
            column,
        })
    }
}

impl Iterator for Lexer {
    type Item = CompileResult<Token>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_token().transpose()
    }
}

/// Decide whether a word is a numeric literal
fn classify(text: &str) -> TokenKind {
    if let Some(n) = parse_integer(text) {
        return TokenKind::Integer(n);
    }
    if is_float_literal(text)
        && let Ok(x) = text.parse::<f32>()
    {
        return TokenKind::Float(x);
    }
    TokenKind::Word
}

fn parse_integer(text: &str) -> Option<i32> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
        digits.parse::<i64>().ok()?
    } else {
        return None;
    };
    let value = if negative { -magnitude } else { magnitude };
    i32::try_from(value).ok()
}

/// Float literals need a digit plus a decimal point or an exponent, so
/// words like `.`, `+.` and `/.` stay words.
fn is_float_literal(text: &str) -> bool {
    let s = text.strip_prefix('-').unwrap_or(text);
    s.bytes().any(|b| b.is_ascii_digit()) && (s.contains('.') || s.contains(['e', 'E']))
}
