//! Word dictionary
//!
//! An append-only list of words. Lookup scans from the newest entry
//! backward and returns the first visible match, so a redefinition shadows
//! the old word while code compiled against the old one keeps calling it.
//! Nothing is ever removed.

use crate::builtins::{BUILTIN_WORDS, Builtin};
use crate::definition::FunctionDefinition;
use crate::error::{CompileError, CompileResult};
use crate::types::Signature;
use std::fmt;

/// Position of a word in its dictionary. Stable for the dictionary's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WordId(pub usize);

#[derive(Debug, Clone)]
pub enum WordKind {
    Builtin(Builtin),
    /// A finished colon definition
    Compiled(FunctionDefinition),
    /// Declared signature with an external implementation
    Extern { signature: Signature, symbol: String },
    /// Placeholder for a definition still being parsed
    Pending,
}

#[derive(Debug, Clone)]
pub struct Word {
    pub name: String,
    pub kind: WordKind,
    /// Spliced into callers instead of called
    pub inline: bool,
    /// Skipped by lookup
    pub hidden: bool,
}

impl Word {
    pub fn builtin(name: &str, builtin: Builtin) -> Self {
        Word {
            name: name.to_string(),
            kind: WordKind::Builtin(builtin),
            inline: true,
            hidden: false,
        }
    }

    pub fn external(name: &str, symbol: &str, signature: Signature) -> Self {
        Word {
            name: name.to_string(),
            kind: WordKind::Extern {
                signature,
                symbol: symbol.to_string(),
            },
            inline: false,
            hidden: false,
        }
    }

    pub fn pending(name: &str) -> Self {
        Word {
            name: name.to_string(),
            kind: WordKind::Pending,
            inline: false,
            hidden: true,
        }
    }

    /// Declared or inferred signature of a callable user word
    pub fn signature(&self) -> CompileResult<Signature> {
        match &self.kind {
            WordKind::Compiled(definition) => definition.signature(),
            WordKind::Extern { signature, .. } => Ok(signature.clone()),
            WordKind::Builtin(_) | WordKind::Pending => Err(CompileError::UnsupportedOperation {
                operation: format!("`{}' has no fixed signature", self.name),
            }),
        }
    }

    pub fn is_builtin(&self) -> bool {
        matches!(self.kind, WordKind::Builtin(_))
    }
}

impl fmt::Display for Word {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            WordKind::Builtin(_) => write!(f, "{} (builtin)", self.name),
            WordKind::Compiled(definition) => {
                write!(f, "{}", definition)?;
                if self.inline {
                    write!(f, " inline")?;
                }
                Ok(())
            }
            WordKind::Extern { signature, symbol } if *symbol == self.name => {
                write!(f, "extern {} {}", self.name, signature)
            }
            WordKind::Extern { signature, symbol } => {
                write!(f, "extern {} {} \\ {}", self.name, signature, symbol)
            }
            WordKind::Pending => write!(f, ": {} ...", self.name),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    words: Vec<Word>,
}

impl Dictionary {
    /// A dictionary with no words at all
    pub fn new() -> Self {
        Dictionary::default()
    }

    /// A dictionary preloaded with every built-in word
    pub fn with_builtins() -> Self {
        let mut dictionary = Dictionary::new();
        for (name, builtin) in BUILTIN_WORDS {
            dictionary.define(Word::builtin(name, *builtin));
        }
        dictionary
    }

    pub fn define(&mut self, word: Word) -> WordId {
        self.words.push(word);
        WordId(self.words.len() - 1)
    }

    /// Newest visible word with this name
    pub fn find(&self, name: &str) -> Option<WordId> {
        self.words
            .iter()
            .rposition(|word| !word.hidden && word.name == name)
            .map(WordId)
    }

    pub fn get(&self, id: WordId) -> &Word {
        &self.words[id.0]
    }

    pub fn get_mut(&mut self, id: WordId) -> &mut Word {
        &mut self.words[id.0]
    }

    pub fn hide(&mut self, id: WordId) {
        self.words[id.0].hidden = true;
    }

    pub fn unhide(&mut self, id: WordId) {
        self.words[id.0].hidden = false;
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Visible words, newest first
    pub fn visible(&self) -> impl Iterator<Item = (WordId, &Word)> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, word)| !word.hidden)
            .map(|(i, word)| (WordId(i), word))
    }

    /// The most recent visible colon definition
    pub fn latest_definition(&self) -> Option<WordId> {
        self.visible()
            .find(|(_, word)| matches!(word.kind, WordKind::Compiled(_)))
            .map(|(id, _)| id)
    }
}
