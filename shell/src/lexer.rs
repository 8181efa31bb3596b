//! A module implementing lexical analysis (tokenization) for the shell's line grammar.
//!
//! Tokens are separated by spaces, tabs, carriage returns and newlines. There is no
//! quoting: a word is every run of non-delimiter characters. Variable references are
//! expanded here, so `$NAME` takes the value the variable has at the moment the line
//! is read, not when the program is launched.

use crate::config::{DEFAULT_MAX_ARGS, DEFAULT_MAX_LINE_LEN};
use crate::env::Environment;
use thiserror::Error;

const DELIMITERS: &[char] = &[' ', '\t', '\r', '\n'];

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// A plain argument. Words produced by `$NAME` expansion are always plain,
    /// even when the value happens to be `|` or `&`.
    Word(String),
    /// A lone `|`.
    Pipe,
    /// A lone `&`. Only meaningful as the last token of a line.
    Ampersand,
}

impl Token {
    /// The text of the token as it would be passed to a program.
    pub fn as_str(&self) -> &str {
        match self {
            Token::Word(w) => w,
            Token::Pipe => "|",
            Token::Ampersand => "&",
        }
    }
}

/// The outcome of tokenizing one line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Lexed {
    /// Tokens in input order.
    pub tokens: Vec<Token>,
    /// Names referenced with `$NAME` that had no value; they produced no token.
    pub unset: Vec<String>,
}

/// Errors that can occur during the lexical analysis process.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexingError {
    /// The line is longer than the configured maximum.
    #[error("input line too long ({len} bytes, limit is {max})")]
    LineTooLong { len: usize, max: usize },
    /// The line splits into more tokens than the configured maximum.
    #[error("too many arguments (limit is {max})")]
    TooManyTokens { max: usize },
}

/// Splits lines into tokens, expanding variables against an [`Environment`].
pub struct Lexer<'a> {
    env: &'a Environment,
    max_line_len: usize,
    max_tokens: usize,
}

impl<'a> Lexer<'a> {
    /// Creates a lexer with the default limits.
    ///
    /// # Arguments
    /// * `env` - The environment `$NAME` references are resolved against.
    pub fn new(env: &'a Environment) -> Self {
        Self {
            env,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_tokens: DEFAULT_MAX_ARGS,
        }
    }

    /// Overrides the line length and token count limits.
    pub fn with_limits(mut self, max_line_len: usize, max_tokens: usize) -> Self {
        self.max_line_len = max_line_len;
        self.max_tokens = max_tokens;
        self
    }

    /// Performs lexical analysis on one input line.
    ///
    /// A trailing line terminator does not count towards the length limit.
    ///
    /// # Returns
    /// A `Result<Lexed, LexingError>`: the tokens plus the names of unset variables on
    /// success, or a `LexingError` if a limit is exceeded. Limits are never enforced by
    /// silently dropping input.
    pub fn tokenize(&self, line: &str) -> Result<Lexed, LexingError> {
        let content = line.trim_end_matches(['\r', '\n']);
        if content.len() > self.max_line_len {
            return Err(LexingError::LineTooLong {
                len: content.len(),
                max: self.max_line_len,
            });
        }

        let mut lexed = Lexed::default();
        for raw in content.split(DELIMITERS).filter(|w| !w.is_empty()) {
            let token = match raw {
                "|" => Token::Pipe,
                "&" => Token::Ampersand,
                _ => match raw.strip_prefix('$') {
                    Some(name) => match self.env.get_var(name) {
                        Some(value) => Token::Word(value.to_string()),
                        None => {
                            lexed.unset.push(name.to_string());
                            continue;
                        }
                    },
                    None => Token::Word(raw.to_string()),
                },
            };
            if lexed.tokens.len() == self.max_tokens {
                return Err(LexingError::TooManyTokens {
                    max: self.max_tokens,
                });
            }
            lexed.tokens.push(token);
        }
        Ok(lexed)
    }
}
