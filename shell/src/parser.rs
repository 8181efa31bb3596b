//! Turns the tokens of one line into something the interpreter can run.
//!
//! Parsing happens in two steps so that built-ins see the line the way the user typed it:
//! [`parse`] only strips the trailing background marker, and
//! [`ParsedLine::into_command_line`] validates the pipe separator afterwards, once the
//! line is known not to be a built-in.

use crate::command::{CommandLine, CommandSpec};
use crate::lexer::Token;
use thiserror::Error;

/// Errors that can occur when a line is turned into a [`CommandLine`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// The line held nothing but the background marker.
    #[error("syntax error: nothing to run in the background")]
    EmptyCommand,
    /// A `|` with no command on one of its sides (e.g. `| wc` or `ls |`).
    #[error("invalid pipe command format")]
    InvalidPipe,
    /// More than one `|`; only two-stage pipelines are supported.
    #[error("only two-stage pipelines are supported")]
    TooManyStages,
}

/// A tokenized line with the background marker already stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    tokens: Vec<Token>,
    background: bool,
}

impl ParsedLine {
    /// Whether the line ended with a lone `&`.
    pub fn is_background(&self) -> bool {
        self.background
    }

    /// Every remaining token as a plain string; a pipe renders as `|`.
    pub fn argv(&self) -> Vec<String> {
        self.tokens.iter().map(|t| t.as_str().to_string()).collect()
    }

    /// Split the line at its pipe separator, if any.
    ///
    /// A pipe in first position is rejected explicitly, as is a trailing one.
    pub fn into_command_line(self) -> Result<CommandLine, ParseError> {
        let pipes: Vec<usize> = self
            .tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == Token::Pipe)
            .map(|(i, _)| i)
            .collect();

        match pipes.as_slice() {
            [] => {
                let spec = CommandSpec::new(words(&self.tokens)).ok_or(ParseError::EmptyCommand)?;
                Ok(CommandLine::Single(if self.background {
                    spec.in_background()
                } else {
                    spec
                }))
            }
            [at] => {
                let (left, right) = self.tokens.split_at(*at);
                let producer = CommandSpec::new(words(left)).ok_or(ParseError::InvalidPipe)?;
                let consumer = CommandSpec::new(words(&right[1..])).ok_or(ParseError::InvalidPipe)?;
                Ok(CommandLine::Pipeline(producer, consumer))
            }
            _ => Err(ParseError::TooManyStages),
        }
    }
}

fn words(tokens: &[Token]) -> Vec<String> {
    tokens.iter().map(|t| t.as_str().to_string()).collect()
}

/// Strip a trailing background marker. Returns `None` for an empty line.
///
/// A `&` anywhere but the end is an ordinary argument.
pub fn parse(mut tokens: Vec<Token>) -> Option<ParsedLine> {
    if tokens.is_empty() {
        return None;
    }
    let background = tokens.last() == Some(&Token::Ampersand);
    if background {
        tokens.pop();
    }
    Some(ParsedLine { tokens, background })
}
