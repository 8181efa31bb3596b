//! quash, a small line-oriented shell.
//!
//! Each input line is tokenized (with `$NAME` expansion), then either handled by a
//! builtin inside the shell or run as external programs: a single foreground command
//! under a wall-clock timeout, a background command collected later by the reaper, or
//! a two-stage `producer | consumer` pipeline.
//!
//! The main entry point is [`Interpreter`]. The lower layers are public so the pieces
//! (launching, supervising, reaping) can be driven on their own.

pub mod builtin;
pub mod command;
pub mod config;
pub mod env;
pub mod external;
mod interpreter;
pub mod lexer;
pub mod parser;
pub mod pipeline;
pub mod reaper;
pub mod signals;
pub mod supervisor;

pub use config::ShellConfig;
pub use interpreter::{Interpreter, LineStatus};
