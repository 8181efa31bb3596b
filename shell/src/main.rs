//! quash entry point.
//!
//! Usage:
//!   quash                      # Interactive shell
//!   quash -c <line>            # Run one line and exit with its status
//!   quash --timeout 5          # Foreground commands get 5 seconds instead of 10

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use argh::FromArgs;
use quash::supervisor::Outcome;
use quash::{Interpreter, LineStatus, ShellConfig, signals};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// A small shell with foreground timeouts, background jobs and two-stage pipelines.
#[derive(FromArgs)]
struct Args {
    /// seconds a foreground command may run before it is killed (0 disables)
    #[argh(option, default = "10")]
    timeout: u64,

    /// let the kernel discard exit statuses of finished children (SA_NOCLDWAIT); off by
    /// default because it also hides foreground statuses, so Ctrl-C is not detected
    #[argh(switch)]
    auto_reap: bool,

    /// run a single line instead of reading input
    #[argh(option, short = 'c')]
    command: Option<String>,
}

fn main() -> ExitCode {
    // Respects RUST_LOG; stdout belongs to the commands.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let args: Args = argh::from_env();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("quash: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = ShellConfig {
        timeout: Duration::from_secs(args.timeout),
        auto_reap: args.auto_reap,
        ..ShellConfig::default()
    };
    signals::install(config.auto_reap).context("cannot install signal handlers")?;

    let mut shell = Interpreter::new(config)?;
    match args.command {
        Some(line) => {
            let status = shell.execute_line(&line)?;
            Ok(ExitCode::from(status_byte(&status)))
        }
        None => {
            shell.repl()?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The conventional shell status of a line, truncated to a byte.
fn status_byte(status: &LineStatus) -> u8 {
    let code = match status {
        LineStatus::Empty | LineStatus::Background(_) => 0,
        LineStatus::Rejected => 2,
        LineStatus::Builtin(code) => *code,
        LineStatus::Foreground(Outcome::Completed { code }) => code.unwrap_or(0),
        LineStatus::Foreground(Outcome::TimedOut { .. }) => 128 + libc::SIGKILL,
        LineStatus::Foreground(Outcome::Interrupted) => 128 + libc::SIGINT,
        LineStatus::Pipeline(pipeline) => pipeline.consumer.unwrap_or(1),
        LineStatus::LaunchFailed(code) => code.unwrap_or(1),
    };
    (code & 0xff) as u8
}
