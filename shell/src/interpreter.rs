use crate::builtin::Builtins;
use crate::command::{CommandLine, CommandSpec, ExitCode};
use crate::config::ShellConfig;
use crate::env::Environment;
use crate::external::{self, Disposition, Redirects};
use crate::lexer::Lexer;
use crate::parser;
use crate::pipeline::{self, PipelineStatus};
use crate::reaper::Reaper;
use crate::supervisor::{Outcome, Supervisor};
use anyhow::Context;
use nix::unistd::Pid;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::{self, Write};

/// Factory allows creating instances of builtin commands.
///
/// Only supports commands defined in this crate; see [`Builtins`].
pub(crate) struct Factory<T> {
    _phantom: std::marker::PhantomData<T>,
}

impl<T> Default for Factory<T> {
    fn default() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

/// What running one input line amounted to.
#[derive(Debug)]
pub enum LineStatus {
    /// Blank line.
    Empty,
    /// Syntax or limit error; reported, nothing ran.
    Rejected,
    Builtin(ExitCode),
    Foreground(Outcome),
    Background(Pid),
    Pipeline(PipelineStatus),
    /// The program could not be started. `None` for resource errors.
    LaunchFailed(Option<ExitCode>),
}

/// A line-oriented shell: builtins in-process, everything else as child processes.
///
/// Example
/// ```no_run
/// use quash::{Interpreter, ShellConfig};
/// let mut sh = Interpreter::new(ShellConfig::default()).unwrap();
/// sh.execute_line("echo hello world").unwrap();
/// ```
pub struct Interpreter {
    env: Environment,
    config: ShellConfig,
    builtins: Builtins,
    supervisor: Supervisor,
    reaper: Reaper,
}

impl Interpreter {
    /// Create an interpreter over a snapshot of the process environment.
    pub fn new(config: ShellConfig) -> anyhow::Result<Self> {
        Self::with_env(config, Environment::new())
    }

    /// Create an interpreter over the given environment.
    pub fn with_env(config: ShellConfig, env: Environment) -> anyhow::Result<Self> {
        let supervisor = Supervisor::new(config.timeout_secs())
            .context("cannot install the timeout handler")?;
        Ok(Self {
            env,
            config,
            builtins: Builtins::default(),
            supervisor,
            reaper: Reaper::new(),
        })
    }

    /// Set by the `exit` builtin.
    pub fn should_exit(&self) -> bool {
        self.env.should_exit
    }

    /// Background jobs not reaped yet.
    pub fn outstanding_jobs(&self) -> usize {
        self.reaper.outstanding()
    }

    /// Collect finished background jobs without blocking.
    pub fn sweep(&mut self) {
        for job in self.reaper.sweep() {
            match &job.command {
                Some(command) => {
                    tracing::info!(pid = %job.pid, code = ?job.code, %command, "background job finished")
                }
                None => tracing::debug!(pid = %job.pid, code = ?job.code, "reaped stray child"),
            }
        }
    }

    /// Run one input line against the process's standard streams.
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<LineStatus> {
        self.execute_line_with_output(line, &mut io::stdout(), &mut io::stderr())
    }

    /// Run one input line, writing the shell's own output to `out` and its diagnostics
    /// to `err`. Launched programs always inherit the process's streams.
    ///
    /// User errors are reported on `err` and yield `Ok`; `Err` is reserved for
    /// failures of the shell itself (unwritable output, failed wait).
    pub fn execute_line_with_output(
        &mut self,
        line: &str,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> anyhow::Result<LineStatus> {
        let lexed = match Lexer::new(&self.env)
            .with_limits(self.config.max_line_len, self.config.max_args)
            .tokenize(line)
        {
            Ok(lexed) => lexed,
            Err(e) => {
                writeln!(err, "quash: {e}")?;
                return Ok(LineStatus::Rejected);
            }
        };
        for name in &lexed.unset {
            writeln!(err, "quash: warning: environment variable '{name}' not set")?;
        }

        let Some(parsed) = parser::parse(lexed.tokens) else {
            return Ok(LineStatus::Empty);
        };

        if let Some(code) = self
            .builtins
            .dispatch(&parsed.argv(), out, err, &mut self.env)?
        {
            return Ok(LineStatus::Builtin(code));
        }

        let background = parsed.is_background();
        let command_line = match parsed.into_command_line() {
            Ok(command_line) => command_line,
            Err(e) => {
                writeln!(err, "quash: {e}")?;
                return Ok(LineStatus::Rejected);
            }
        };

        out.flush()?;
        match command_line {
            CommandLine::Single(spec) => self.run_single(spec, out, err),
            CommandLine::Pipeline(producer, consumer) => {
                if background {
                    writeln!(
                        err,
                        "quash: warning: pipelines always run in the foreground; ignoring '&'"
                    )?;
                }
                self.run_pipeline(&producer, &consumer, err)
            }
        }
    }

    fn run_single(
        &mut self,
        spec: CommandSpec,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> anyhow::Result<LineStatus> {
        let mode = if spec.is_background() {
            Disposition::Background
        } else {
            Disposition::Foreground
        };
        let child = match external::launch(&spec, &self.env, mode, Redirects::default()) {
            Ok(child) => child,
            Err(e) => {
                writeln!(err, "quash: {e}")?;
                return Ok(LineStatus::LaunchFailed(e.exit_code()));
            }
        };

        if mode == Disposition::Background {
            let pid = child.pid();
            writeln!(out, "[Background job] PID: {pid}")?;
            out.flush()?;
            self.reaper.adopt(child);
            return Ok(LineStatus::Background(pid));
        }

        let outcome = self
            .supervisor
            .supervise(child)
            .context("waiting for the foreground command failed")?;
        match outcome {
            Outcome::TimedOut { pid, after } => {
                tracing::warn!(%pid, after, command = %spec, "foreground command timed out");
                writeln!(err, "quash: process {pid} timed out after {after} seconds")?;
            }
            Outcome::Interrupted => {
                writeln!(out)?;
                out.flush()?;
            }
            Outcome::Completed { code } => {
                tracing::debug!(?code, command = %spec, "foreground command completed");
            }
        }
        Ok(LineStatus::Foreground(outcome))
    }

    fn run_pipeline(
        &mut self,
        producer: &CommandSpec,
        consumer: &CommandSpec,
        err: &mut dyn Write,
    ) -> anyhow::Result<LineStatus> {
        match pipeline::run_pipeline(producer, consumer, &self.env) {
            Ok(status) => {
                for e in &status.errors {
                    writeln!(err, "quash: {e}")?;
                }
                Ok(LineStatus::Pipeline(status))
            }
            Err(e) => {
                writeln!(err, "quash: {e}")?;
                Ok(LineStatus::LaunchFailed(e.exit_code()))
            }
        }
    }

    /// `<cwd>> `
    pub fn prompt(&self) -> String {
        format!("{}> ", self.env.current_dir.display())
    }

    /// Read-Eval-Print Loop until end-of-input or `exit`.
    ///
    /// Finished background jobs are collected before every prompt. Ctrl-C at the
    /// prompt just asks again.
    pub fn repl(&mut self) -> anyhow::Result<()> {
        let mut rl = DefaultEditor::new()?;

        while !self.should_exit() {
            self.sweep();
            match rl.readline(&self.prompt()) {
                Ok(line) => {
                    if !line.trim().is_empty() {
                        let _ = rl.add_history_entry(line.as_str());
                    }
                    if let Err(e) = self.execute_line(&line) {
                        eprintln!("quash: {e:#}");
                    }
                }
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Io(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(ReadlineError::Eof) => {
                    println!("exit");
                    break;
                }
                Err(e) => return Err(e).context("reading input failed"),
            }
        }
        Ok(())
    }
}
