use nix::unistd::Pid;
use std::fmt;

/// Conventional process exit code type used by this crate.
///
/// A value of 0 indicates success; any non-zero value indicates failure.
/// Children killed by a signal are reported as `128 + signal`, the way POSIX shells do.
pub type ExitCode = i32;

/// Exit code reported when the program to launch could not be found.
pub const EXIT_NOT_FOUND: ExitCode = 127;

/// Exit code reported when the program exists but could not be executed.
pub const EXIT_NOT_EXECUTABLE: ExitCode = 126;

/// One program invocation: the program name followed by its arguments.
///
/// The argument list is fixed at construction time; there is no way to mutate it
/// afterwards, and the program name is guaranteed to be non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<String>,
    background: bool,
}

impl CommandSpec {
    /// Build a foreground command. Returns `None` when `argv` is empty or its
    /// first element is the empty string.
    pub fn new(argv: Vec<String>) -> Option<Self> {
        match argv.first() {
            Some(name) if !name.is_empty() => Some(Self {
                argv,
                background: false,
            }),
            _ => None,
        }
    }

    /// Same command, marked to run without being waited for.
    pub fn in_background(mut self) -> Self {
        self.background = true;
        self
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    pub fn is_background(&self) -> bool {
        self.background
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// What a non-builtin input line asks the shell to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    /// A single program, in the foreground or the background.
    Single(CommandSpec),
    /// `producer | consumer`.
    Pipeline(CommandSpec, CommandSpec),
}

/// A launched child process together with the command that produced it.
///
/// Whoever holds the handle is responsible for reaping the child.
#[derive(Debug, Clone)]
pub struct ChildHandle {
    pid: Pid,
    command: CommandSpec,
}

impl ChildHandle {
    pub(crate) fn new(pid: Pid, command: CommandSpec) -> Self {
        Self { pid, command }
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn command(&self) -> &CommandSpec {
        &self.command
    }
}
