use std::time::Duration;

/// Longest input line accepted, in bytes.
pub const DEFAULT_MAX_LINE_LEN: usize = 1024;

/// Most tokens a single line may produce.
pub const DEFAULT_MAX_ARGS: usize = 127;

/// Wall-clock bound on a single foreground command.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunables of an [`Interpreter`](crate::Interpreter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    /// Foreground timeout. Rounded down to whole seconds; zero disables it.
    pub timeout: Duration,
    /// Ask the kernel to discard child exit statuses (`SA_NOCLDWAIT`).
    pub auto_reap: bool,
    pub max_line_len: usize,
    pub max_args: usize,
}

impl ShellConfig {
    /// Timeout in the unit `alarm(2)` takes.
    pub fn timeout_secs(&self) -> u32 {
        u32::try_from(self.timeout.as_secs()).unwrap_or(u32::MAX)
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            auto_reap: false,
            max_line_len: DEFAULT_MAX_LINE_LEN,
            max_args: DEFAULT_MAX_ARGS,
        }
    }
}
