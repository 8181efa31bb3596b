use crate::command::{ChildHandle, CommandSpec, EXIT_NOT_EXECUTABLE, EXIT_NOT_FOUND, ExitCode};
use crate::env::Environment;
use nix::sys::signal::{SigHandler, Signal, signal};
use nix::unistd::{Pid, alarm};
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Whether the launched program is going to be waited for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Supervised by the shell; gets the default `SIGINT` action so Ctrl-C reaches it.
    Foreground,
    /// Left running; keeps the shell's ignored `SIGINT`.
    Background,
}

/// Stream rewiring for a child. `None` means inherit the shell's stream.
///
/// The descriptors are consumed by [`launch`]: the shell's copies are closed as soon
/// as the child has been created, whether or not that succeeded.
#[derive(Debug, Default)]
pub struct Redirects {
    pub stdin: Option<OwnedFd>,
    pub stdout: Option<OwnedFd>,
}

/// Why a command could not be started.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// No such program.
    #[error("{program}: command not found")]
    NotFound { program: String },
    /// The program exists but the kernel refused to run it.
    #[error("{program}: {source}")]
    NotExecutable {
        program: String,
        #[source]
        source: io::Error,
    },
    /// The process itself could not be created.
    #[error("cannot create process for {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    /// The pipe between two pipeline stages could not be created.
    #[error("cannot create pipe: {0}")]
    Pipe(#[source] nix::errno::Errno),
}

impl LaunchError {
    /// The status a shell reports for this failure; `None` for resource errors,
    /// where no command ran at all.
    pub fn exit_code(&self) -> Option<ExitCode> {
        match self {
            LaunchError::NotFound { .. } => Some(EXIT_NOT_FOUND),
            LaunchError::NotExecutable { .. } => Some(EXIT_NOT_EXECUTABLE),
            LaunchError::Spawn { .. } | LaunchError::Pipe(_) => None,
        }
    }

    /// Resource exhaustion rather than a problem with the program.
    pub fn is_resource(&self) -> bool {
        self.exit_code().is_none()
    }

    fn from_spawn(program: &str, source: io::Error) -> Self {
        let program = program.to_string();
        match source.raw_os_error() {
            Some(libc::ENOENT) | Some(libc::ENOTDIR) => LaunchError::NotFound { program },
            Some(libc::EAGAIN) | Some(libc::ENOMEM) => LaunchError::Spawn { program, source },
            _ if source.kind() == io::ErrorKind::NotFound => LaunchError::NotFound { program },
            _ => LaunchError::NotExecutable { program, source },
        }
    }
}

/// Start `spec` as a child process.
///
/// The child sees exactly the variables and working directory of `env`. Before the
/// program image is replaced it cancels any inherited alarm and restores the default
/// `SIGALRM` and `SIGCHLD` actions; foreground children also get the default `SIGINT`
/// action back. If the program cannot be executed the child never runs any shell
/// code: the failure comes back as a [`LaunchError`] carrying the 127/126 status.
pub fn launch(
    spec: &CommandSpec,
    env: &Environment,
    mode: Disposition,
    redirects: Redirects,
) -> Result<ChildHandle, LaunchError> {
    let mut cmd = Command::new(spec.program());
    cmd.args(spec.args())
        .env_clear()
        .envs(&env.vars)
        .envs(&env.raw)
        .current_dir(&env.current_dir);
    if let Some(fd) = redirects.stdin {
        cmd.stdin(Stdio::from(fd));
    }
    if let Some(fd) = redirects.stdout {
        cmd.stdout(Stdio::from(fd));
    }

    let foreground = mode == Disposition::Foreground;
    // SAFETY: runs between fork and exec and only makes async-signal-safe calls.
    unsafe {
        cmd.pre_exec(move || reset_inherited_signals(foreground));
    }

    let child = cmd
        .spawn()
        .map_err(|e| LaunchError::from_spawn(spec.program(), e))?;
    let pid = Pid::from_raw(child.id() as libc::pid_t);
    tracing::debug!(%pid, ?mode, command = %spec, "launched");
    Ok(ChildHandle::new(pid, spec.clone()))
}

fn reset_inherited_signals(foreground: bool) -> io::Result<()> {
    alarm::cancel();
    // SAFETY: SIG_DFL installs no handler code.
    unsafe {
        signal(Signal::SIGALRM, SigHandler::SigDfl)?;
        signal(Signal::SIGCHLD, SigHandler::SigDfl)?;
        if foreground {
            signal(Signal::SIGINT, SigHandler::SigDfl)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::{exit_code, wait_for};
    use crate::test_support::process_lock;
    use nix::fcntl::OFlag;
    use nix::unistd::pipe2;
    use std::fs::{self, File};
    use std::io::Read;

    fn spec(words: &[&str]) -> CommandSpec {
        CommandSpec::new(words.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    /// Run `words` with stdout captured through a pipe; returns (output, exit code).
    fn capture(words: &[&str], env: &Environment, mode: Disposition) -> (String, Option<ExitCode>) {
        let (read, write) = pipe2(OFlag::O_CLOEXEC).unwrap();
        let child = launch(
            &spec(words),
            env,
            mode,
            Redirects {
                stdin: None,
                stdout: Some(write),
            },
        )
        .unwrap();
        let mut out = String::new();
        File::from(read).read_to_string(&mut out).unwrap();
        let status = wait_for(child.pid()).unwrap();
        (out, status.and_then(exit_code))
    }

    fn sigint_ignored(status: &str) -> bool {
        let mask = status
            .lines()
            .find_map(|l| l.strip_prefix("SigIgn:"))
            .map(|hex| u64::from_str_radix(hex.trim(), 16).unwrap())
            .unwrap();
        mask & (1 << (Signal::SIGINT as u64 - 1)) != 0
    }

    #[test]
    fn test_launch_and_collect_status() {
        let _lock = process_lock();
        let child = launch(
            &spec(&["sh", "-c", "exit 4"]),
            &Environment::new(),
            Disposition::Foreground,
            Redirects::default(),
        )
        .unwrap();
        assert_eq!(child.command().program(), "sh");
        let status = wait_for(child.pid()).unwrap();
        assert_eq!(status.and_then(exit_code), Some(4));
    }

    #[test]
    fn test_missing_program_is_not_found() {
        let _lock = process_lock();
        let err = launch(
            &spec(&["definitely-not-a-real-program-4711"]),
            &Environment::new(),
            Disposition::Foreground,
            Redirects::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LaunchError::NotFound { .. }));
        assert_eq!(err.exit_code(), Some(127));
        assert!(!err.is_resource());
        assert_eq!(
            err.to_string(),
            "definitely-not-a-real-program-4711: command not found"
        );
    }

    #[test]
    fn test_non_executable_file_has_distinct_code() {
        let _lock = process_lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("script");
        fs::write(&path, "#!/bin/sh\necho hi\n").unwrap();

        let err = launch(
            &spec(&[path.to_str().unwrap()]),
            &Environment::new(),
            Disposition::Foreground,
            Redirects::default(),
        )
        .unwrap_err();
        assert!(matches!(err, LaunchError::NotExecutable { .. }));
        assert_eq!(err.exit_code(), Some(126));
    }

    #[test]
    fn test_child_sees_interpreter_environment() {
        let _lock = process_lock();
        let mut env = Environment::new();
        env.set_var("QUASH_TEST_MARKER", "present");
        let dir = tempfile::tempdir().unwrap();
        env.current_dir = fs::canonicalize(dir.path()).unwrap();

        let (out, code) = capture(
            &["sh", "-c", "echo $QUASH_TEST_MARKER; pwd"],
            &env,
            Disposition::Foreground,
        );

        assert_eq!(code, Some(0));
        assert_eq!(out, format!("present\n{}\n", env.current_dir.display()));
    }

    #[test]
    fn test_child_keeps_non_utf8_variables() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let _lock = process_lock();
        let mut env = Environment::new();
        env.raw.insert(
            OsString::from("QUASH_RAW_MARKER"),
            OsString::from_vec(vec![b'v', 0xff]),
        );

        let (_, code) = capture(
            &["sh", "-c", "test -n \"$QUASH_RAW_MARKER\""],
            &env,
            Disposition::Foreground,
        );

        assert_eq!(code, Some(0));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_only_foreground_children_get_default_sigint() {
        let _lock = process_lock();
        // Behave like the interactive shell for the duration of the test.
        unsafe { signal(Signal::SIGINT, SigHandler::SigIgn) }.unwrap();
        let env = Environment::new();

        let (fg, _) = capture(&["cat", "/proc/self/status"], &env, Disposition::Foreground);
        let (bg, _) = capture(&["cat", "/proc/self/status"], &env, Disposition::Background);

        unsafe { signal(Signal::SIGINT, SigHandler::SigDfl) }.unwrap();
        assert!(!sigint_ignored(&fg));
        assert!(sigint_ignored(&bg));
    }

    #[test]
    fn test_pending_alarm_is_not_inherited() {
        let _lock = process_lock();
        crate::signals::install_timeout_handler().unwrap();
        alarm::set(1);
        // Would be killed by SIGALRM after one second if the countdown leaked.
        let (out, code) = capture(
            &["sh", "-c", "sleep 2; echo survived"],
            &Environment::new(),
            Disposition::Foreground,
        );
        alarm::cancel();
        assert_eq!(code, Some(0));
        assert_eq!(out, "survived\n");
    }
}
