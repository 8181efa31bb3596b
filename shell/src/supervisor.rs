//! Foreground supervision: wait for the one foreground child, bounded by a timeout.
//!
//! The timeout is an `alarm(2)` countdown. When it expires, [`on_alarm`] runs in signal
//! context, looks up the foreground pid in [`FOREGROUND`] and kills exactly that process.
//! The slot is made of atomics only, so the handler never locks or allocates.

use crate::command::{ChildHandle, ExitCode};
use crate::signals;
use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::{Pid, alarm};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// The single piece of state shared between the main flow and the `SIGALRM` handler.
#[derive(Debug)]
pub struct ForegroundSlot {
    pid: AtomicI32,
    fired: AtomicBool,
    armed: AtomicBool,
}

/// Process-wide foreground slot. There is only ever one timer per process.
pub static FOREGROUND: ForegroundSlot = ForegroundSlot::new();

impl ForegroundSlot {
    const fn new() -> Self {
        Self {
            pid: AtomicI32::new(0),
            fired: AtomicBool::new(false),
            armed: AtomicBool::new(false),
        }
    }

    /// Record `pid` as the foreground child and start the countdown.
    /// A zero `timeout_secs` records the pid without starting a timer.
    fn arm(&self, pid: Pid, timeout_secs: u32) {
        debug_assert_eq!(
            self.pid.load(Ordering::SeqCst),
            0,
            "a foreground child is already being supervised"
        );
        self.fired.store(false, Ordering::SeqCst);
        self.pid.store(pid.as_raw(), Ordering::SeqCst);
        if timeout_secs > 0 {
            self.armed.store(true, Ordering::SeqCst);
            alarm::set(timeout_secs);
        }
    }

    /// Cancel the countdown, then forget the pid. Returns whether the timer fired.
    fn disarm(&self) -> bool {
        alarm::cancel();
        self.armed.store(false, Ordering::SeqCst);
        self.pid.store(0, Ordering::SeqCst);
        self.fired.swap(false, Ordering::SeqCst)
    }

    fn fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// The pid currently under supervision, if any.
    pub fn current(&self) -> Option<Pid> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(Pid::from_raw(pid)),
        }
    }

    /// Whether a countdown is running.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

/// `SIGALRM` handler.
///
/// Runs in signal context: reads the slot and sends `SIGKILL`, nothing else. A child
/// that already exited makes `kill` fail with `ESRCH`, which is fine.
pub(crate) extern "C" fn on_alarm(_signum: libc::c_int) {
    let pid = FOREGROUND.pid.load(Ordering::SeqCst);
    if pid > 0 {
        FOREGROUND.fired.store(true, Ordering::SeqCst);
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

/// How a supervised foreground command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The child exited on its own, or was killed by a signal other than `SIGINT`.
    /// `code` is `None` when the status could not be collected (auto-reap).
    Completed { code: Option<ExitCode> },
    /// The timer fired first and the child was killed.
    TimedOut { pid: Pid, after: u32 },
    /// The child was terminated by `SIGINT`.
    Interrupted,
}

/// Waits on foreground children, one at a time.
#[derive(Debug)]
pub struct Supervisor {
    timeout_secs: u32,
}

impl Supervisor {
    /// Installs the `SIGALRM` handler if it is not in place yet.
    pub fn new(timeout_secs: u32) -> nix::Result<Self> {
        signals::install_timeout_handler()?;
        Ok(Self { timeout_secs })
    }

    /// Arm the timer for `child`, block until it is gone, then disarm.
    ///
    /// The timer is cancelled and the slot cleared on every path, errors included.
    pub fn supervise(&self, child: ChildHandle) -> nix::Result<Outcome> {
        let pid = child.pid();
        FOREGROUND.arm(pid, self.timeout_secs);
        tracing::debug!(%pid, command = %child.command(), timeout = self.timeout_secs, "supervising");

        let waited = wait_foreground(pid);
        let fired = FOREGROUND.disarm();
        let status = waited?;

        let outcome = match status {
            Some(WaitStatus::Signaled(_, Signal::SIGINT, _)) => Outcome::Interrupted,
            Some(WaitStatus::Exited(_, code)) => Outcome::Completed { code: Some(code) },
            _ if fired => Outcome::TimedOut {
                pid,
                after: self.timeout_secs,
            },
            status => Outcome::Completed {
                code: status.and_then(exit_code),
            },
        };
        tracing::debug!(%pid, ?outcome, "foreground child finished");
        Ok(outcome)
    }
}

fn wait_foreground(pid: Pid) -> nix::Result<Option<WaitStatus>> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => return Ok(Some(status)),
            Err(Errno::EINTR) if FOREGROUND.fired() => return reap_killed(pid),
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

/// Follow-up reap after the timer killed `pid`.
///
/// `kill` does not reap, and `SIGKILL` delivery is asynchronous: if the child is not a
/// zombie yet, block until it is. It cannot survive `SIGKILL`, so this is short.
fn reap_killed(pid: Pid) -> nix::Result<Option<WaitStatus>> {
    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        Ok(WaitStatus::StillAlive) | Err(Errno::EINTR) => wait_for(pid),
        Ok(status) => Ok(Some(status)),
        Err(Errno::ECHILD) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Block until `pid` exits, retrying interrupted waits.
///
/// `Ok(None)` means the kernel already discarded the status (`SA_NOCLDWAIT`).
pub(crate) fn wait_for(pid: Pid) -> nix::Result<Option<WaitStatus>> {
    loop {
        match waitpid(pid, None) {
            Ok(status) => return Ok(Some(status)),
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
}

/// Shell-style exit code for a wait status: the exit code, or `128 + signal`.
pub fn exit_code(status: WaitStatus) -> Option<ExitCode> {
    match status {
        WaitStatus::Exited(_, code) => Some(code),
        WaitStatus::Signaled(_, signal, _) => Some(128 + signal as i32),
        _ => None,
    }
}
