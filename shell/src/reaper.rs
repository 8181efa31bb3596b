use crate::command::{ChildHandle, CommandSpec, ExitCode};
use crate::supervisor::exit_code;
use nix::errno::Errno;
use nix::sys::wait::{WaitPidFlag, WaitStatus, waitpid};
use nix::unistd::Pid;

/// A child collected by [`Reaper::sweep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaped {
    pub pid: Pid,
    pub code: Option<ExitCode>,
    /// The background command, or `None` for a child the reaper never adopted.
    pub command: Option<CommandSpec>,
}

/// Owner of background children until they have exited.
///
/// The reaper never signals a child; it only collects the ones that are already gone.
#[derive(Debug, Default)]
pub struct Reaper {
    jobs: Vec<ChildHandle>,
}

impl Reaper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of a background child.
    pub fn adopt(&mut self, child: ChildHandle) {
        tracing::debug!(pid = %child.pid(), command = %child.command(), "adopted background job");
        self.jobs.push(child);
    }

    /// Number of adopted children not reaped yet.
    pub fn outstanding(&self) -> usize {
        self.jobs.len()
    }

    /// Collect every child that has already exited, without blocking.
    pub fn sweep(&mut self) -> Vec<Reaped> {
        let mut reaped = Vec::new();
        loop {
            match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    let Some(pid) = status.pid() else { break };
                    let command = self.release(pid);
                    reaped.push(Reaped {
                        pid,
                        code: exit_code(status),
                        command,
                    });
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => {
                    // No children at all: anything still adopted was discarded by the
                    // kernel (SA_NOCLDWAIT) or collected elsewhere.
                    self.jobs.clear();
                    break;
                }
                Err(e) => {
                    tracing::warn!("background sweep failed: {}", e);
                    break;
                }
            }
        }
        reaped
    }

    fn release(&mut self, pid: Pid) -> Option<CommandSpec> {
        let at = self.jobs.iter().position(|job| job.pid() == pid)?;
        Some(self.jobs.swap_remove(at).command().clone())
    }
}
