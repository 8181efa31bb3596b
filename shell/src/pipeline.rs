use crate::command::{ChildHandle, CommandSpec, ExitCode};
use crate::env::Environment;
use crate::external::{Disposition, LaunchError, Redirects, launch};
use crate::supervisor::{exit_code, wait_for};
use nix::fcntl::OFlag;
use nix::unistd::pipe2;

/// Exit codes of both stages, plus the launch failures that were reported.
///
/// A stage that could not be executed gets the 127/126 code of its failure. A code is
/// `None` when no status could be collected.
#[derive(Debug, Default)]
pub struct PipelineStatus {
    pub producer: Option<ExitCode>,
    pub consumer: Option<ExitCode>,
    pub errors: Vec<LaunchError>,
}

/// The two children of a running pipeline. Lives only inside [`run_pipeline`].
struct PipelineHandle {
    producer: Option<ChildHandle>,
    consumer: Option<ChildHandle>,
}

impl PipelineHandle {
    /// Wait for both stages, in whatever order they finish.
    fn wait(self, status: &mut PipelineStatus) {
        if let Some(child) = self.producer {
            status.producer = wait_stage(&child);
        }
        if let Some(child) = self.consumer {
            status.consumer = wait_stage(&child);
        }
    }
}

fn wait_stage(child: &ChildHandle) -> Option<ExitCode> {
    match wait_for(child.pid()) {
        Ok(status) => status.and_then(exit_code),
        Err(e) => {
            tracing::warn!(pid = %child.pid(), "waiting for pipeline stage failed: {}", e);
            None
        }
    }
}

/// Run `producer | consumer` and return once both have exited.
///
/// The producer's standard output is the write end of one pipe, the consumer's
/// standard input its read end; the shell keeps neither. Pipelines are never subject
/// to the foreground timeout.
///
/// Only a failure to create the pipe or the producer process is returned as `Err`;
/// in that case nothing was started. A stage whose program cannot be executed is
/// recorded in [`PipelineStatus::errors`] and the other stage still runs: a consumer
/// without producer reads end-of-file, a producer without consumer gets `SIGPIPE`.
pub fn run_pipeline(
    producer: &CommandSpec,
    consumer: &CommandSpec,
    env: &Environment,
) -> Result<PipelineStatus, LaunchError> {
    let (read, write) = pipe2(OFlag::O_CLOEXEC).map_err(LaunchError::Pipe)?;
    let mut status = PipelineStatus::default();

    let first = match launch(
        producer,
        env,
        Disposition::Foreground,
        Redirects {
            stdin: None,
            stdout: Some(write),
        },
    ) {
        Ok(child) => Some(child),
        Err(e) if e.is_resource() => return Err(e),
        Err(e) => {
            status.producer = e.exit_code();
            status.errors.push(e);
            None
        }
    };

    let second = match launch(
        consumer,
        env,
        Disposition::Foreground,
        Redirects {
            stdin: Some(read),
            stdout: None,
        },
    ) {
        Ok(child) => Some(child),
        Err(e) => {
            status.consumer = e.exit_code();
            status.errors.push(e);
            None
        }
    };

    tracing::debug!(%producer, %consumer, "pipeline started");
    PipelineHandle {
        producer: first,
        consumer: second,
    }
    .wait(&mut status);
    Ok(status)
}
