//! Signal dispositions of the shell process itself.

use crate::supervisor;
use nix::sys::signal::{SaFlags, SigAction, SigHandler, SigSet, Signal, sigaction};
use std::sync::Once;

static TIMEOUT_HANDLER: Once = Once::new();

/// Install the `SIGALRM` handler that enforces the foreground timeout.
///
/// No `SA_RESTART`: a pending `waitpid` must fail with `EINTR` when the timer fires.
/// Safe to call any number of times; only the first call installs.
pub fn install_timeout_handler() -> nix::Result<()> {
    let mut result = Ok(());
    TIMEOUT_HANDLER.call_once(|| {
        let action = SigAction::new(
            SigHandler::Handler(supervisor::on_alarm),
            SaFlags::empty(),
            SigSet::empty(),
        );
        // SAFETY: the handler only touches atomics and calls kill(2).
        result = unsafe { sigaction(Signal::SIGALRM, &action) }.map(|_| ());
    });
    result
}

/// Put the interactive shell's dispositions in place.
///
/// - `SIGINT` is ignored, so Ctrl-C only reaches foreground children.
/// - `SIGALRM` runs the timeout handler.
/// - `SIGCHLD` keeps its default action; with `auto_reap` the kernel additionally
///   discards the exit status of every child (`SA_NOCLDWAIT`).
pub fn install(auto_reap: bool) -> nix::Result<()> {
    let ignore = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: installing SIG_IGN runs no code in signal context.
    unsafe { sigaction(Signal::SIGINT, &ignore) }?;

    install_timeout_handler()?;

    let flags = if auto_reap {
        SaFlags::SA_NOCLDWAIT
    } else {
        SaFlags::empty()
    };
    let child = SigAction::new(SigHandler::SigDfl, flags, SigSet::empty());
    // SAFETY: default disposition, no handler code.
    unsafe { sigaction(Signal::SIGCHLD, &child) }?;

    tracing::debug!(auto_reap, "signal dispositions installed");
    Ok(())
}
