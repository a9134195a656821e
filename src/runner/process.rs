//! Child process supervision.
//!
//! Children are started in their own process group so that cancellation
//! reaches everything they spawned (npm, node, shells). Waiting polls every
//! 100ms for exit, the cancel token and the deadline. Once the child is
//! reaped its output pipes are drained for at most `DRAIN_TIMEOUT`; a
//! descendant that left the group can hold them open indefinitely.

use super::sink::LogSink;
use crate::context::{CancelReason, RunContext};
use crate::credentials::Redactor;
use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// How a supervised process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessExit {
    /// Exit code, when the process exited normally.
    pub exit_code: Option<i32>,
    /// Terminating signal, when it did not.
    pub signal: Option<i32>,
    /// Set when the harness stopped the process.
    pub interruption: Option<CancelReason>,
    /// Lines written to the log.
    pub output_lines: u64,
}

/// Spawn `command`, streaming stdout and stderr into `log_path`.
///
/// Spawn failures are returned as errors after being noted in the log. Once
/// the child is running, every outcome (including cancellation) is an `Ok`.
/// A context interrupted before spawn yields an interrupted exit and the
/// command never starts.
pub fn run_streaming(
    mut command: Command,
    log_path: &Path,
    redactor: Redactor,
    ctx: &RunContext,
    grace: Duration,
) -> io::Result<ProcessExit> {
    let sink = LogSink::open(log_path, redactor)?;

    if let Some(reason) = ctx.interruption() {
        tracing::info!(%reason, "interrupted before spawn; not starting");
        sink.note(&format!("not started ({})", reason));
        let output_lines = sink.close()?;
        return Ok(ProcessExit {
            exit_code: None,
            signal: None,
            interruption: Some(reason),
            output_lines,
        });
    }

    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            sink.note(&format!("failed to spawn: {}", e));
            sink.close()?;
            return Err(e);
        }
    };
    tracing::debug!(pid = child.id(), log = %log_path.display(), "spawned child");

    let pumps: Vec<_> = [
        child.stdout.take().and_then(|out| sink.pump(out)),
        child.stderr.take().and_then(|err| sink.pump(err)),
    ]
    .into_iter()
    .flatten()
    .collect();

    let waited = wait_interruptible(&mut child, ctx, grace);

    // The group is only ours to signal while we are stopping it.
    if !matches!(waited, Ok((_, None))) {
        kill_group(&mut child);
    }

    let abandoned = drain(pumps);
    if abandoned > 0 {
        tracing::warn!(
            pid = child.id(),
            streams = abandoned,
            "output still held open after exit; stopped reading"
        );
        sink.note("output still held open by a detached process; stopped reading");
    }

    let (status, interruption) = match waited {
        Ok(result) => result,
        Err(e) => {
            sink.note(&format!("lost track of child: {}", e));
            sink.close()?;
            return Err(e);
        }
    };

    if let Some(reason) = interruption {
        sink.note(&format!("process group terminated ({})", reason));
    }
    let output_lines = sink.close()?;

    Ok(ProcessExit {
        exit_code: status.code(),
        signal: exit_signal(&status),
        interruption,
        output_lines,
    })
}

/// Join pumps that reach EOF within `DRAIN_TIMEOUT` and detach the rest.
/// Returns how many were left behind.
fn drain(mut pending: Vec<JoinHandle<()>>) -> usize {
    let deadline = Instant::now() + DRAIN_TIMEOUT;
    loop {
        let (done, rest): (Vec<_>, Vec<_>) =
            pending.into_iter().partition(|pump| pump.is_finished());
        for pump in done {
            let _ = pump.join();
        }
        pending = rest;

        if pending.is_empty() || Instant::now() >= deadline {
            return pending.len();
        }
        thread::sleep(DRAIN_POLL);
    }
}

fn wait_interruptible(
    child: &mut Child,
    ctx: &RunContext,
    grace: Duration,
) -> io::Result<(ExitStatus, Option<CancelReason>)> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok((status, None));
        }

        if let Some(reason) = ctx.interruption() {
            tracing::info!(pid = child.id(), %reason, "terminating process group");
            let status = terminate(child, grace)?;
            return Ok((status, Some(reason)));
        }

        thread::sleep(POLL_INTERVAL);
    }
}

/// SIGTERM the group, wait up to `grace`, then SIGKILL.
fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    term_group(child);

    let start = Instant::now();
    while start.elapsed() < grace {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        thread::sleep(POLL_INTERVAL);
    }

    tracing::warn!(
        pid = child.id(),
        grace_ms = grace.as_millis() as u64,
        "process group ignored SIGTERM; killing"
    );
    kill_group(child);
    child.wait()
}

#[cfg(unix)]
fn signal_group(child: &Child, signal: nix::sys::signal::Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let pgid = Pid::from_raw(child.id() as i32);
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::debug!(pgid = child.id(), ?signal, error = %e, "killpg failed"),
    }
}

#[cfg(unix)]
fn term_group(child: &mut Child) {
    signal_group(child, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    signal_group(child, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(not(unix))]
fn term_group(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
