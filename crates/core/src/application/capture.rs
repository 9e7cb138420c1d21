// Output Capture
// Drives a process handle through start/wait while draining both streams
// independently, so neither stream can stall the other or the wait.

use super::constants::DRAIN_GRACE_PERIOD;
use crate::context::ExecContext;
use crate::domain::{CapturedOutput, Outcome};
use crate::error::StepError;
use crate::port::{OutputPipe, ProcessHandle, TransportError};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Start `proc`, wait for it and capture its output
///
/// Failing to obtain pipes or to start is a launch failure. Once started, the
/// wait verdict and whatever output was drained form a completed outcome.
pub async fn drive_process(ctx: &ExecContext, proc: &mut dyn ProcessHandle) -> Outcome {
    let stdout = match proc.stdout_pipe() {
        Ok(p) => p,
        Err(e) => return Outcome::LaunchFailed(e.into()),
    };
    let stderr = match proc.stderr_pipe() {
        Ok(p) => p,
        Err(e) => return Outcome::LaunchFailed(e.into()),
    };

    match proc.start(ctx).await {
        Ok(()) => {}
        // a start cut short by the context never launched anything
        Err(TransportError::Interrupted(e)) => {
            return Outcome::LaunchFailed(TransportError::LaunchInterrupted(e).into())
        }
        Err(e) => return Outcome::LaunchFailed(StepError::Transport(e)),
    }
    debug!(argv = ?proc.argv(), "Process started");

    let exited = CancellationToken::new();
    let wait = async {
        let result = proc.wait(ctx).await;
        exited.cancel();
        result
    };
    let drain = async {
        tokio::join!(
            drain_pipe("stdout", stdout, &exited),
            drain_pipe("stderr", stderr, &exited)
        )
    };

    let (result, (out, err)) = tokio::join!(wait, drain);
    Outcome::completed(CapturedOutput::new(out, err), result)
}

/// Read a stream to its end; read errors are logged and keep the bytes read so far
async fn drain_pipe(stream: &'static str, mut pipe: OutputPipe, exited: &CancellationToken) -> Vec<u8> {
    let mut buf = Vec::new();
    let abandon = async {
        exited.cancelled().await;
        tokio::time::sleep(DRAIN_GRACE_PERIOD).await;
    };

    let finished = tokio::select! {
        res = pipe.read_to_end(&mut buf) => Some(res),
        _ = abandon => None,
    };

    match finished {
        Some(Ok(_)) => {}
        Some(Err(e)) => warn!(stream, error = %e, "Failed to read output stream"),
        None => warn!(
            stream,
            bytes = buf.len(),
            "Output stream still open after process exit, keeping partial output"
        ),
    }
    buf
}
