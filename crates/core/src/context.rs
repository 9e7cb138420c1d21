// Execution Context
// Cooperative cancellation threaded through every suspending call.
// A context is a cancellation token plus an optional deadline; timeouts are
// derived child scopes released when their guard drops.

use std::future::Future;
use std::ops::Deref;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

/// Why a context is done
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    #[error("context cancelled")]
    Cancelled,

    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

#[derive(Debug, Clone)]
pub struct ExecContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::background()
    }
}

impl ExecContext {
    /// Root context: never done unless cancelled explicitly
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Root context driven by an externally owned token (e.g. the job engine's shutdown)
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Child scope that is cancelled with this one but can be cancelled on its own
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Child scope bounded by `timeout`; whichever of parent or timeout fires first wins
    pub fn with_timeout(&self, timeout: Duration) -> TimeoutScope {
        let own = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < own => parent,
            _ => own,
        };
        TimeoutScope {
            ctx: Self {
                token: self.token.child_token(),
                deadline: Some(deadline),
            },
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Non-blocking check, `None` while the context is live
    pub fn error(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            Some(ContextError::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(ContextError::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_done(&self) -> bool {
        self.error().is_some()
    }

    /// Resolves once the context is cancelled or its deadline passes
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = self.token.cancelled() => ContextError::Cancelled,
                _ = sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Race `fut` against the context; a ready result wins a tie
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, ContextError> {
        if let Some(e) = self.error() {
            return Err(e);
        }
        tokio::select! {
            biased;
            out = fut => Ok(out),
            e = self.done() => Err(e),
        }
    }
}

/// Guard owning a timeout-bounded child context; dropping it releases the scope
#[derive(Debug)]
pub struct TimeoutScope {
    ctx: ExecContext,
}

impl TimeoutScope {
    pub fn context(&self) -> &ExecContext {
        &self.ctx
    }
}

impl Deref for TimeoutScope {
    type Target = ExecContext;

    fn deref(&self) -> &ExecContext {
        &self.ctx
    }
}

impl Drop for TimeoutScope {
    fn drop(&mut self) {
        self.ctx.token.cancel();
    }
}
