//! Per-request deadline and cancellation.
//!
//! Each pipeline stage calls [`RequestContext::checkpoint`] on entry; decompressing
//! readers are wrapped in [`ContextReader`] so a stuck stream observes the same signal.

use crate::error::{LimitKind, PreflightError, PreflightResult};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline plus cancellation signal for one evaluation request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    deadline: Option<Instant>,
    cancel: CancelFlag,
}

impl RequestContext {
    /// Context without deadline; cancellable through [`RequestContext::cancel_flag`].
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().timeout(timeout)
    }

    /// Set the deadline to `now + timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fail if the request was cancelled or its deadline passed.
    pub fn checkpoint(&self, stage: &str) -> PreflightResult<()> {
        if self.cancel.is_cancelled() {
            return Err(PreflightError::cancelled(stage));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(PreflightError::limit_exceeded(
                    LimitKind::Timeout,
                    format!("deadline passed before {}", stage),
                ));
            }
        }
        Ok(())
    }
}

/// Reader that checks the request context before every read.
pub(crate) struct ContextReader<'a, R> {
    inner: R,
    ctx: &'a RequestContext,
}

impl<'a, R: Read> ContextReader<'a, R> {
    pub(crate) fn new(inner: R, ctx: &'a RequestContext) -> Self {
        Self { inner, ctx }
    }
}

impl<R: Read> Read for ContextReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.ctx
            .checkpoint("read")
            .map_err(std::io::Error::other)?;
        self.inner.read(buf)
    }
}
