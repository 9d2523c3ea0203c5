use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Cooperative cancellation flag shared between a query and its issuer.
/// Checked between candidate files and before each context extraction; a
/// single-file scan is never preempted.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-query runtime limits. `deadline` is absolute; `None` means no limit.
#[derive(Debug, Clone, Default)]
pub struct QueryControl {
    pub cancel: CancelToken,
    pub deadline: Option<Instant>,
}

impl QueryControl {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancel: CancelToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Error out if the query was cancelled or its deadline elapsed.
    pub fn check(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(Error::Timeout(self.overshoot(deadline)));
        }
        Ok(())
    }

    fn overshoot(&self, deadline: Instant) -> Duration {
        Instant::now().saturating_duration_since(deadline)
    }
}
