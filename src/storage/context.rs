//! Per-call cancellation and deadline signal.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use crate::errors::{Result, ShorterError};

/// Cancellation handle passed to every storage operation.
///
/// Clones share the cancel flag, so cancelling any clone cancels all of them.
#[derive(Clone, Debug, Default)]
pub struct OpContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl OpContext {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails with `Cancelled` when the context is cancelled or past its deadline.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(ShorterError::cancelled("operation cancelled"));
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            return Err(ShorterError::cancelled("deadline exceeded"));
        }
        Ok(())
    }

    /// Runs `fut` bounded by the deadline.
    ///
    /// When the deadline fires the future is dropped; a database transaction
    /// owned by it rolls back on drop.
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check()?;
        match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| ShorterError::cancelled("deadline exceeded"))?,
            None => fut.await,
        }
    }
}
