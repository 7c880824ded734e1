use crate::errors::{DataError, DataResult, ErrorKind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Deadline and cancellation carried through every blocking call.
///
/// Each accessor, allocator and store operation takes a `&CallContext` and
/// checks it before doing any work. A context derived with
/// [CallContext::child_with_timeout] shares the parent's cancellation flag
/// and never outlives the parent's deadline.
///
/// ```rust
/// use docbase::common::CallContext;
/// use std::time::Duration;
///
/// let ctx = CallContext::with_timeout(Duration::from_secs(5));
/// assert!(ctx.check().is_ok());
/// ctx.cancel();
/// assert!(ctx.check().is_err());
/// ```
#[derive(Clone, Debug)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Default for CallContext {
    fn default() -> Self {
        Self::background()
    }
}

impl CallContext {
    /// A context with no deadline that is never cancelled unless asked to.
    pub fn background() -> Self {
        CallContext {
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CallContext {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Derives a context that expires after `timeout` or at the parent's
    /// deadline, whichever comes first.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(parent) if parent < candidate => parent,
            _ => candidate,
        };
        CallContext {
            deadline: Some(deadline),
            cancelled: self.cancelled.clone(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Fails with [ErrorKind::Cancelled] or [ErrorKind::Timeout] when the
    /// call must not proceed.
    pub fn check(&self) -> DataResult<()> {
        if self.is_cancelled() {
            log::debug!("Call cancelled by caller");
            return Err(DataError::new("Call cancelled by caller", ErrorKind::Cancelled));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                log::debug!("Call deadline exceeded");
                return Err(DataError::new("Call deadline exceeded", ErrorKind::Timeout));
            }
        }
        Ok(())
    }
}
