//! Cooperative cancellation
//!
//! A [`CancelHandle`] is threaded through every recursive entry point of a build. Checking it is
//! cheap; once it has been aborted (explicitly or by an expired deadline) every subsequent
//! [`CancelHandle::check`] returns [`AnalysisError::Cancelled`] and the build unwinds through `?`.
//!
//! [`CallContext`] layers a bounded call budget on top of the handle. Recursive value queries
//! (attribute lookup through base classes, nested unions) spend one unit per level and stop with
//! [`CallError::LimitExceeded`] instead of recursing forever on cyclic inputs.

use crate::AnalysisError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared abort flag with an optional deadline
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    aborted: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle that cancels itself once `timeout` has elapsed
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { aborted: Arc::new(AtomicBool::new(false)), deadline: Some(Instant::now() + timeout) }
    }

    /// Request cancellation. Every clone of this handle observes it.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.aborted.load(Ordering::Relaxed) {
            return true;
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                self.aborted.store(true, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    pub fn check(&self) -> Result<(), AnalysisError> {
        if self.is_cancelled() { Err(AnalysisError::Cancelled) } else { Ok(()) }
    }

    /// Start a bounded query that may recurse at most `limit` levels deep
    pub fn call_context(&self, limit: usize) -> CallContext<'_> {
        CallContext { handle: self, remaining: limit }
    }
}

/// Why a bounded query stopped early
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    Cancelled,
    LimitExceeded,
}

impl From<AnalysisError> for CallError {
    fn from(_: AnalysisError) -> Self {
        CallError::Cancelled
    }
}

/// A cancellation handle paired with a remaining call budget
#[derive(Debug, Clone, Copy)]
pub struct CallContext<'a> {
    handle: &'a CancelHandle,
    remaining: usize,
}

impl<'a> CallContext<'a> {
    pub fn handle(&self) -> &'a CancelHandle {
        self.handle
    }

    pub fn check(&self) -> Result<(), CallError> {
        self.handle.check().map_err(CallError::from)
    }

    /// Descend one level, spending one unit of budget
    pub fn call(&self) -> Result<CallContext<'a>, CallError> {
        self.check()?;
        match self.remaining.checked_sub(1) {
            Some(remaining) => Ok(CallContext { handle: self.handle, remaining }),
            None => Err(CallError::LimitExceeded),
        }
    }

    pub fn at_limit(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_handle_passes_check() {
        let handle = CancelHandle::new();
        assert!(handle.check().is_ok());
    }

    #[test]
    fn test_abort_is_shared_between_clones() {
        let handle = CancelHandle::new();
        let clone = handle.clone();
        clone.abort();
        assert_eq!(handle.check(), Err(AnalysisError::Cancelled));
    }

    #[test]
    fn test_expired_deadline_cancels() {
        let handle = CancelHandle::with_timeout(Duration::ZERO);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn test_call_limit_is_exhausted() {
        let handle = CancelHandle::new();
        let ctx = handle.call_context(2);
        let one = ctx.call().unwrap();
        let two = one.call().unwrap();
        assert!(two.at_limit());
        assert_eq!(two.call().unwrap_err(), CallError::LimitExceeded);
    }

    #[test]
    fn test_call_reports_cancellation_before_limit() {
        let handle = CancelHandle::new();
        let ctx = handle.call_context(5);
        handle.abort();
        assert_eq!(ctx.call().unwrap_err(), CallError::Cancelled);
    }
}
