//! Shared failure collection and cancellation signal
//!
//! Every table unit holds the same sink. Recording a failure cancels the run
//! token, so the other units unwind at their next checkpoint. The first
//! failure recorded is the one reported through the exception handler and
//! returned to the caller; later ones are kept for the log only.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::collaborators::ExceptionHandler;
use crate::error::EngineError;

#[derive(Debug)]
pub struct FailureRecord {
    pub error: EngineError,
    /// Reported before it reached the sink
    pub already_handled: bool,
}

pub struct ErrorSink {
    failures: Mutex<Vec<FailureRecord>>,
    token: CancellationToken,
    handler: Arc<dyn ExceptionHandler>,
}

impl ErrorSink {
    pub fn new(handler: Arc<dyn ExceptionHandler>) -> Self {
        Self {
            failures: Mutex::new(Vec::new()),
            token: CancellationToken::new(),
            handler,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    fn failures(&self) -> MutexGuard<'_, Vec<FailureRecord>> {
        self.failures.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a terminal failure and cancel the run
    ///
    /// Cancellation itself is not a failure and is ignored.
    pub fn record(&self, error: EngineError) {
        if error.is_cancelled() {
            return;
        }
        let (error, already_handled) = error.into_handled();

        let mut failures = self.failures();
        self.token.cancel();

        if failures.is_empty() {
            if !already_handled {
                self.handler.handle(&error);
            }
        } else {
            tracing::debug!(error = %error, "Additional failure after cancellation");
        }
        failures.push(FailureRecord { error, already_handled });
    }

    pub fn failure_count(&self) -> usize {
        self.failures().len()
    }

    /// Remove and return the first recorded failure
    pub fn take_first(&self) -> Option<EngineError> {
        let mut failures = self.failures();
        if failures.is_empty() {
            return None;
        }
        Some(failures.remove(0).error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl ExceptionHandler for CountingHandler {
        fn handle(&self, _error: &EngineError) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            false
        }
    }

    #[test]
    fn test_first_failure_reported_once_and_cancels() {
        let handler = Arc::new(CountingHandler::default());
        let sink = ErrorSink::new(handler.clone());

        sink.record(EngineError::Cancelled);
        assert!(!sink.is_cancelled());
        assert_eq!(sink.failure_count(), 0);

        sink.record(EngineError::invariant("first"));
        sink.record(EngineError::invariant("second"));
        assert!(sink.is_cancelled());
        assert_eq!(sink.failure_count(), 2);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);

        let first = sink.take_first().unwrap();
        assert_eq!(first.to_string(), "Engine invariant violated: first");
    }

    #[test]
    fn test_already_handled_is_unwrapped_and_not_reported() {
        let handler = Arc::new(CountingHandler::default());
        let sink = ErrorSink::new(handler.clone());

        sink.record(EngineError::AlreadyHandled(Box::new(EngineError::metadata("bad"))));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(sink.take_first(), Some(EngineError::Metadata(_))));
    }
}
