//! Cancellation scopes.
//!
//! A `CancelScope` is the caller-supplied context threaded through
//! `publish`, `bootstrap` and `shutdown`: it can be cancelled explicitly and
//! may carry a deadline. Scopes derived with [`CancelScope::with_timeout`]
//! share the cancellation signal of their parent.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Why a scope is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Cancelled => write!(f, "context cancelled"),
            CancelReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

#[derive(Clone)]
pub struct CancelScope {
    signal: Arc<watch::Sender<bool>>,
    deadline: Option<Instant>,
}

impl CancelScope {
    /// A scope that never expires on its own.
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            signal: Arc::new(signal),
            deadline: None,
        }
    }

    /// A fresh scope that expires after `timeout`.
    pub fn timeout(timeout: Duration) -> Self {
        Self::new().with_timeout(timeout)
    }

    /// Derive a scope sharing this scope's signal whose deadline is the
    /// earlier of the current deadline and `now + timeout`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(existing) if existing <= candidate => existing,
            _ => candidate,
        };
        Self {
            signal: Arc::clone(&self.signal),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.signal.send_replace(true);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// `None` while the scope is live.
    pub fn reason(&self) -> Option<CancelReason> {
        if *self.signal.borrow() {
            return Some(CancelReason::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.signal.subscribe();
        let signalled = async move {
            // The sender lives as long as `self`, so this only ends on cancel.
            let _ = rx.wait_for(|cancelled| *cancelled).await;
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = signalled => CancelReason::Cancelled,
                _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
            },
            None => {
                signalled.await;
                CancelReason::Cancelled
            }
        }
    }
}

impl Default for CancelScope {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelScope")
            .field("cancelled", &*self.signal.borrow())
            .field("deadline", &self.deadline)
            .finish()
    }
}
