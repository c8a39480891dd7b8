//! Deadline-bearing cancellation contexts.
//!
//! A [`Context`] is done once its deadline passes or once any of the cancel
//! signals it inherited fires. Children derived with [`Context::with_cancel`],
//! [`Context::with_timeout`] or [`Context::with_deadline`] keep every signal
//! of their parent, so cancelling a parent reaches all of its descendants.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    signals: Vec<watch::Receiver<bool>>,
}

/// Cancels the context it was created with. Dropping it does not cancel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Context {
    /// A context that is never done.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_cancel(&self) -> (Context, CancelHandle) {
        let (sender, receiver) = watch::channel(false);
        let mut child = self.clone();
        child.signals.push(receiver);
        (
            child,
            CancelHandle {
                sender: Arc::new(sender),
            },
        )
    }

    pub fn with_deadline(&self, deadline: Instant) -> (Context, CancelHandle) {
        let (mut child, handle) = self.with_cancel();
        child.deadline = earliest(child.deadline, Some(deadline));
        (child, handle)
    }

    pub fn with_timeout(&self, timeout: Duration) -> (Context, CancelHandle) {
        self.with_deadline(Instant::now() + timeout)
    }

    /// A context that is done as soon as either `self` or `other` is.
    pub fn merge(&self, other: &Context) -> Context {
        let mut signals = self.signals.clone();
        signals.extend(other.signals.iter().cloned());
        Context {
            deadline: earliest(self.deadline, other.deadline),
            signals,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_done(&self) -> bool {
        if matches!(self.deadline, Some(at) if Instant::now() >= at) {
            return true;
        }
        self.signals.iter().any(|signal| *signal.borrow())
    }

    /// Resolves once the context is done. Never resolves for a background
    /// context.
    pub async fn done(&self) {
        let mut signals = self.signals.clone();
        let cancelled = async move {
            if signals.is_empty() {
                return pending::<()>().await;
            }
            let waits = signals.iter_mut().map(|signal| {
                Box::pin(async move {
                    // A dropped handle can no longer cancel.
                    let closed = signal.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        pending::<()>().await;
                    }
                })
            });
            futures::future::select_all(waits).await;
        };

        match self.deadline {
            Some(at) => {
                tokio::select! {
                    _ = sleep_until(at) => {}
                    _ = cancelled => {}
                }
            }
            None => cancelled.await,
        }
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
