//! Port closure signal.
//!
//! Closure is the single cancellation signal shared by the port's tasks:
//! a set-once atomic flag plus a [`Notify`] so suspended tasks wake up and
//! observe it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Cloneable handle to the port's closed state.
#[derive(Debug, Clone)]
pub(crate) struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    closed: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                closed: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Mark the port closed and wake every waiting task.
    ///
    /// Returns `true` for the call that actually performed the transition.
    pub(crate) fn shut_down(&self) -> bool {
        let first = !self.inner.closed.swap(true, Ordering::AcqRel);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// Whether the port has been closed.
    pub(crate) fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolve once the port is closed.
    pub(crate) async fn wait(&self) {
        loop {
            if self.is_shut_down() {
                return;
            }
            let notified = self.inner.notify.notified();
            if self.is_shut_down() {
                return;
            }
            notified.await;
        }
    }
}
