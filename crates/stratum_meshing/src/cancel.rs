//! Cooperative cancellation for blocking channel waits.
//!
//! The token owns the only sender of a zero-traffic channel. Cancelling
//! drops that sender, which disconnects every clone of the receiver at once,
//! so any thread parked in a `select!` over the token's receiver wakes up.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;

struct Inner {
    cancelled: AtomicBool,
    signal: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

/// Shared, one-shot cancellation flag.
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    /// Creates a live token.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                cancelled: AtomicBool::new(false),
                signal: Mutex::new(Some(sender)),
                receiver,
            }),
        }
    }

    /// Cancels the token. Returns true for the call that actually cancelled.
    pub fn cancel(&self) -> bool {
        let first = !self.inner.cancelled.swap(true, Ordering::SeqCst);
        self.inner.signal.lock().take();
        first
    }

    /// Returns true once cancelled.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Receiver that becomes ready (disconnected) on cancellation.
    ///
    /// Nothing is ever sent on it; use it as a `select!` arm.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.receiver
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
