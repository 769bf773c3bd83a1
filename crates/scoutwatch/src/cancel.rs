use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Granularity of cancellation checks while sleeping.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Token for cooperative shutdown of the watch loop and volume polling.
///
/// Uses an AtomicBool internally. Clone is cheap and shares state, so a
/// signal handler thread can hold one copy while the loop checks another.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled).
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Sleep for `duration`, waking early on cancellation.
    ///
    /// Returns `false` if the token was cancelled before the full duration
    /// elapsed.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return true;
            }
            tokio::time::sleep((deadline - now).min(CANCEL_POLL)).await;
        }
    }
}

/// Operator request to retry a paused watcher without waiting out its
/// resume interval. Set from a signal handler thread.
#[derive(Debug, Clone, Default)]
pub struct ResumeSignal {
    requested: Arc<AtomicBool>,
}

impl ResumeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.requested.store(true, Ordering::SeqCst);
    }

    /// Consume a pending request.
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}
