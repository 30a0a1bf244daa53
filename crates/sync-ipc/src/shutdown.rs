//! Process-wide shutdown signal.

use std::sync::Arc;
use tokio::sync::watch;

/// Level-triggered shutdown flag shared by every pending call.
///
/// Raised once, never reset. Cloning yields another handle to the same flag.
/// Every waiter, present or future, observes the raise.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Raise the signal. Idempotent.
    pub fn raise(&self) {
        self.state.send_replace(true);
    }

    pub fn is_raised(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolve once the signal is raised (immediately if it already is).
    pub async fn raised(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|raised| *raised).await;
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
