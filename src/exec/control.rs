// src/exec/control.rs

use std::sync::Arc;

use tokio::sync::watch;

/// Terminate capability for one phase process.
///
/// Cheap to clone. `terminate` only records the request; whoever owns the
/// child (see [`super::phase_runner`]) waits on [`ProcessControl::terminated`]
/// and delivers the signal.
#[derive(Debug, Clone)]
pub struct ProcessControl {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ProcessControl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessControl {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request graceful termination. Idempotent; returns `true` only for the
    /// first request.
    pub fn terminate(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_terminate_requested(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once termination has been requested.
    pub async fn terminated(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|requested| *requested).await;
    }
}
