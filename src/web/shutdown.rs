use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Coordinates the drain of the acceptor.
///
/// Once triggered, no new sessions are accepted; in-flight sessions run
/// until their own teardown completes and the serve loop then returns.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    draining: Arc<AtomicBool>,
    tx: broadcast::Sender<()>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            draining: Arc::new(AtomicBool::new(false)),
            tx,
        }
    }

    /// Begin the drain. Returns true only for the call that initiated
    /// it; repeated calls are no-ops.
    pub fn trigger(&self) -> bool {
        if self.draining.swap(true, Ordering::SeqCst) {
            return false;
        }
        let _ = self.tx.send(());
        true
    }

    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    /// Resolves once the drain has been triggered, however late the
    /// caller subscribes.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        if self.is_draining() {
            return;
        }
        let _ = rx.recv().await;
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
