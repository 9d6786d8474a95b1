use std::sync::Arc;
use tokio::sync::watch;

/// Cooperative cancellation shared between a relay and whoever may abort it.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancellationToken {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    #[inline]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    #[inline]
    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called on any clone.
    #[inline]
    pub async fn cancelled(&self) {
        let mut receiver = self.state.subscribe();
        let changed = receiver.wait_for(|cancelled| *cancelled).await.map(|_| ());
        if changed.is_err() {
            // The sender lives as long as `self`, so this is unreachable in practice.
            std::future::pending::<()>().await;
        }
    }
}
