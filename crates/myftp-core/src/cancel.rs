use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::TransferError;

/// User-initiated abort, observed at every blocking point of a transfer.
///
/// Clones share the same flag; cancelling is permanent.
#[derive(Debug, Clone)]
pub struct CancelToken {
    state: Arc<watch::Sender<bool>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { state: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.state.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.state.borrow()
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Drive `fut` unless the token fires first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, TransferError> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(TransferError::Cancelled),
            out = fut => Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn guard_returns_cancelled_when_token_fires() {
        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let result = token.guard(std::future::pending::<()>()).await;
        assert!(matches!(result, Err(TransferError::Cancelled)));
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn guard_passes_output_through() {
        let token = CancelToken::new();
        assert_eq!(token.guard(async { 7 }).await.unwrap(), 7);
    }
}
