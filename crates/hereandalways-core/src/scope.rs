//! Lifetime of the view that started an operation
//!
//! Once a scope is closed, nothing started under it may touch the view's
//! state again. Reveals are abandoned outright. Writes to the backend are
//! allowed to finish so remote state stays consistent, but their result is
//! dropped.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct ViewScope {
    closed: Arc<watch::Sender<bool>>,
}

impl ViewScope {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            closed: Arc::new(tx),
        }
    }

    pub fn close(&self) {
        self.closed.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the scope is closed.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this cannot error
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Run `fut` to completion, keeping its output only if the scope is still open.
    pub async fn settle<F: Future>(&self, fut: F) -> Option<F::Output> {
        let output = fut.await;
        if self.is_closed() {
            None
        } else {
            Some(output)
        }
    }

    /// Run `fut`, dropping it as soon as the scope closes.
    pub async fn abortable<F: Future>(&self, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = self.closed() => None,
            output = fut => {
                if self.is_closed() {
                    None
                } else {
                    Some(output)
                }
            }
        }
    }
}

impl Default for ViewScope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_open_scope_passes_output_through() {
        let scope = ViewScope::new();
        assert_eq!(scope.settle(async { 7 }).await, Some(7));
        assert_eq!(scope.abortable(async { 8 }).await, Some(8));
    }

    #[tokio::test]
    async fn test_abortable_stops_on_close() {
        let scope = ViewScope::new();
        let finished = Arc::new(AtomicBool::new(false));

        let closer = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.close();
        });

        let flag = finished.clone();
        let output = scope
            .abortable(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                flag.store(true, Ordering::SeqCst);
            })
            .await;

        assert!(output.is_none());
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_settle_finishes_work_but_drops_result() {
        let scope = ViewScope::new();
        let finished = Arc::new(AtomicBool::new(false));

        let closer = scope.clone();
        let flag = finished.clone();
        let output = scope
            .settle(async move {
                closer.close();
                tokio::time::sleep(Duration::from_millis(5)).await;
                flag.store(true, Ordering::SeqCst);
                "saved"
            })
            .await;

        assert!(output.is_none());
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_already_closed() {
        let scope = ViewScope::new();
        scope.close();
        assert!(scope.is_closed());
        assert_eq!(scope.abortable(async { 1 }).await, None);
        scope.closed().await;
    }
}
