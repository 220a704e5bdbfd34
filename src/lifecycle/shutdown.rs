//! Shutdown coordination for the feed server.
//!
//! # Design Decisions
//! - Two stages: `trigger` stops accepting work and lets in-flight requests
//!   finish; `abort` cancels every request token, cutting off body writes
//! - Request tokens are children of the abort token only, so a graceful
//!   trigger never truncates a download

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Coordinator for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    abort: CancellationToken,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Per-request token. Cancelled by `abort` or by the request itself.
    pub fn request_token(&self) -> CancellationToken {
        self.abort.child_token()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        if !self.token.is_cancelled() {
            tracing::info!("Shutdown triggered");
        }
        self.token.cancel();
    }

    /// Cancel all in-flight requests. Implies `trigger`.
    pub fn abort(&self) {
        self.trigger();
        if !self.abort.is_cancelled() {
            tracing::warn!("Aborting in-flight requests");
        }
        self.abort.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn wait(&self) {
        self.token.cancelled().await
    }

    /// After shutdown triggers, give in-flight requests `drain` to finish, then abort.
    pub async fn abort_after_drain(self, drain: Duration) {
        self.wait().await;
        tokio::select! {
            _ = tokio::time::sleep(drain) => self.abort(),
            _ = self.abort.cancelled() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_trigger_leaves_requests_running() {
        let shutdown = Shutdown::new();
        let request = shutdown.request_token();

        shutdown.trigger();
        shutdown.wait().await;
        assert!(shutdown.is_triggered());
        assert!(!request.is_cancelled());
    }

    #[tokio::test]
    async fn test_abort_reaches_requests() {
        let shutdown = Shutdown::new();
        let request = shutdown.request_token();

        shutdown.abort();
        request.cancelled().await;
        assert!(shutdown.is_triggered());
        assert!(shutdown.is_aborted());
    }

    #[test]
    fn test_request_cancel_does_not_propagate_up() {
        let shutdown = Shutdown::new();
        shutdown.request_token().cancel();
        assert!(!shutdown.is_triggered());
        assert!(!shutdown.is_aborted());
    }

    #[tokio::test]
    async fn test_abort_after_drain() {
        let shutdown = Shutdown::new();
        let request = shutdown.request_token();
        let drain = tokio::spawn(shutdown.clone().abort_after_drain(Duration::from_millis(200)));

        shutdown.trigger();
        tokio::task::yield_now().await;
        assert!(!request.is_cancelled());

        drain.await.unwrap();
        assert!(request.is_cancelled());
    }
}
