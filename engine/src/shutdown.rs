//! Shutdown coordination.
//!
//! Interruption is modeled as a cancellation token observed by the
//! scheduler's batch loop, not as a signal handler mutating shared state.
//! On cancellation the scheduler starts no new batches, lets the in-flight
//! batch drain within a bounded grace period, saves a final checkpoint and
//! returns. The listener task here only maps process signals onto the token.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Owns the cancellation token that a shutdown signal trips.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        ShutdownCoordinator {
            token: CancellationToken::new(),
        }
    }

    /// A clone of the token for the scheduler (or tests) to observe.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Request shutdown programmatically.
    pub fn request_shutdown(&self) {
        self.token.cancel();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Spawn a background task that cancels the token on SIGINT or SIGTERM
    /// (ctrl-c on non-unix platforms). Must be called from within a tokio
    /// runtime.
    pub fn listen_for_signals(&self) {
        let token = self.token.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("shutdown signal received; finishing the in-flight batch");
            token.cancel();
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        ShutdownCoordinator::new()
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler; listening for ctrl-c only");
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
            return;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for ctrl-c");
            }
        }
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_uncancelled() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutdown_requested());
        assert!(!coordinator.token().is_cancelled());
    }

    #[test]
    fn test_request_shutdown_cancels_all_clones() {
        let coordinator = ShutdownCoordinator::new();
        let observer = coordinator.token();

        coordinator.request_shutdown();

        assert!(coordinator.is_shutdown_requested());
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves_after_request() {
        let coordinator = ShutdownCoordinator::new();
        let token = coordinator.token();

        coordinator.request_shutdown();
        // Resolves immediately once cancelled
        token.cancelled().await;
    }
}
