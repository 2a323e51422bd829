use crate::services::session_store::SessionStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, interval};

/// Periodically drops expired admin sessions
pub struct BackgroundWorker {
    sessions: Arc<dyn SessionStore>,
    period: Duration,
    shutdown: watch::Receiver<bool>,
}

impl BackgroundWorker {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        period: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            sessions,
            period,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!("🚀 Background worker started");
        let mut ticker = interval(self.period);

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Background worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.perform_cleanup().await;
                }
            }
        }
    }

    async fn perform_cleanup(&self) {
        match self.sessions.purge_expired().await {
            Ok(0) => {}
            Ok(n) => tracing::info!("🧹 Purged {} expired admin session(s)", n),
            Err(e) => tracing::error!("Failed to purge expired sessions: {}", e),
        }
    }
}
