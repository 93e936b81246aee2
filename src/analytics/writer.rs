use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::error;

use crate::analytics::AnalyticsClient;
use crate::api::health::HealthState;

/// One fire-and-forget document write.
#[derive(Debug)]
pub struct IndexRequest {
    pub index: &'static str,
    pub doc: serde_json::Value,
}

/// Receives index requests from request handlers and refresh jobs and writes
/// them to the analytics store. Runs as a dedicated background task — never
/// blocks the request path. Failures are logged and dropped; there is no
/// retry and no recovery path.
pub struct IndexWriter {
    client: Arc<AnalyticsClient>,
    rx: mpsc::Receiver<IndexRequest>,
    health: Arc<HealthState>,
}

impl IndexWriter {
    pub fn new(
        client: Arc<AnalyticsClient>,
        rx: mpsc::Receiver<IndexRequest>,
        health: Arc<HealthState>,
    ) -> Self {
        Self { client, rx, health }
    }

    pub async fn run(mut self) {
        while let Some(req) = self.rx.recv().await {
            match self.client.index(req.index, &req.doc).await {
                Ok(()) => self.health.set_analytics_connected(true),
                Err(e) => {
                    self.health.set_analytics_connected(false);
                    error!("Analytics write error: {e}");
                }
            }
            self.health.dec_write_queue_pending();
        }
    }
}
