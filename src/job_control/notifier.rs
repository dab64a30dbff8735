use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use super::job::{ChangeReceiver, JobSnapshot};
use super::types::JobStatusEvent;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("event sink {0} is closed")]
    Closed(String),
    #[error("failed to encode job status event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Destination for job status events.
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    fn emit(&self, event: &JobStatusEvent) -> Result<(), NotifyError>;
}

/// Fans events out to in-process subscribers such as the WebSocket bridge.
#[derive(Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<JobStatusEvent>,
}

impl BroadcastSink {
    pub fn new(tx: broadcast::Sender<JobStatusEvent>) -> Self {
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobStatusEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn name(&self) -> &str {
        "broadcast"
    }

    fn emit(&self, event: &JobStatusEvent) -> Result<(), NotifyError> {
        // No subscriber is not a failure
        let _ = self.tx.send(event.clone());
        Ok(())
    }
}

/// Writes every event to the log as JSON.
pub struct LogSink;

impl EventSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    fn emit(&self, event: &JobStatusEvent) -> Result<(), NotifyError> {
        let json = serde_json::to_string(event)?;
        tracing::info!(job_order_id = event.job_order_id(), "Job status event: {}", json);
        Ok(())
    }
}

/// Turns job changes into status events and hands them to every sink.
///
/// Delivery is best effort. A failing sink is logged and skipped; it never
/// affects the job that changed or the other sinks.
#[derive(Default, Clone)]
pub struct Notifier {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn status_event(snapshot: &JobSnapshot) -> JobStatusEvent {
        JobStatusEvent {
            job_order: snapshot.job_order.clone(),
            job_response: snapshot.response(),
            job_state: snapshot.state_records(),
            time: Utc::now(),
        }
    }

    pub fn notify(&self, snapshot: &JobSnapshot) {
        let event = Self::status_event(snapshot);
        for sink in &self.sinks {
            if let Err(e) = sink.emit(&event) {
                tracing::warn!(
                    "Failed to emit status of job order {} to {}: {}",
                    event.job_order_id(),
                    sink.name(),
                    e
                );
            }
        }
    }

    /// Consumes job changes until every sender is gone.
    pub async fn run(self, mut changes: ChangeReceiver) {
        tracing::info!("Notifier started with {} sink(s)", self.sinks.len());

        while let Some(snapshot) = changes.recv().await {
            self.notify(&snapshot);
        }

        tracing::info!("Job change channel closed, notifier stopping");
    }
}
