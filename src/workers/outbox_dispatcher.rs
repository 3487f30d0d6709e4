//! The outbox dispatcher (C4): claims due events in one transaction,
//! publishes them to the broker or bulk-indexes them into the search index,
//! and updates status with backoff — one small transaction per event.
//!
//! Modeled on the teacher's `TaskManager` interval-loop task shape
//! (`tasks/mod.rs`), generalized from a fixed-tick timer to a
//! claim-or-sleep cycle since outbox drains should react immediately when
//! work is available rather than waiting out a full interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::server::OutboxConfig;
use crate::db::{Repository, RepositoryError};
use crate::domain::{OutboxEvent, Patch, ProcessingStatus};
use crate::messaging::{EventEnvelope, Publisher};
use crate::search::{AuditDocument, SearchIndexWriter};

use super::metrics::WorkerMetrics;

const AUDIT_EVENT_TYPE: &str = "http_audit_log";

pub struct OutboxDispatcher {
    repo: Repository,
    publisher: Arc<dyn Publisher>,
    search: Arc<SearchIndexWriter>,
    config: OutboxConfig,
    worker_id: String,
    routing_descriptor: String,
    metrics: Arc<WorkerMetrics>,
}

impl OutboxDispatcher {
    pub fn new(
        repo: Repository,
        publisher: Arc<dyn Publisher>,
        search: Arc<SearchIndexWriter>,
        config: OutboxConfig,
        worker_id: String,
        routing_descriptor: String,
        metrics: Arc<WorkerMetrics>,
    ) -> Self {
        Self { repo, publisher, search, config, worker_id, routing_descriptor, metrics }
    }

    /// Runs the claim-dispatch-update loop until the process exits. Never
    /// returns; spawn it with `tokio::spawn`.
    pub async fn run(self) {
        info!(worker_id = %self.worker_id, "outbox dispatcher started");
        loop {
            match self.tick().await {
                Ok(0) => tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await,
                Ok(n) => self.metrics.add_processed_items("outbox_dispatcher", n),
                Err(err) => {
                    error!(error = %err, "outbox dispatcher tick failed");
                    self.metrics.record_error("outbox_dispatcher");
                    tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
                }
            }
        }
    }

    async fn tick(&self) -> Result<usize, RepositoryError> {
        let now = Utc::now();
        let lock_cutoff = now - chrono::Duration::seconds(self.config.lock_timeout_seconds);

        let mut tx = self.repo.begin().await?;
        let claimed = self
            .repo
            .claim_outbox_events(&mut tx, now, lock_cutoff, &self.worker_id, self.config.batch_size, None)
            .await?;
        tx.commit().await?;

        if claimed.is_empty() {
            return Ok(0);
        }

        let count = claimed.len();
        let (audit, broker): (Vec<OutboxEvent>, Vec<OutboxEvent>) =
            claimed.into_iter().partition(|e| e.event_type == AUDIT_EVENT_TYPE);

        self.dispatch_audit(audit).await;
        self.dispatch_broker(broker).await;
        Ok(count)
    }

    async fn dispatch_audit(&self, events: Vec<OutboxEvent>) {
        if events.is_empty() {
            return;
        }
        let documents: Vec<AuditDocument> = events
            .iter()
            .map(|e| AuditDocument { id: e.id.clone(), timestamp: e.created_at, source: e.payload.clone() })
            .collect();

        match self.search.bulk_index_audit(&documents).await {
            Ok(results) => {
                for (event, result) in events.iter().zip(results.iter()) {
                    if result.success {
                        self.mark_published(event, false).await;
                    } else {
                        let reason = result.error.clone().unwrap_or_else(|| "bulk index item failed".to_string());
                        self.mark_failed(event, &reason).await;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, count = events.len(), "bulk audit index failed for whole chunk");
                for event in &events {
                    self.mark_failed(event, &err.to_string()).await;
                }
            }
        }
    }

    async fn dispatch_broker(&self, events: Vec<OutboxEvent>) {
        for event in &events {
            let envelope = EventEnvelope {
                event_name: event.event_type.clone(),
                timestamp_utc: event.created_at,
                correlation_id: event.correlation_id.clone(),
                message_id: event.message_id.clone(),
                payload: event.payload.clone(),
            };

            if self.publisher.publish_event(&envelope).await {
                self.mark_published(event, true).await;
            } else {
                self.mark_failed(event, "broker publish failed").await;
            }
        }
    }

    async fn mark_published(&self, event: &OutboxEvent, update_processing: bool) {
        let now = Utc::now();
        if let Err(err) = self.repo.mark_outbox_published(self.repo.pool(), &event.id, now).await {
            error!(error = %err, event_id = %event.id, "failed to mark outbox event published");
            self.metrics.record_error("outbox_dispatcher");
            return;
        }

        if update_processing {
            if let Err(err) = self
                .repo
                .update_processing(
                    self.repo.pool(),
                    &event.message_id,
                    Some(ProcessingStatus::Queued),
                    Patch::from(self.routing_descriptor.clone()),
                    Patch::Unset,
                    Patch::Unset,
                    Patch::Unset,
                    Patch::Unset,
                    Patch::Unset,
                    now,
                )
                .await
            {
                warn!(error = %err, message_id = %event.message_id, "failed to mark processing queued");
            }
        }
    }

    async fn mark_failed(&self, event: &OutboxEvent, reason: &str) {
        self.metrics.record_error("outbox_dispatcher");
        let now = Utc::now();
        let attempts = event.attempts.max(1);
        let backoff = backoff_seconds(attempts);
        let next_available_at = now + chrono::Duration::seconds(backoff);

        if let Err(err) = self
            .repo
            .mark_outbox_failed(self.repo.pool(), &event.id, now, next_available_at, reason)
            .await
        {
            error!(error = %err, event_id = %event.id, "failed to mark outbox event failed");
        }
    }
}

fn backoff_seconds(attempts: i32) -> i64 {
    match attempts {
        1 => 1,
        2 => 5,
        3 => 15,
        _ => 60,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_escalates_then_caps_at_60() {
        assert_eq!(backoff_seconds(1), 1);
        assert_eq!(backoff_seconds(2), 5);
        assert_eq!(backoff_seconds(3), 15);
        assert_eq!(backoff_seconds(4), 60);
        assert_eq!(backoff_seconds(99), 60);
    }
}
