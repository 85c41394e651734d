//! Outbox relay: moves committed outbox records onto the broker.
//!
//! Three periodic activities run in one loop: publishing PENDING records,
//! retrying FAILED records that still have attempts left, and deleting old
//! PUBLISHED records. A record whose retry count reaches the limit stays
//! FAILED and is only surfaced through logs and metrics.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;

use events::topics::topic_for;

use crate::{Broker, OutboxRecord, OutboxStore, Result};

/// Tuning knobs for the relay loop.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How often PENDING records are scanned.
    pub poll_interval: Duration,
    /// How often FAILED records are re-attempted.
    pub retry_interval: Duration,
    /// How often old PUBLISHED records are deleted.
    pub cleanup_interval: Duration,
    /// Maximum records fetched per scan.
    pub batch_size: usize,
    /// Attempts before a FAILED record is parked for good.
    pub max_retries: i32,
    /// PUBLISHED records older than this are deleted.
    pub retention: chrono::Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            retry_interval: Duration::from_secs(30),
            cleanup_interval: Duration::from_secs(3600),
            batch_size: 100,
            max_retries: 3,
            retention: chrono::Duration::hours(24),
        }
    }
}

/// Outcome of a single relay pass, for tests and logging.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RelayPass {
    pub published: usize,
    pub failed: usize,
}

/// Publishes outbox records to a broker.
pub struct OutboxRelay<S, B> {
    store: S,
    broker: B,
    config: RelayConfig,
}

impl<S, B> OutboxRelay<S, B>
where
    S: OutboxStore,
    B: Broker,
{
    pub fn new(store: S, broker: B, config: RelayConfig) -> Self {
        Self {
            store,
            broker,
            config,
        }
    }

    /// Publishes all PENDING records, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn publish_pending(&self) -> Result<RelayPass> {
        let records = self.store.fetch_pending(self.config.batch_size).await?;
        self.publish_batch(records).await
    }

    /// Re-attempts FAILED records that have attempts left.
    #[tracing::instrument(skip(self))]
    pub async fn retry_failed(&self) -> Result<RelayPass> {
        let records = self
            .store
            .fetch_failed(self.config.max_retries, self.config.batch_size)
            .await?;
        self.publish_batch(records).await
    }

    /// Deletes PUBLISHED records older than the retention window.
    #[tracing::instrument(skip(self))]
    pub async fn cleanup(&self) -> Result<u64> {
        let cutoff = Utc::now() - self.config.retention;
        let deleted = self.store.delete_published_before(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, "cleaned up published outbox records");
        }
        Ok(deleted)
    }

    async fn publish_batch(&self, records: Vec<OutboxRecord>) -> Result<RelayPass> {
        let mut pass = RelayPass::default();

        for record in records {
            let topic = topic_for(&record.event_type);
            match self
                .broker
                .publish(topic, &record.aggregate_id, &record.payload)
                .await
            {
                Ok(()) => {
                    self.store.mark_published(record.id, Utc::now()).await?;
                    metrics::counter!("outbox_published_total").increment(1);
                    pass.published += 1;
                }
                Err(err) => {
                    self.store.mark_failed(record.id, &err.to_string()).await?;
                    metrics::counter!("outbox_publish_failures_total").increment(1);
                    pass.failed += 1;
                    if record.retry_count + 1 >= self.config.max_retries {
                        tracing::error!(
                            record_id = %record.id,
                            event_type = %record.event_type,
                            error = %err,
                            "outbox record exhausted retries, parked as FAILED"
                        );
                    } else {
                        tracing::warn!(
                            record_id = %record.id,
                            event_type = %record.event_type,
                            error = %err,
                            "outbox publish failed, will retry"
                        );
                    }
                }
            }
        }

        Ok(pass)
    }

    /// Runs the relay until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        let mut retry = tokio::time::interval(self.config.retry_interval);
        let mut cleanup = tokio::time::interval(self.config.cleanup_interval);

        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(err) = self.publish_pending().await {
                        tracing::error!(error = %err, "outbox publish pass failed");
                    }
                }
                _ = retry.tick() => {
                    if let Err(err) = self.retry_failed().await {
                        tracing::error!(error = %err, "outbox retry pass failed");
                    }
                }
                _ = cleanup.tick() => {
                    if let Err(err) = self.cleanup().await {
                        tracing::error!(error = %err, "outbox cleanup pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("outbox relay shutting down");
                        break;
                    }
                }
            }
        }
    }
}
