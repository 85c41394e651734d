//! Polling event consumer with claim-before-side-effects deduplication.
//!
//! Each handler runs in its own consumer group. For every delivery the
//! consumer decodes the payload, claims the dedup key, and only then invokes
//! the handler. A transient handler error is retried in-process a bounded
//! number of times; a permanent error drops the delivery after logging it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use events::DomainEvent;

use crate::{Broker, Delivery, IdempotencyStore, IdempotentConsumer, Result};

/// Error a handler reports back to the consumer loop.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// Worth retrying shortly, e.g. a dependency was briefly unavailable.
    #[error("transient: {0}")]
    Transient(String),
    /// Retrying cannot help. The delivery is dropped after logging.
    #[error("permanent: {0}")]
    Permanent(String),
}

/// A domain event handler, one per consumer group.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Consumer group name. Also the idempotency scope.
    fn consumer_name(&self) -> &str;

    /// Topics this handler subscribes to.
    fn topics(&self) -> Vec<&'static str>;

    async fn handle(&self, event: &DomainEvent) -> std::result::Result<(), HandlerError>;
}

/// Tuning knobs for a consumer loop.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// How often the broker is polled.
    pub poll_interval: Duration,
    /// Maximum deliveries per poll.
    pub batch_size: usize,
    /// In-process attempts for a transient handler error.
    pub max_handler_attempts: u32,
    /// Backoff between transient attempts.
    pub retry_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 50,
            max_handler_attempts: 3,
            retry_backoff: Duration::from_millis(100),
        }
    }
}

/// Drives one handler from the broker.
pub struct EventConsumer<B, S> {
    broker: B,
    idempotency: IdempotentConsumer<S>,
    handler: Arc<dyn EventHandler>,
    config: ConsumerConfig,
}

impl<B, S> EventConsumer<B, S>
where
    B: Broker,
    S: IdempotencyStore,
{
    pub fn new(
        broker: B,
        idempotency: IdempotentConsumer<S>,
        handler: Arc<dyn EventHandler>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            broker,
            idempotency,
            handler,
            config,
        }
    }

    /// Polls the broker once and processes the batch. Returns the number of
    /// deliveries handed to the handler.
    ///
    /// Each delivery's offset is committed only after it was processed, so
    /// an infrastructure error mid-batch leaves the failed delivery and
    /// everything behind it uncommitted for redelivery on the next poll.
    pub async fn poll_once(&self) -> Result<usize> {
        let topics = self.handler.topics();
        let group = self.handler.consumer_name();
        let deliveries = self
            .broker
            .poll(group, &topics, self.config.batch_size)
            .await?;

        let mut handled = 0;
        for delivery in deliveries {
            if self.process(&delivery).await? {
                handled += 1;
            }
            self.broker
                .commit(group, &delivery.topic, delivery.offset + 1)
                .await?;
        }
        Ok(handled)
    }

    async fn process(&self, delivery: &Delivery) -> Result<bool> {
        let consumer = self.handler.consumer_name();

        let event = match DomainEvent::decode(&delivery.payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                // Unknown event type. Forward compatibility: skip quietly.
                tracing::debug!(
                    consumer,
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    "skipping unrecognized event type"
                );
                return Ok(false);
            }
            Err(err) => {
                tracing::error!(
                    consumer,
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    error = %err,
                    "dropping malformed event payload"
                );
                metrics::counter!("consumer_malformed_payloads").increment(1);
                return Ok(false);
            }
        };

        // Claim before side effects. A crash after this point means the
        // delivery is never reprocessed, which the workflow tolerates
        // because every downstream handler is status-guarded.
        let fresh = self
            .idempotency
            .should_process(consumer, &delivery.topic, &delivery.key, delivery.offset)
            .await?;
        if !fresh {
            return Ok(false);
        }

        self.handle_with_retry(&event).await;
        Ok(true)
    }

    async fn handle_with_retry(&self, event: &DomainEvent) {
        let consumer = self.handler.consumer_name();

        for attempt in 1..=self.config.max_handler_attempts {
            match self.handler.handle(event).await {
                Ok(()) => {
                    metrics::counter!("consumer_events_handled").increment(1);
                    return;
                }
                Err(HandlerError::Permanent(reason)) => {
                    tracing::error!(
                        consumer,
                        event_type = event.event_type(),
                        order_id = %event.order_id(),
                        reason,
                        "handler rejected event permanently"
                    );
                    metrics::counter!("consumer_events_rejected").increment(1);
                    return;
                }
                Err(HandlerError::Transient(reason)) => {
                    if attempt == self.config.max_handler_attempts {
                        tracing::error!(
                            consumer,
                            event_type = event.event_type(),
                            order_id = %event.order_id(),
                            reason,
                            attempt,
                            "handler attempts exhausted, dropping event"
                        );
                        metrics::counter!("consumer_events_dropped").increment(1);
                        return;
                    }
                    tracing::warn!(
                        consumer,
                        event_type = event.event_type(),
                        order_id = %event.order_id(),
                        reason,
                        attempt,
                        "transient handler error, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff).await;
                }
            }
        }
    }

    /// Runs the poll loop until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut poll = tokio::time::interval(self.config.poll_interval);
        loop {
            tokio::select! {
                _ = poll.tick() => {
                    if let Err(err) = self.poll_once().await {
                        tracing::error!(
                            consumer = self.handler.consumer_name(),
                            error = %err,
                            "consumer poll failed"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!(
                            consumer = self.handler.consumer_name(),
                            "consumer shutting down"
                        );
                        break;
                    }
                }
            }
        }
    }
}
