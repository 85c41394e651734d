//! Payments-side workflow handler.
//!
//! Authorizes on `OrderCreated` and runs the reversal compensation when
//! `OrderCancelled` arrives for an order whose payment already cleared.

use std::sync::Arc;

use async_trait::async_trait;
use events::{DomainEvent, ORDER_EVENTS};
use messaging::{EventHandler, HandlerError, OutboxStore};

use crate::error::PaymentError;
use crate::gateway::PaymentGateway;
use crate::service::PaymentService;
use crate::store::PaymentStore;

/// Consumer group for the payments handler.
pub const PAYMENTS_CONSUMER: &str = "payments-consumer";

pub struct PaymentEventHandler<S, O, G> {
    service: Arc<PaymentService<S, O, G>>,
}

impl<S, O, G> PaymentEventHandler<S, O, G>
where
    S: PaymentStore,
    O: OutboxStore,
    G: PaymentGateway,
{
    pub fn new(service: Arc<PaymentService<S, O, G>>) -> Self {
        Self { service }
    }
}

fn map_error(err: PaymentError) -> HandlerError {
    match err {
        PaymentError::Conflict(_) | PaymentError::Messaging(_) => {
            HandlerError::Transient(err.to_string())
        }
        other => HandlerError::Permanent(other.to_string()),
    }
}

#[async_trait]
impl<S, O, G> EventHandler for PaymentEventHandler<S, O, G>
where
    S: PaymentStore,
    O: OutboxStore,
    G: PaymentGateway,
{
    fn consumer_name(&self) -> &str {
        PAYMENTS_CONSUMER
    }

    fn topics(&self) -> Vec<&'static str> {
        vec![ORDER_EVENTS]
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        match event {
            DomainEvent::OrderCreated(data) => {
                self.service
                    .authorize_payment(data.order_id, data.total_amount, data.currency.clone())
                    .await
                    .map_err(map_error)?;
            }
            DomainEvent::OrderCancelled(data) => {
                self.service
                    .reverse_for_order(data.order_id, &data.reason)
                    .await
                    .map_err(map_error)?;
            }
            // Completion needs nothing from payments.
            DomainEvent::OrderCompleted(_) => {}
            // This service's own emissions plus inventory outcomes, none on
            // the subscribed topic.
            DomainEvent::PaymentAuthorized(_)
            | DomainEvent::PaymentDeclined(_)
            | DomainEvent::PaymentReversed(_)
            | DomainEvent::InventoryReserved(_)
            | DomainEvent::InventoryInsufficient(_)
            | DomainEvent::InventoryReleased(_) => {}
        }
        Ok(())
    }
}
