//! Payment persistence trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{OrderId, PaymentId};
use tokio::sync::RwLock;

use crate::error::{PaymentError, Result};
use crate::payment::Payment;

/// Storage boundary for the payment aggregate.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<()>;

    async fn find(&self, id: PaymentId) -> Result<Option<Payment>>;

    /// Every payment created for the order, oldest first.
    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>>;

    /// Persists `payment` and returns the copy with the bumped version.
    async fn update(&self, payment: &Payment) -> Result<Payment>;
}

/// In-memory payment store.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<PaymentId, Payment>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored payments.
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, payment: Payment) -> Result<()> {
        self.payments.write().await.insert(payment.id, payment);
        Ok(())
    }

    async fn find(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(&id).cloned())
    }

    async fn find_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let payments = self.payments.read().await;
        let mut matching: Vec<_> = payments
            .values()
            .filter(|p| p.order_id == order_id)
            .cloned()
            .collect();
        matching.sort_by_key(|p| p.created_at);
        Ok(matching)
    }

    async fn update(&self, payment: &Payment) -> Result<Payment> {
        let mut payments = self.payments.write().await;
        let stored = payments
            .get_mut(&payment.id)
            .ok_or(PaymentError::NotFound(payment.id))?;

        if stored.version != payment.version {
            return Err(PaymentError::Conflict(payment.id));
        }

        let mut updated = payment.clone();
        updated.version += 1;
        *stored = updated.clone();
        Ok(updated)
    }
}
