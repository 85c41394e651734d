//! Payment service: authorization and reversal.

use common::{Currency, Money, OrderId, PaymentId};
use events::DomainEvent;
use messaging::{OutboxRecord, OutboxStore};

use crate::error::{PaymentError, Result};
use crate::gateway::{GatewayDecision, PaymentGateway};
use crate::payment::{Payment, PaymentStatus};
use crate::store::PaymentStore;

pub struct PaymentService<S, O, G> {
    store: S,
    outbox: O,
    gateway: G,
}

impl<S, O, G> PaymentService<S, O, G>
where
    S: PaymentStore,
    O: OutboxStore,
    G: PaymentGateway,
{
    pub fn new(store: S, outbox: O, gateway: G) -> Self {
        Self {
            store,
            outbox,
            gateway,
        }
    }

    /// Authorizes a payment for an order.
    ///
    /// Creates the payment in `Pending`, consults the gateway, and persists
    /// the outcome together with its event in one unit of work. If a
    /// non-reversed payment already exists for the order, it is returned
    /// instead of charging twice.
    #[tracing::instrument(skip(self), fields(order_id = %order_id, amount = %amount))]
    pub async fn authorize_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: Currency,
    ) -> Result<Payment> {
        if let Some(existing) = self
            .store
            .find_by_order(order_id)
            .await?
            .into_iter()
            .find(|p| p.status != PaymentStatus::Reversed)
        {
            return Ok(existing);
        }

        let mut payment = Payment::new(order_id, amount, currency.clone());
        self.store.insert(payment.clone()).await?;

        let event = match self.gateway.authorize(order_id, amount, &currency) {
            GatewayDecision::Approved => {
                payment.transition_to(PaymentStatus::Authorized)?;
                metrics::counter!("payments_authorized").increment(1);
                tracing::info!(payment_id = %payment.id, "payment authorized");
                DomainEvent::payment_authorized(order_id, payment.id, amount)
            }
            GatewayDecision::Declined(reason) => {
                payment.transition_to(PaymentStatus::Declined)?;
                metrics::counter!("payments_declined").increment(1);
                tracing::info!(payment_id = %payment.id, reason, "payment declined");
                DomainEvent::payment_declined(order_id, payment.id, reason, amount)
            }
        };

        let payment = self.store.update(&payment).await?;
        self.outbox.enqueue(OutboxRecord::for_event(&event)?).await?;
        Ok(payment)
    }

    /// Reverses an authorized payment.
    #[tracing::instrument(skip(self))]
    pub async fn reverse_payment(&self, payment_id: PaymentId, reason: &str) -> Result<Payment> {
        let mut payment = self
            .store
            .find(payment_id)
            .await?
            .ok_or(PaymentError::NotFound(payment_id))?;

        payment.transition_to(PaymentStatus::Reversed)?;
        let payment = self.store.update(&payment).await?;

        let event = DomainEvent::payment_reversed(payment.order_id, payment.id, payment.amount);
        self.outbox.enqueue(OutboxRecord::for_event(&event)?).await?;

        metrics::counter!("payments_reversed").increment(1);
        tracing::info!(payment_id = %payment.id, reason, "payment reversed");
        Ok(payment)
    }

    /// Reverses every still-authorized payment for an order.
    ///
    /// This is the compensation run when the order is cancelled after funds
    /// cleared. Payments in any other status are left alone, so the run is
    /// idempotent.
    #[tracing::instrument(skip(self))]
    pub async fn reverse_for_order(&self, order_id: OrderId, reason: &str) -> Result<Vec<Payment>> {
        let mut reversed = Vec::new();
        for payment in self.store.find_by_order(order_id).await? {
            if payment.status == PaymentStatus::Authorized {
                reversed.push(self.reverse_payment(payment.id, reason).await?);
            }
        }
        Ok(reversed)
    }

    pub async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<Payment>> {
        self.store.find(payment_id).await
    }

    pub async fn payments_by_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        self.store.find_by_order(order_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use messaging::InMemoryOutboxStore;

    use crate::gateway::DeterministicGateway;
    use crate::store::InMemoryPaymentStore;

    type Service = PaymentService<InMemoryPaymentStore, InMemoryOutboxStore, DeterministicGateway>;

    fn setup() -> (Service, InMemoryOutboxStore) {
        let outbox = InMemoryOutboxStore::new();
        let service = PaymentService::new(
            InMemoryPaymentStore::new(),
            outbox.clone(),
            DeterministicGateway,
        );
        (service, outbox)
    }

    #[tokio::test]
    async fn authorization_success_outboxes_event() {
        let (service, outbox) = setup();
        let order_id = OrderId::new();

        let payment = service
            .authorize_payment(order_id, Money::from_cents(15100), Currency::usd())
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Authorized);
        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_type, "PaymentAuthorized");
    }

    #[tokio::test]
    async fn over_limit_amount_is_declined() {
        let (service, outbox) = setup();

        let payment = service
            .authorize_payment(OrderId::new(), Money::from_cents(1_000_001), Currency::usd())
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Declined);
        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending[0].event_type, "PaymentDeclined");
        assert_eq!(pending[0].payload["reason"], "amount exceeds limit");
    }

    #[tokio::test]
    async fn duplicate_authorization_returns_existing_payment() {
        let (service, outbox) = setup();
        let order_id = OrderId::new();

        let first = service
            .authorize_payment(order_id, Money::from_cents(5000), Currency::usd())
            .await
            .unwrap();
        let second = service
            .authorize_payment(order_id, Money::from_cents(5000), Currency::usd())
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(outbox.fetch_pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn reverse_only_from_authorized() {
        let (service, _outbox) = setup();

        let declined = service
            .authorize_payment(OrderId::new(), Money::zero(), Currency::usd())
            .await
            .unwrap();
        assert_eq!(declined.status, PaymentStatus::Declined);

        let result = service.reverse_payment(declined.id, "compensation").await;
        assert!(matches!(
            result,
            Err(PaymentError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn reverse_for_order_compensates_authorized_payments() {
        let (service, outbox) = setup();
        let order_id = OrderId::new();
        service
            .authorize_payment(order_id, Money::from_cents(5000), Currency::usd())
            .await
            .unwrap();

        let reversed = service
            .reverse_for_order(order_id, "order cancelled")
            .await
            .unwrap();

        assert_eq!(reversed.len(), 1);
        assert_eq!(reversed[0].status, PaymentStatus::Reversed);
        let pending = outbox.fetch_pending(10).await.unwrap();
        assert_eq!(pending[1].event_type, "PaymentReversed");
    }

    #[tokio::test]
    async fn reverse_for_order_is_idempotent() {
        let (service, outbox) = setup();
        let order_id = OrderId::new();
        service
            .authorize_payment(order_id, Money::from_cents(5000), Currency::usd())
            .await
            .unwrap();

        service.reverse_for_order(order_id, "cancel").await.unwrap();
        let second = service.reverse_for_order(order_id, "cancel").await.unwrap();

        assert!(second.is_empty());
        assert_eq!(outbox.fetch_pending(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reverse_unknown_payment_is_not_found() {
        let (service, _outbox) = setup();
        let result = service.reverse_payment(PaymentId::new(), "x").await;
        assert!(matches!(result, Err(PaymentError::NotFound(_))));
    }
}
