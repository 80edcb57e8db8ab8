//! Customer orders read model: the order list behind a customer's history page.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{CustomerId, Money, OrderEvent, OrderNumber, OrderStatus, PaymentStatus};
use event_store::RecordedEvent;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{ProjectionError, Result};
use crate::projection::{Projection, ProjectionPosition, ReadModel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CustomerOrderSummary {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub item_count: u32,
    pub total: Money,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct CustomerOrdersState {
    customers: HashMap<CustomerId, Vec<AggregateId>>,
    orders: HashMap<AggregateId, CustomerOrderSummary>,
    position: ProjectionPosition,
}

/// Per-customer order summaries, kept current from order events.
#[derive(Clone, Default)]
pub struct CustomerOrdersView {
    state: Arc<RwLock<CustomerOrdersState>>,
}

impl CustomerOrdersView {
    pub fn new() -> Self {
        Self::default()
    }

    /// The customer's orders, newest first.
    pub async fn orders_for_customer(&self, customer_id: CustomerId) -> Vec<CustomerOrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<CustomerOrderSummary> = state
            .customers
            .get(&customer_id)
            .into_iter()
            .flatten()
            .filter_map(|order_id| state.orders.get(order_id))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        orders
    }

    pub async fn get(&self, order_id: AggregateId) -> Option<CustomerOrderSummary> {
        self.state.read().await.orders.get(&order_id).cloned()
    }
}

#[async_trait]
impl Projection for CustomerOrdersView {
    fn name(&self) -> &'static str {
        "CustomerOrdersView"
    }

    async fn handle(&self, recorded: &RecordedEvent) -> Result<()> {
        let event = &recorded.event;
        if event.aggregate_type != "Order" {
            let mut state = self.state.write().await;
            state.position = state.position.advance_to(recorded.sequence);
            return Ok(());
        }

        let order_event: OrderEvent = serde_json::from_value(event.payload.clone())
            .map_err(|source| ProjectionError::payload(event, source))?;
        let order_id = event.aggregate_id;

        let mut state = self.state.write().await;

        match order_event {
            OrderEvent::OrderPlaced(data) => {
                let summary = CustomerOrderSummary {
                    order_id,
                    order_number: data.order_number,
                    status: OrderStatus::Placed,
                    payment_status: PaymentStatus::Pending,
                    item_count: data.lines.iter().map(|line| line.quantity).sum(),
                    total: data.pricing.total,
                    placed_at: data.placed_at,
                    updated_at: data.placed_at,
                };
                state.orders.insert(order_id, summary);
                state
                    .customers
                    .entry(data.customer_id)
                    .or_default()
                    .push(order_id);
            }
            OrderEvent::FulfillmentAdvanced(data) => {
                if let Some(summary) = state.orders.get_mut(&order_id) {
                    summary.status = data.to;
                    summary.updated_at = data.at;
                }
            }
            OrderEvent::PaymentRecorded(data) => {
                if let Some(summary) = state.orders.get_mut(&order_id) {
                    summary.payment_status = PaymentStatus::Paid;
                    if data.confirmed {
                        summary.status = OrderStatus::Confirmed;
                    }
                    summary.updated_at = data.recorded_at;
                }
            }
            OrderEvent::OrderCancelled(data) => {
                if let Some(summary) = state.orders.get_mut(&order_id) {
                    summary.status = OrderStatus::Cancelled;
                    if data.payment_failed {
                        summary.payment_status = PaymentStatus::Failed;
                    }
                    summary.updated_at = data.cancelled_at;
                }
            }
        }

        state.position = state.position.advance_to(recorded.sequence);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = CustomerOrdersState::default();
        Ok(())
    }
}

impl ReadModel for CustomerOrdersView {
    fn name(&self) -> &'static str {
        "CustomerOrdersView"
    }

    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|state| state.orders.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::test_support::{cancelled, envelope, placed_for};
    use domain::{OrderLine, PaymentRecordedData, ProductId, VendorId};

    fn lines() -> Vec<OrderLine> {
        vec![
            OrderLine::new(
                ProductId::new("CAT-TREE"),
                VendorId::new(),
                "Cat tree",
                1,
                Money::from_cents(8_999),
            ),
            OrderLine::new(
                ProductId::new("CATNIP"),
                VendorId::new(),
                "Catnip pouch",
                3,
                Money::from_cents(499),
            ),
        ]
    }

    #[tokio::test]
    async fn lists_orders_newest_first() {
        let view = CustomerOrdersView::new();
        let customer = CustomerId::new();
        let (first, second) = (AggregateId::new(), AggregateId::new());

        view.handle(&envelope(first, 1, &placed_for(first, customer, lines())))
            .await
            .unwrap();
        view.handle(&envelope(second, 1, &placed_for(second, customer, lines())))
            .await
            .unwrap();
        view.handle(&envelope(
            AggregateId::new(),
            1,
            &placed_for(AggregateId::new(), CustomerId::new(), lines()),
        ))
        .await
        .unwrap();

        let orders = view.orders_for_customer(customer).await;
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].order_id, second);
        assert_eq!(orders[1].order_id, first);
        assert_eq!(orders[0].item_count, 4);
        assert_eq!(view.count(), 3);
    }

    #[tokio::test]
    async fn total_matches_priced_order() {
        let view = CustomerOrdersView::new();
        let order_id = AggregateId::new();
        let event = placed_for(order_id, CustomerId::new(), lines());
        let OrderEvent::OrderPlaced(data) = &event else {
            unreachable!()
        };
        let expected = data.pricing.total;

        view.handle(&envelope(order_id, 1, &event)).await.unwrap();
        assert_eq!(view.get(order_id).await.unwrap().total, expected);
    }

    #[tokio::test]
    async fn payment_then_cancel() {
        let view = CustomerOrdersView::new();
        let order_id = AggregateId::new();
        view.handle(&envelope(
            order_id,
            1,
            &placed_for(order_id, CustomerId::new(), lines()),
        ))
        .await
        .unwrap();

        let paid = OrderEvent::PaymentRecorded(PaymentRecordedData {
            intent_id: AggregateId::new(),
            provider_reference: "PAYID-7".into(),
            amount: Money::from_cents(1),
            confirmed: true,
            recorded_at: Utc::now(),
        });
        view.handle(&envelope(order_id, 2, &paid)).await.unwrap();
        let summary = view.get(order_id).await.unwrap();
        assert_eq!(summary.status, OrderStatus::Confirmed);
        assert_eq!(summary.payment_status, PaymentStatus::Paid);

        view.handle(&envelope(order_id, 3, &cancelled(false)))
            .await
            .unwrap();
        let summary = view.get(order_id).await.unwrap();
        assert_eq!(summary.status, OrderStatus::Cancelled);
        assert_eq!(summary.payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn unknown_customer_is_empty() {
        let view = CustomerOrdersView::new();
        assert!(view.orders_for_customer(CustomerId::new()).await.is_empty());
        assert_eq!(view.position().await, ProjectionPosition::zero());
    }
}
