//! Vendor orders read model: each vendor's slice of every order it sells into.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::AggregateId;
use domain::{Money, OrderEvent, OrderLine, OrderNumber, OrderStatus, PaymentStatus, VendorId};
use event_store::RecordedEvent;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::{ProjectionError, Result};
use crate::projection::{Projection, ProjectionPosition, ReadModel};

/// One order as seen by one vendor: only that vendor's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorOrderSummary {
    pub order_id: AggregateId,
    pub order_number: OrderNumber,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub lines: Vec<OrderLine>,
    /// Sum of this vendor's line totals.
    pub subtotal: Money,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct VendorOrdersState {
    vendors: HashMap<VendorId, HashMap<AggregateId, VendorOrderSummary>>,
    order_vendors: HashMap<AggregateId, Vec<VendorId>>,
    position: ProjectionPosition,
}

impl VendorOrdersState {
    fn update(&mut self, order_id: AggregateId, mut change: impl FnMut(&mut VendorOrderSummary)) {
        let Some(vendors) = self.order_vendors.get(&order_id) else {
            return;
        };
        for vendor_id in vendors {
            if let Some(summary) = self
                .vendors
                .get_mut(vendor_id)
                .and_then(|orders| orders.get_mut(&order_id))
            {
                change(summary);
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct VendorOrdersView {
    state: Arc<RwLock<VendorOrdersState>>,
}

impl VendorOrdersView {
    pub fn new() -> Self {
        Self::default()
    }

    /// The vendor's orders, newest first, optionally restricted to one status.
    pub async fn orders_for_vendor(
        &self,
        vendor_id: VendorId,
        status: Option<OrderStatus>,
    ) -> Vec<VendorOrderSummary> {
        let state = self.state.read().await;
        let mut orders: Vec<VendorOrderSummary> = state
            .vendors
            .get(&vendor_id)
            .into_iter()
            .flat_map(|orders| orders.values())
            .filter(|summary| status.is_none_or(|wanted| summary.status == wanted))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        orders
    }

    pub async fn get(
        &self,
        vendor_id: VendorId,
        order_id: AggregateId,
    ) -> Option<VendorOrderSummary> {
        self.state
            .read()
            .await
            .vendors
            .get(&vendor_id)
            .and_then(|orders| orders.get(&order_id))
            .cloned()
    }
}

#[async_trait]
impl Projection for VendorOrdersView {
    fn name(&self) -> &'static str {
        "VendorOrdersView"
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
        let at = event.timestamp;

        let mut state = self.state.write().await;

        match order_event {
            OrderEvent::OrderPlaced(data) => {
                let mut by_vendor: HashMap<VendorId, Vec<OrderLine>> = HashMap::new();
                for line in data.lines {
                    by_vendor.entry(line.vendor_id).or_default().push(line);
                }

                let vendor_ids: Vec<VendorId> = by_vendor.keys().copied().collect();
                for (vendor_id, lines) in by_vendor {
                    let subtotal = lines.iter().map(|line| line.line_total).sum();
                    state.vendors.entry(vendor_id).or_default().insert(
                        order_id,
                        VendorOrderSummary {
                            order_id,
                            order_number: data.order_number.clone(),
                            status: OrderStatus::Placed,
                            payment_status: PaymentStatus::Pending,
                            lines,
                            subtotal,
                            placed_at: data.placed_at,
                            updated_at: data.placed_at,
                        },
                    );
                }
                state.order_vendors.insert(order_id, vendor_ids);
            }
            OrderEvent::FulfillmentAdvanced(data) => {
                state.update(order_id, |summary| {
                    summary.status = data.to;
                    summary.updated_at = data.at;
                });
            }
            OrderEvent::PaymentRecorded(data) => {
                state.update(order_id, |summary| {
                    summary.payment_status = PaymentStatus::Paid;
                    if data.confirmed {
                        summary.status = OrderStatus::Confirmed;
                    }
                    summary.updated_at = data.recorded_at;
                });
            }
            OrderEvent::OrderCancelled(data) => {
                state.update(order_id, |summary| {
                    summary.status = OrderStatus::Cancelled;
                    if data.payment_failed {
                        summary.payment_status = PaymentStatus::Failed;
                    }
                    summary.updated_at = at;
                });
            }
        }

        state.position = state.position.advance_to(recorded.sequence);
        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        self.state.read().await.position
    }

    async fn reset(&self) -> Result<()> {
        *self.state.write().await = VendorOrdersState::default();
        Ok(())
    }
}

impl ReadModel for VendorOrdersView {
    fn name(&self) -> &'static str {
        "VendorOrdersView"
    }

    /// Number of vendors with at least one order.
    fn count(&self) -> usize {
        self.state
            .try_read()
            .map(|state| state.vendors.len())
            .unwrap_or(0)
    }
}
