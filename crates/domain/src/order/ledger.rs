//! The order ledger: placement, cancellation, fulfillment and payment
//! recording, each serialized per order.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use common::{AggregateId, KeyedLocks};
use event_store::EventStore;

use crate::aggregate::Aggregate;
use crate::catalog::{Catalog, CatalogError};
use crate::command::{Command, CommandHandler};
use crate::error::DomainError;
use crate::pricing::PricingPolicy;

use super::{
    AdvanceFulfillment, CancelOrder, CreateOrder, Currency, CustomerId, Order, OrderError,
    OrderEvent, OrderLine, OrderNumber, OrderPlacedData, OrderStatus, PaymentStatus,
    RecordPayment,
};

/// Result of [`OrderLedger::create_order`].
#[derive(Debug, Clone)]
pub struct Placement {
    pub order: Order,
    /// The idempotency key had already produced this order.
    pub replayed: bool,
}

#[derive(Debug, Default)]
struct LedgerIndex {
    by_number: HashMap<OrderNumber, AggregateId>,
    by_idempotency_key: HashMap<(CustomerId, String), AggregateId>,
}

impl LedgerIndex {
    fn record(&mut self, data: &OrderPlacedData) {
        self.by_number
            .insert(data.order_number.clone(), data.order_id);
        self.by_idempotency_key.insert(
            (data.customer_id, data.idempotency_key.clone()),
            data.order_id,
        );
    }
}

/// Owns every order and its state machine.
///
/// Orders are event-sourced through [`CommandHandler`]. Lookups by order
/// number and idempotency key use an in-memory index rebuilt by
/// [`OrderLedger::hydrate`].
pub struct OrderLedger<S: EventStore> {
    handler: CommandHandler<S, Order>,
    catalog: Arc<dyn Catalog>,
    pricing: PricingPolicy,
    currency: Currency,
    order_locks: KeyedLocks<AggregateId>,
    placement_locks: KeyedLocks<CustomerId>,
    index: RwLock<LedgerIndex>,
}

impl<S: EventStore> OrderLedger<S> {
    pub fn new(
        store: S,
        catalog: Arc<dyn Catalog>,
        pricing: PricingPolicy,
        currency: Currency,
    ) -> Self {
        Self {
            handler: CommandHandler::new(store),
            catalog,
            pricing,
            currency,
            order_locks: KeyedLocks::new(),
            placement_locks: KeyedLocks::new(),
            index: RwLock::new(LedgerIndex::default()),
        }
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    pub fn currency(&self) -> &Currency {
        &self.currency
    }

    /// Rebuilds the lookup index from stored `OrderPlaced` events and
    /// returns the number of orders found.
    pub async fn hydrate(&self) -> Result<usize, DomainError> {
        let envelopes = self.handler.store().get_events_by_type("OrderPlaced").await?;

        let mut index = LedgerIndex::default();
        for envelope in envelopes {
            let event: OrderEvent = serde_json::from_value(envelope.payload)?;
            if let OrderEvent::OrderPlaced(data) = event {
                index.record(&data);
            }
        }

        let count = index.by_number.len();
        *self.index_mut() = index;
        tracing::info!(orders = count, "order index hydrated");
        Ok(count)
    }

    /// Validates and prices the snapshot, takes stock for every line and
    /// records the order as `Placed`.
    ///
    /// Stock is taken all or nothing. If any step after the first decrement
    /// fails, every decremented line is returned to the catalog before the
    /// error is reported.
    #[tracing::instrument(
        skip(self, cmd),
        fields(customer_id = %cmd.snapshot.customer_id, idempotency_key = %cmd.idempotency_key)
    )]
    pub async fn create_order(&self, cmd: CreateOrder) -> Result<Placement, DomainError> {
        let customer_id = cmd.snapshot.customer_id;
        let idempotency_key = cmd.idempotency_key.trim().to_string();
        if idempotency_key.is_empty() {
            return Err(OrderError::MissingIdempotencyKey.into());
        }

        let _guard = self.placement_locks.lock(&customer_id).await;

        if let Some(order) = self
            .find_by_idempotency_key(customer_id, &idempotency_key)
            .await?
        {
            tracing::info!(order_number = %order.order_number(), "idempotent replay of order creation");
            return Ok(Placement {
                order,
                replayed: true,
            });
        }

        if cmd.snapshot.is_empty() {
            return Err(OrderError::EmptyCart.into());
        }
        cmd.shipping_address.validate()?;

        let lines = self.freeze_lines(&cmd).await?;
        let pricing = self.pricing.price(
            lines.iter().map(|line| (line.unit_price, line.quantity)),
            cmd.shipping_option,
        );

        self.take_stock(&lines).await?;

        let order_id = AggregateId::new();
        let data = OrderPlacedData {
            order_id,
            order_number: self.fresh_order_number(),
            customer_id,
            idempotency_key,
            lines: lines.clone(),
            shipping_address: cmd.shipping_address,
            shipping_option: cmd.shipping_option,
            payment_method: cmd.payment_method,
            pricing,
            currency: self.currency.clone(),
            placed_at: Utc::now(),
        };
        let indexed = data.clone();

        let result = match self.handler.execute(order_id, |order| order.place(data)).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(error = %err, "order persistence failed, returning stock");
                self.return_stock(&lines).await?;
                return Err(err);
            }
        };

        self.index_mut().record(&indexed);
        metrics::counter!("orders_placed_total").increment(1);
        tracing::info!(
            %order_id,
            order_number = %indexed.order_number,
            total = %pricing.total,
            "order placed"
        );

        Ok(Placement {
            order: result.aggregate,
            replayed: false,
        })
    }

    /// Cancels an order and returns its stock.
    ///
    /// A pending payment is written off. Cancelling an already paid order
    /// is allowed and logged, since the payment must be refunded out of band.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, cmd: CancelOrder) -> Result<Order, DomainError> {
        let order_id = cmd.aggregate_id();
        let _guard = self.order_locks.lock(&order_id).await;

        let now = Utc::now();
        let result = self
            .handler
            .execute(order_id, |order| {
                ensure_exists(order, order_id)?;
                order.cancel(cmd.actor, cmd.reason.clone(), now)
            })
            .await?;
        let order = result.aggregate;

        metrics::counter!("orders_cancelled_total").increment(1);
        if order.payment_status() == PaymentStatus::Paid {
            tracing::warn!(%order_id, "paid order cancelled, refund required");
        } else {
            tracing::info!(%order_id, actor = %cmd.actor, "order cancelled");
        }

        self.return_stock(order.lines()).await?;
        Ok(order)
    }

    /// Moves an order along the fulfillment table. `Cancelled` targets are
    /// routed to [`OrderLedger::cancel`].
    #[tracing::instrument(skip(self))]
    pub async fn advance_fulfillment(&self, cmd: AdvanceFulfillment) -> Result<Order, DomainError> {
        if cmd.target == OrderStatus::Cancelled {
            return self.cancel(CancelOrder::new(cmd.order_id, cmd.actor)).await;
        }

        let order_id = cmd.aggregate_id();
        let _guard = self.order_locks.lock(&order_id).await;

        let now = Utc::now();
        let result = self
            .handler
            .execute(order_id, |order| {
                ensure_exists(order, order_id)?;
                order.advance(cmd.target, cmd.actor, now)
            })
            .await?;

        metrics::counter!("fulfillment_transitions_total", "to" => cmd.target.as_str())
            .increment(1);
        tracing::info!(%order_id, to = %cmd.target, actor = %cmd.actor, "fulfillment advanced");
        Ok(result.aggregate)
    }

    /// Marks the order paid. Repeating the call for the same intent is a
    /// no-op returning the current order.
    #[tracing::instrument(skip(self))]
    pub async fn record_payment(&self, cmd: RecordPayment) -> Result<Order, DomainError> {
        let order_id = cmd.aggregate_id();
        let _guard = self.order_locks.lock(&order_id).await;

        let now = Utc::now();
        let result = self
            .handler
            .execute(order_id, |order| {
                ensure_exists(order, order_id)?;
                order.record_payment(cmd.intent_id, cmd.provider_reference.clone(), cmd.amount, now)
            })
            .await?;

        if result.events.is_empty() {
            tracing::debug!(%order_id, intent_id = %cmd.intent_id, "payment already recorded");
        } else {
            tracing::info!(%order_id, intent_id = %cmd.intent_id, "payment recorded");
        }
        Ok(result.aggregate)
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    pub async fn find_by_number(&self, number: &OrderNumber) -> Result<Option<Order>, DomainError> {
        let order_id = self.index().by_number.get(number).copied();
        match order_id {
            Some(order_id) => self.get_order(order_id).await,
            None => Ok(None),
        }
    }

    pub async fn find_by_idempotency_key(
        &self,
        customer_id: CustomerId,
        idempotency_key: &str,
    ) -> Result<Option<Order>, DomainError> {
        let order_id = self
            .index()
            .by_idempotency_key
            .get(&(customer_id, idempotency_key.to_string()))
            .copied();
        match order_id {
            Some(order_id) => self.get_order(order_id).await,
            None => Ok(None),
        }
    }

    /// Re-reads every product and freezes the snapshot's prices into lines.
    async fn freeze_lines(&self, cmd: &CreateOrder) -> Result<Vec<OrderLine>, DomainError> {
        let mut lines = Vec::with_capacity(cmd.snapshot.items.len());
        for item in &cmd.snapshot.items {
            let product = match self.catalog.get_product(&item.product_id).await? {
                Some(product) if product.active && product.has_valid_price() => product,
                _ => {
                    return Err(OrderError::ProductUnavailable {
                        product_id: item.product_id.clone(),
                    }
                    .into());
                }
            };
            if product.stock < item.quantity {
                return Err(OrderError::StockChanged {
                    product_id: item.product_id.clone(),
                    available: product.stock,
                    requested: item.quantity,
                }
                .into());
            }
            lines.push(OrderLine::new(
                item.product_id.clone(),
                product.vendor_id,
                product.name,
                item.quantity,
                item.unit_price,
            ));
        }
        Ok(lines)
    }

    async fn take_stock(&self, lines: &[OrderLine]) -> Result<(), DomainError> {
        for (taken, line) in lines.iter().enumerate() {
            if let Err(err) = self
                .catalog
                .decrement_stock(&line.product_id, line.quantity)
                .await
            {
                self.return_stock(&lines[..taken]).await?;
                return Err(match err {
                    CatalogError::InsufficientStock {
                        product_id,
                        available,
                        requested,
                    } => OrderError::StockChanged {
                        product_id,
                        available,
                        requested,
                    }
                    .into(),
                    CatalogError::ProductNotFound(product_id) => {
                        OrderError::ProductUnavailable { product_id }.into()
                    }
                    other => other.into(),
                });
            }
        }
        Ok(())
    }

    /// Restocks every line, attempting all of them even after a failure.
    async fn return_stock(&self, lines: &[OrderLine]) -> Result<(), OrderError> {
        let mut first_failure = None;
        for line in lines {
            if let Err(err) = self.catalog.restock(&line.product_id, line.quantity).await {
                tracing::error!(
                    product_id = %line.product_id,
                    quantity = line.quantity,
                    error = %err,
                    "stock rollback failed"
                );
                first_failure.get_or_insert(OrderError::StockRollbackFailed {
                    product_id: line.product_id.clone(),
                    quantity: line.quantity,
                    reason: err.to_string(),
                });
            }
        }
        first_failure.map_or(Ok(()), Err)
    }

    fn fresh_order_number(&self) -> OrderNumber {
        let index = self.index();
        loop {
            let number = OrderNumber::generate();
            if !index.by_number.contains_key(&number) {
                return number;
            }
        }
    }

    fn index(&self) -> std::sync::RwLockReadGuard<'_, LedgerIndex> {
        self.index
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn index_mut(&self) -> std::sync::RwLockWriteGuard<'_, LedgerIndex> {
        self.index
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ensure_exists(order: &Order, order_id: AggregateId) -> Result<(), OrderError> {
    match order.id() {
        Some(_) => Ok(()),
        None => Err(OrderError::NotFound(order_id.to_string())),
    }
}
