//! Per-customer shopping carts.

mod store;

pub use store::{CartGuard, CartStore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::order::{CustomerId, Money, ProductId, uuid_id};

uuid_id!(
    /// Stable handle of a cart line, assigned on first add.
    CartItemId
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub item_id: CartItemId,
    pub product_id: ProductId,
    pub product_name: String,
    pub quantity: u32,
    /// Price when the line was first added; later adds keep it.
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A customer's mutable cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub customer_id: CustomerId,
    pub items: Vec<CartItem>,
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl Cart {
    pub fn empty(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            items: Vec::new(),
            last_modified_at: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.item_id == item_id)
    }

    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.items
            .iter()
            .filter(|item| &item.product_id == product_id)
            .map(|item| item.quantity)
            .sum()
    }

    pub fn snapshot(&self) -> CartSnapshot {
        CartSnapshot {
            customer_id: self.customer_id,
            items: self.items.clone(),
            taken_at: Utc::now(),
        }
    }
}

/// Immutable copy of a cart used for pricing and checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    pub customer_id: CustomerId,
    pub items: Vec<CartItem>,
    pub taken_at: DateTime<Utc>,
}

impl CartSnapshot {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum CartError {
    #[error("Invalid quantity: {quantity} (must be at least 1)")]
    InvalidQuantity { quantity: i64 },

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Product is not available: {0}")]
    ProductUnavailable(ProductId),

    #[error("Product is out of stock: {0}")]
    OutOfStock(ProductId),

    #[error("Insufficient stock for {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    #[error("Cart item not found: {0}")]
    ItemNotFound(CartItemId),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
