//! Product catalog port.
//!
//! The storefront's product data lives outside this service. The core only
//! needs price, stock and ownership lookups plus stock counter mutations.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::order::{Money, ProductId, VendorId};

/// A sellable product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub vendor_id: VendorId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl Product {
    /// Highest unit price the marketplace accepts: one million in minor units.
    pub const MAX_PRICE: Money = Money::from_cents(100_000_000);

    /// A price is sellable when it is neither negative nor above
    /// [`Product::MAX_PRICE`].
    pub fn has_valid_price(&self) -> bool {
        self.price >= Money::zero() && self.price <= Self::MAX_PRICE
    }
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Insufficient stock for {product_id}: {available} available, {requested} requested")]
    InsufficientStock {
        product_id: ProductId,
        available: u32,
        requested: u32,
    },

    #[error("Catalog unavailable: {0}")]
    Unavailable(String),
}

/// Product lookup and stock counters.
///
/// `decrement_stock` must check and decrement atomically: two concurrent
/// callers can never both take the last unit.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, CatalogError>;

    /// Takes `quantity` units and returns the remaining stock.
    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32, CatalogError>;

    /// Returns `quantity` units and returns the new stock.
    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<u32, CatalogError>;
}

/// Catalog held in memory, seeded from JSON or built in tests.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    products: RwLock<HashMap<ProductId, Product>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_products(products: impl IntoIterator<Item = Product>) -> Self {
        let products = products
            .into_iter()
            .map(|product| (product.id.clone(), product))
            .collect();
        Self {
            products: RwLock::new(products),
        }
    }

    /// Parses a JSON array of products. A product priced outside
    /// `0..=Product::MAX_PRICE` rejects the whole file.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let products: Vec<Product> = serde_json::from_str(json)?;
        if let Some(product) = products.iter().find(|p| !p.has_valid_price()) {
            return Err(serde::de::Error::custom(format!(
                "product {} has price {} outside the accepted range",
                product.id, product.price
            )));
        }
        Ok(Self::from_products(products))
    }

    /// Inserts or replaces a product.
    pub async fn upsert(&self, product: Product) {
        self.products
            .write()
            .await
            .insert(product.id.clone(), product);
    }

    pub async fn stock_of(&self, product_id: &ProductId) -> Option<u32> {
        self.products.read().await.get(product_id).map(|p| p.stock)
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>, CatalogError> {
        Ok(self.products.read().await.get(product_id).cloned())
    }

    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<u32, CatalogError> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.clone()))?;

        if product.stock < quantity {
            return Err(CatalogError::InsufficientStock {
                product_id: product_id.clone(),
                available: product.stock,
                requested: quantity,
            });
        }

        product.stock -= quantity;
        Ok(product.stock)
    }

    async fn restock(&self, product_id: &ProductId, quantity: u32) -> Result<u32, CatalogError> {
        let mut products = self.products.write().await;
        let product = products
            .get_mut(product_id)
            .ok_or_else(|| CatalogError::ProductNotFound(product_id.clone()))?;

        product.stock = product.stock.saturating_add(quantity);
        Ok(product.stock)
    }
}
