use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::catalog::{Catalog, Product};
use crate::order::{CustomerId, ProductId};

use super::{Cart, CartError, CartItem, CartItemId, CartSnapshot};

/// In-memory carts, one per customer.
///
/// Mutations of one cart are serialized and re-read the product from the
/// catalog inside the critical section, so a successful mutation never
/// leaves a line above the stock seen at that moment.
pub struct CartStore {
    carts: RwLock<HashMap<CustomerId, Arc<Mutex<Cart>>>>,
    catalog: Arc<dyn Catalog>,
}

/// Exclusive access to one cart, held by checkout across
/// snapshot → order creation → clear.
pub struct CartGuard {
    cart: OwnedMutexGuard<Cart>,
}

impl CartGuard {
    pub fn snapshot(&self) -> CartSnapshot {
        self.cart.snapshot()
    }

    pub fn clear(&mut self) {
        self.cart.items.clear();
        self.cart.last_modified_at = Some(Utc::now());
    }
}

impl CartStore {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self {
            carts: RwLock::new(HashMap::new()),
            catalog,
        }
    }

    fn existing(&self, customer_id: CustomerId) -> Option<Arc<Mutex<Cart>>> {
        self.carts
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&customer_id)
            .cloned()
    }

    fn handle(&self, customer_id: CustomerId) -> Arc<Mutex<Cart>> {
        if let Some(cart) = self.existing(customer_id) {
            return cart;
        }
        self.carts
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(customer_id)
            .or_insert_with(|| Arc::new(Mutex::new(Cart::empty(customer_id))))
            .clone()
    }

    async fn sellable(&self, product_id: &ProductId) -> Result<Product, CartError> {
        let product = self
            .catalog
            .get_product(product_id)
            .await?
            .ok_or_else(|| CartError::ProductNotFound(product_id.clone()))?;
        if !product.active {
            return Err(CartError::ProductUnavailable(product_id.clone()));
        }
        if !product.has_valid_price() {
            tracing::warn!(%product_id, price = %product.price, "catalog price out of range");
            return Err(CartError::ProductUnavailable(product_id.clone()));
        }
        Ok(product)
    }

    /// Adds `quantity` units, summing onto an existing line for the product.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        customer_id: CustomerId,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Cart, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity {
                quantity: i64::from(quantity),
            });
        }

        let handle = self.handle(customer_id);
        let mut cart = handle.lock().await;

        let product = self.sellable(&product_id).await?;
        if product.stock == 0 {
            return Err(CartError::OutOfStock(product_id));
        }

        let requested = cart.quantity_of(&product_id).saturating_add(quantity);
        if requested > product.stock {
            return Err(CartError::InsufficientStock {
                product_id,
                available: product.stock,
                requested,
            });
        }

        match cart
            .items
            .iter()
            .position(|item| item.product_id == product_id)
        {
            Some(index) => cart.items[index].quantity = requested,
            None => cart.items.push(CartItem {
                item_id: CartItemId::new(),
                product_id,
                product_name: product.name,
                quantity,
                unit_price: product.price,
            }),
        }
        cart.last_modified_at = Some(Utc::now());

        tracing::debug!(items = cart.items.len(), "cart item added");
        Ok(cart.clone())
    }

    /// Sets an existing line to `quantity`. Zero is rejected; removal is
    /// explicit.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        customer_id: CustomerId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart, CartError> {
        if quantity < 1 {
            return Err(CartError::InvalidQuantity {
                quantity: i64::from(quantity),
            });
        }

        let handle = self
            .existing(customer_id)
            .ok_or(CartError::ItemNotFound(item_id))?;
        let mut cart = handle.lock().await;

        let product_id = cart
            .item(item_id)
            .map(|item| item.product_id.clone())
            .ok_or(CartError::ItemNotFound(item_id))?;

        let product = self.sellable(&product_id).await?;
        if quantity > product.stock {
            return Err(CartError::InsufficientStock {
                product_id,
                available: product.stock,
                requested: quantity,
            });
        }

        if let Some(line) = cart.items.iter_mut().find(|item| item.item_id == item_id) {
            line.quantity = quantity;
        }
        cart.last_modified_at = Some(Utc::now());

        Ok(cart.clone())
    }

    /// Removes a line. Removing an absent line succeeds.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, customer_id: CustomerId, item_id: CartItemId) -> Cart {
        let Some(handle) = self.existing(customer_id) else {
            return Cart::empty(customer_id);
        };
        let mut cart = handle.lock().await;
        let before = cart.items.len();
        cart.items.retain(|item| item.item_id != item_id);
        if cart.items.len() != before {
            cart.last_modified_at = Some(Utc::now());
        }
        cart.clone()
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, customer_id: CustomerId) -> Cart {
        let Some(handle) = self.existing(customer_id) else {
            return Cart::empty(customer_id);
        };
        let mut cart = handle.lock().await;
        if !cart.items.is_empty() {
            cart.items.clear();
            cart.last_modified_at = Some(Utc::now());
        }
        cart.clone()
    }

    /// Current cart; an empty one for customers who never added anything.
    pub async fn get(&self, customer_id: CustomerId) -> Cart {
        match self.existing(customer_id) {
            Some(handle) => handle.lock().await.clone(),
            None => Cart::empty(customer_id),
        }
    }

    /// Copy of the cart for pricing. The cart stays unlocked afterwards.
    pub async fn snapshot(&self, customer_id: CustomerId) -> CartSnapshot {
        self.get(customer_id).await.snapshot()
    }

    /// Waits for exclusive access to the customer's cart.
    pub async fn lock(&self, customer_id: CustomerId) -> CartGuard {
        CartGuard {
            cart: self.handle(customer_id).lock_owned().await,
        }
    }
}
