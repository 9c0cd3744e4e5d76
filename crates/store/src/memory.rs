use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use domain::{Cart, InventoryError, Order, Product, ProductUpdate, StockOperation};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    repository::{CartRepository, OrderRepository, ProductRepository},
};

#[derive(Default)]
struct State {
    products: HashMap<ProductId, Product>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory store implementation for testing and local runs.
///
/// Every stock operation runs check-and-mutate under one write lock, which
/// gives the same atomicity as the conditional updates in PostgreSQL.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
    fail_on_release: Arc<AtomicBool>,
    fail_on_restore: Arc<AtomicBool>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every `Release` stock operation fail with `Unavailable`.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.fail_on_release.store(fail, Ordering::SeqCst);
    }

    /// Makes every `Restore` stock operation fail with `Unavailable`.
    pub fn set_fail_on_restore(&self, fail: bool) {
        self.fail_on_restore.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    fn injected_failure(&self, op: StockOperation) -> Option<StoreError> {
        let fail = match op {
            StockOperation::Release(_) => self.fail_on_release.load(Ordering::SeqCst),
            StockOperation::Restore(_) => self.fail_on_restore.load(Ordering::SeqCst),
            _ => false,
        };
        fail.then(|| StoreError::Unavailable(format!("{} rejected", op.name())))
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut state = self.state.write().await;
        if state.products.contains_key(&product.id) {
            return Err(StoreError::DuplicateKey {
                key: "id",
                value: product.id.to_string(),
            });
        }
        if state.products.values().any(|p| p.sku == product.sku) {
            return Err(StoreError::DuplicateKey {
                key: "sku",
                value: product.sku.clone(),
            });
        }
        state.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        product.apply_update(update)?;
        Ok(product.clone())
    }

    async fn apply_stock(&self, id: ProductId, op: StockOperation) -> Result<Product> {
        if op.quantity() == 0 {
            return Err(InventoryError::InvalidQuantity { quantity: 0 }.into());
        }
        if let Some(err) = self.injected_failure(op) {
            return Err(err);
        }

        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        product.apply_stock(op)?;

        tracing::debug!(
            product_id = %id,
            operation = op.name(),
            quantity = op.quantity(),
            total_stock = product.total_stock(),
            sold_count = product.sold_count(),
            "Applied stock operation"
        );
        Ok(product.clone())
    }
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&user_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.state
            .write()
            .await
            .carts
            .insert(cart.user_id(), cart.clone());
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id()) {
            return Err(StoreError::DuplicateKey {
                key: "id",
                value: order.id().to_string(),
            });
        }
        if state
            .orders
            .values()
            .any(|o| o.order_number() == order.order_number())
        {
            return Err(StoreError::DuplicateKey {
                key: "order_number",
                value: order.order_number().to_string(),
            });
        }
        state.orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn save_order(&self, order: &Order, expected_version: u64) -> Result<()> {
        let mut state = self.state.write().await;
        let existing = state
            .orders
            .get_mut(&order.id())
            .ok_or(StoreError::OrderNotFound(order.id()))?;

        if existing.version() != expected_version {
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected: expected_version,
                actual: existing.version(),
            });
        }
        *existing = order.clone();
        Ok(())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id() == user_id)
            .cloned()
            .collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(orders)
    }

    async fn list_orders(&self) -> Result<Vec<Order>> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state.orders.values().cloned().collect();
        orders.sort_by_key(|o| std::cmp::Reverse(o.created_at()));
        Ok(orders)
    }

    async fn discard_order(&self, id: OrderId) -> Result<()> {
        self.state.write().await.orders.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::{
        Actor, Address, Money, NewOrder, NewProduct, OrderLine, OrderStatus, PricingPolicy, Size,
        Variant,
    };

    fn product(sku: &str, total: u32) -> Product {
        Product::new(NewProduct {
            sku: sku.to_string(),
            name: "Tee".to_string(),
            image: None,
            price: Money::from_cents(2_000),
            variant: Variant::new("black", Size::Md),
            total_stock: total,
            is_featured: false,
        })
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_sku() {
        let store = InMemoryStore::new();
        store.insert_product(&product("TEE-1", 5)).await.unwrap();

        let result = store.insert_product(&product("TEE-1", 5)).await;

        assert!(matches!(
            result,
            Err(StoreError::DuplicateKey { key: "sku", .. })
        ));
    }

    #[tokio::test]
    async fn test_apply_stock_is_all_or_nothing() {
        let store = InMemoryStore::new();
        let p = product("TEE-1", 5);
        store.insert_product(&p).await.unwrap();

        let reserved = store
            .apply_stock(p.id, StockOperation::Reserve(3))
            .await
            .unwrap();
        assert_eq!(reserved.available_stock(), 2);

        let result = store.apply_stock(p.id, StockOperation::Reserve(3)).await;
        assert!(matches!(
            result,
            Err(StoreError::Inventory(InventoryError::InsufficientStock {
                available: 2,
                ..
            }))
        ));

        let current = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(current.sold_count(), 3);
    }

    #[tokio::test]
    async fn test_apply_stock_unknown_product() {
        let store = InMemoryStore::new();
        let id = ProductId::new();

        let result = store.apply_stock(id, StockOperation::Reserve(1)).await;

        assert!(matches!(result, Err(StoreError::ProductNotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversell() {
        let store = InMemoryStore::new();
        let p = product("TEE-1", 10);
        store.insert_product(&p).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..25 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.apply_stock(p.id, StockOperation::Reserve(1)).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 10);
        let current = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(current.sold_count(), 10);
        assert_eq!(current.available_stock(), 0);
    }

    #[tokio::test]
    async fn test_injected_release_failure() {
        let store = InMemoryStore::new();
        let p = product("TEE-1", 5);
        store.insert_product(&p).await.unwrap();
        store
            .apply_stock(p.id, StockOperation::Reserve(2))
            .await
            .unwrap();
        store.set_fail_on_release(true);

        let result = store.apply_stock(p.id, StockOperation::Release(2)).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        let current = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(current.sold_count(), 2);
    }

    fn order(p: &Product) -> Order {
        Order::new(NewOrder {
            user_id: UserId::new(),
            lines: vec![OrderLine {
                product_id: p.id,
                name: p.name.clone(),
                sku: p.sku.clone(),
                image: None,
                variant: p.variant.clone(),
                unit_price: p.price,
                quantity: 1,
            }],
            shipping_address: Address {
                name: "Ada".into(),
                street1: "12 St James's Sq".into(),
                city: "London".into(),
                postal_code: "SW1Y 4JH".into(),
                country: "GB".into(),
                ..Default::default()
            },
            billing_address: None,
            payment_method: "card".into(),
            pricing: PricingPolicy::default(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_save_order_rejects_stale_version() {
        let store = InMemoryStore::new();
        let placed = order(&product("TEE-1", 5));
        store.insert_order(&placed).await.unwrap();

        let mut confirmed = placed.clone();
        confirmed
            .transition(OrderStatus::Confirmed, None, Actor::System)
            .unwrap();
        let mut cancelled = placed.clone();
        cancelled
            .transition(OrderStatus::Cancelled, None, Actor::System)
            .unwrap();

        store
            .save_order(&confirmed, placed.version())
            .await
            .unwrap();
        let stale = store.save_order(&cancelled, placed.version()).await;

        assert!(matches!(
            stale,
            Err(StoreError::ConcurrencyConflict { expected: 0, actual: 1, .. })
        ));
        let stored = store.get_order(placed.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_save_order_unknown_order() {
        let store = InMemoryStore::new();
        let never_inserted = order(&product("TEE-1", 5));

        let result = store.save_order(&never_inserted, 0).await;

        assert!(matches!(
            result,
            Err(StoreError::OrderNotFound(id)) if id == never_inserted.id()
        ));
    }

    #[tokio::test]
    async fn test_update_product_keeps_sold_count() {
        let store = InMemoryStore::new();
        let p = product("TEE-1", 5);
        store.insert_product(&p).await.unwrap();
        store
            .apply_stock(p.id, StockOperation::Reserve(4))
            .await
            .unwrap();

        let rejected = store
            .update_product(
                p.id,
                ProductUpdate {
                    total_stock: Some(3),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(rejected, Err(StoreError::ProductUpdate(_))));

        let updated = store
            .update_product(
                p.id,
                ProductUpdate {
                    total_stock: Some(8),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.sold_count(), 4);
        assert_eq!(updated.available_stock(), 4);
    }

    #[tokio::test]
    async fn test_save_cart_last_write_wins() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let p = product("TEE-1", 5);
        let variant = p.variant.clone();

        let mut first = Cart::new(user);
        first.add_item(&p, 1, &variant).unwrap();
        store.save_cart(&first).await.unwrap();

        let second = Cart::new(user);
        store.save_cart(&second).await.unwrap();

        let loaded = store.get_cart(user).await.unwrap().unwrap();
        assert!(loaded.is_empty());
    }
}
