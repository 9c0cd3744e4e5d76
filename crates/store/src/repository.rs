use async_trait::async_trait;
use common::{OrderId, ProductId, UserId};
use domain::{Cart, Order, Product, ProductUpdate, StockOperation};

use crate::Result;

/// Product documents and their stock counters.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// Inserts a new product. Fails with `DuplicateKey` if the id or SKU is taken.
    async fn insert_product(&self, product: &Product) -> Result<()>;

    /// Loads a product. Returns None if it doesn't exist.
    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Loads several products at once. Missing ids are skipped.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Applies an admin edit and returns the updated product.
    ///
    /// Never touches `sold_count`, so it cannot race with reservations.
    async fn update_product(&self, id: ProductId, update: ProductUpdate) -> Result<Product>;

    /// Applies one stock operation as a single atomic check-and-mutate.
    ///
    /// The precondition (enough available stock, enough reserved units, ...)
    /// and the counter update happen together; two concurrent reservations
    /// can never both pass a stale availability check.
    async fn apply_stock(&self, id: ProductId, op: StockOperation) -> Result<Product>;
}

/// One cart document per user.
#[async_trait]
pub trait CartRepository: Send + Sync {
    /// Loads the user's cart. Returns None if it was never created.
    async fn get_cart(&self, user_id: UserId) -> Result<Option<Cart>>;

    /// Inserts or replaces the user's cart (last write wins).
    async fn save_cart(&self, cart: &Cart) -> Result<()>;
}

/// Order documents.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Inserts a new order.
    ///
    /// Fails with `DuplicateKey` if the order id or order number already exists.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Loads an order. Returns None if it doesn't exist.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Replaces an existing order if its stored version is still
    /// `expected_version`.
    ///
    /// Fails with `ConcurrencyConflict` if another writer saved first, and
    /// with `OrderNotFound` if the order does not exist.
    async fn save_order(&self, order: &Order, expected_version: u64) -> Result<()>;

    /// Lists a user's orders, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Lists all orders, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>>;

    /// Removes an order that never finished checkout.
    ///
    /// Only used to roll back a pending order whose reservations failed.
    async fn discard_order(&self, id: OrderId) -> Result<()>;
}

/// Everything the services need from storage.
pub trait CommerceStore: ProductRepository + CartRepository + OrderRepository {}

// Blanket implementation for every type that provides all three repositories
impl<T: ProductRepository + CartRepository + OrderRepository + ?Sized> CommerceStore for T {}
