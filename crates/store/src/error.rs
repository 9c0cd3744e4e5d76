use common::{OrderId, ProductId};
use domain::{InventoryError, ProductUpdateError};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product does not exist.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A unique key (order id, order number, product SKU) is already taken.
    #[error("Duplicate key: {key} = {value}")]
    DuplicateKey { key: &'static str, value: String },

    /// The order changed since it was loaded. The expected version did not
    /// match the stored one.
    #[error("Concurrency conflict for order {order_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: u64,
        actual: u64,
    },

    /// A stock update kept losing races to concurrent writers although its
    /// precondition held on every re-read.
    #[error("Stock update contended: {operation} on product {product_id} gave up after {attempts} attempts")]
    StockContention {
        product_id: ProductId,
        operation: &'static str,
        attempts: usize,
    },

    /// A conditional stock update was rejected.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// An admin product edit was rejected.
    #[error("Product update rejected: {0}")]
    ProductUpdate(#[from] ProductUpdateError),

    /// The backend refused the operation (simulated outage in the in-memory store).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored data could not be turned back into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
