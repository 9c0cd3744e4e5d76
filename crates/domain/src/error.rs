//! Domain error types.

use thiserror::Error;

use crate::cart::CartError;
use crate::order::OrderError;
use crate::product::{InventoryError, ProductUpdateError};

/// Errors that can occur during domain operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// A stock operation was rejected.
    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    /// A cart mutation was rejected.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// An order operation was rejected.
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    /// An admin product edit was rejected.
    #[error("Product error: {0}")]
    Product(#[from] ProductUpdateError),
}
