//! Checkout error types.

use common::{LineItemId, OrderId, ProductId};
use domain::{CartError, DomainError, InventoryError, OrderError};
use serde::Serialize;
use store::StoreError;
use thiserror::Error;

/// One cart line that can no longer be filled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockConflict {
    pub line_id: LineItemId,
    pub product_id: ProductId,
    pub name: String,
    pub requested: u32,
    pub available: u32,
}

/// Errors that can occur in the checkout and order services.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Checkout was attempted on a missing or empty cart.
    #[error("Cart is empty")]
    EmptyCart,

    /// Some cart lines exceed current stock. Lists every violating line.
    #[error("{} cart line(s) exceed available stock", .0.len())]
    StockConflict(Vec<StockConflict>),

    /// Product not found.
    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Order not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The caller does not own the resource.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The payment gateway declined or failed.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// The request is well-formed but cannot be honoured.
    #[error("Invalid request: {0}")]
    Invalid(String),

    /// The gateway refunded the payment but the refund could not be recorded
    /// on the order. Needs manual reconciliation.
    #[error("Refund {refund_id} for order {order_id} was issued but not recorded: {source}")]
    RefundUnrecorded {
        order_id: OrderId,
        refund_id: String,
        #[source]
        source: StoreError,
    },

    /// Domain rule violation.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl CheckoutError {
    /// Short label used as a metrics dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            CheckoutError::EmptyCart => "empty_cart",
            CheckoutError::StockConflict(_) => "stock_conflict",
            CheckoutError::ProductNotFound(_) | CheckoutError::OrderNotFound(_) => "not_found",
            CheckoutError::Forbidden(_) => "forbidden",
            CheckoutError::PaymentFailed(_) => "payment_failed",
            CheckoutError::Invalid(_) => "invalid",
            CheckoutError::Domain(DomainError::Inventory(_)) => "insufficient_stock",
            CheckoutError::RefundUnrecorded { .. } => "refund_unrecorded",
            CheckoutError::Domain(_) => "domain",
            CheckoutError::Store(
                StoreError::ConcurrencyConflict { .. } | StoreError::StockContention { .. },
            ) => "conflict",
            CheckoutError::Store(_) => "store",
        }
    }
}

// Ledger and lookup failures surface as domain errors or not-found errors so
// callers never have to dig through the store layer.
impl From<StoreError> for CheckoutError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Inventory(e) => CheckoutError::Domain(e.into()),
            StoreError::ProductUpdate(e) => CheckoutError::Domain(e.into()),
            StoreError::ProductNotFound(id) => CheckoutError::ProductNotFound(id),
            StoreError::OrderNotFound(id) => CheckoutError::OrderNotFound(id),
            other => CheckoutError::Store(other),
        }
    }
}

impl From<InventoryError> for CheckoutError {
    fn from(err: InventoryError) -> Self {
        CheckoutError::Domain(err.into())
    }
}

impl From<CartError> for CheckoutError {
    fn from(err: CartError) -> Self {
        CheckoutError::Domain(err.into())
    }
}

impl From<OrderError> for CheckoutError {
    fn from(err: OrderError) -> Self {
        CheckoutError::Domain(err.into())
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
