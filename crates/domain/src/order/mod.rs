//! Order aggregate and related types.

mod aggregate;
mod pricing;
mod status;
mod value_objects;

pub use aggregate::{NewOrder, Order};
pub use pricing::{Pricing, PricingPolicy};
pub use status::OrderStatus;
pub use value_objects::{
    Actor, Address, InventoryState, OrderLine, OrderNumber, PaymentInfo, PaymentStatus,
    RefundRecord, StatusChange, StatusTimestamps, Tracking,
};

use common::ProductId;
use thiserror::Error;

use crate::money::Money;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The requested status is not reachable from the current one.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Refund larger than what was charged.
    #[error("Refund of {requested} exceeds order total {total}")]
    RefundExceedsTotal { requested: Money, total: Money },

    /// Amount must be positive (refunds) or non-negative (adjustments).
    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: Money },

    /// Discount and shipping can only change before processing starts.
    #[error("Pricing cannot be changed once the order is {status}")]
    PricingLocked { status: OrderStatus },

    /// Tracking belongs to shipped orders.
    #[error("Tracking cannot be set on a {status} order")]
    TrackingNotAllowed { status: OrderStatus },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// A line with zero quantity.
    #[error("Invalid quantity for product {product_id}")]
    InvalidQuantity { product_id: ProductId },

    /// A required address field is blank.
    #[error("Address field '{field}' is required")]
    InvalidAddress { field: &'static str },
}
