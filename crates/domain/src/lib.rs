//! Domain layer for the storefront.
//!
//! This crate provides the pure domain model:
//! - `Product` with its stock counters and the four ledger operations
//! - `Cart` aggregate with variant merging and derived totals
//! - `Order` aggregate with the status state machine, pricing and refunds
//!
//! Nothing here performs I/O; persistence and orchestration live in the
//! `store` and `checkout` crates.

pub mod cart;
pub mod error;
pub mod money;
pub mod order;
pub mod product;

pub use cart::{Cart, CartError, CartLine};
pub use common::{LineItemId, OrderId, ProductId, UserId};
pub use error::DomainError;
pub use money::Money;
pub use order::{
    Actor, Address, InventoryState, NewOrder, Order, OrderError, OrderLine, OrderNumber,
    OrderStatus, PaymentInfo, PaymentStatus, Pricing, PricingPolicy, RefundRecord, StatusChange,
    StatusTimestamps, Tracking,
};
pub use product::{
    InventoryError, NewProduct, Product, ProductUpdate, ProductUpdateError, Size, StockOperation,
    Variant,
};
