//! Checkout and order services.
//!
//! This crate wires the domain model to storage:
//! - [`InventoryLedger`] applies the four stock primitives and compensates
//!   partially applied batches in reverse
//! - [`CartService`] loads, mutates and persists carts
//! - [`CheckoutOrchestrator`] turns a cart into a pending order with
//!   reserved stock and a payment handle
//! - [`OrderWorkflow`] drives status transitions, refunds and pricing
//!   adjustments, keeping the ledger in step
//!
//! If any checkout step fails, stock already reserved is released in reverse
//! order and the pending order is discarded.

pub mod cart;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod payment;
pub mod workflow;

pub use cart::CartService;
pub use error::{CheckoutError, Result, StockConflict};
pub use ledger::{InventoryLedger, LedgerEntry};
pub use orchestrator::{CheckoutDetails, CheckoutOrchestrator, CheckoutSettings, RequestedLine};
pub use payment::{InMemoryPaymentGateway, PaymentConfirmation, PaymentGateway};
pub use workflow::{OrderWorkflow, PricingAdjustment, StatusUpdate};
