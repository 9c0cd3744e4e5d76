//! Shared identifier types used across the storefront crates.

mod ids;

pub use ids::{LineItemId, OrderId, ProductId, UserId};
