//! Persistence for products, carts and orders.
//!
//! The repository traits are implemented by [`InMemoryStore`] for tests and
//! local runs and by [`PostgresStore`] for production. Both guarantee that a
//! stock operation's precondition and its counter update happen atomically.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{CartRepository, CommerceStore, OrderRepository, ProductRepository};
