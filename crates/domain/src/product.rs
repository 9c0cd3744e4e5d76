//! Catalog product and its stock counters.
//!
//! A product carries two stored counters, `total_stock` and `sold_count`.
//! Everything else about availability is derived from them on every read:
//!
//! ```text
//! available_stock = total_stock - sold_count
//! in_stock        = available_stock > 0
//! ```
//!
//! The four [`StockOperation`]s are the only way the counters move. Each one
//! checks its precondition and mutates in a single step so a storage backend
//! can run it as one atomic conditional update.

use chrono::{DateTime, Utc};
use common::ProductId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Product size. Only the enumerated sizes are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Size {
    Sm,
    Md,
    Lg,
    Xl,
}

impl Size {
    pub fn as_str(&self) -> &'static str {
        match self {
            Size::Sm => "sm",
            Size::Md => "md",
            Size::Lg => "lg",
            Size::Xl => "xl",
        }
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sm" => Ok(Size::Sm),
            "md" => Ok(Size::Md),
            "lg" => Ok(Size::Lg),
            "xl" => Ok(Size::Xl),
            other => Err(format!("unknown size '{other}', expected one of sm, md, lg, xl")),
        }
    }
}

/// Colour and size of a product.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub colour: String,
    pub size: Size,
}

impl Variant {
    pub fn new(colour: impl Into<String>, size: Size) -> Self {
        Self {
            colour: colour.into(),
            size,
        }
    }

    /// Colour comparison ignores case and surrounding whitespace.
    pub fn matches(&self, other: &Variant) -> bool {
        self.size == other.size && self.colour.trim().eq_ignore_ascii_case(other.colour.trim())
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.colour, self.size)
    }
}

/// Errors raised by stock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    /// Not enough available stock, or the product is inactive.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A release asked for more than is currently reserved.
    #[error("Cannot release {requested} units of product {product_id}: only {reserved} reserved")]
    ReleaseExceedsReserved {
        product_id: ProductId,
        requested: u32,
        reserved: u32,
    },

    /// A commit would drop total stock below the reserved count.
    #[error(
        "Cannot commit {requested} units of product {product_id}: total stock {total_stock}, sold {sold_count}"
    )]
    CommitExceedsStock {
        product_id: ProductId,
        requested: u32,
        total_stock: u32,
        sold_count: u32,
    },

    /// Restoring would overflow the stock counter.
    #[error("Stock counter overflow for product {product_id}")]
    StockOverflow { product_id: ProductId },

    /// Stock operations need a positive quantity.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },
}

/// One of the four inventory ledger primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "quantity", rename_all = "snake_case")]
pub enum StockOperation {
    /// Hold stock for an order: `sold_count += qty`.
    Reserve(u32),
    /// Undo a hold: `sold_count -= qty`.
    Release(u32),
    /// Permanently remove shipped stock: `total_stock -= qty`.
    Commit(u32),
    /// Put committed stock back: `total_stock += qty`.
    Restore(u32),
}

impl StockOperation {
    pub fn quantity(&self) -> u32 {
        match *self {
            StockOperation::Reserve(q)
            | StockOperation::Release(q)
            | StockOperation::Commit(q)
            | StockOperation::Restore(q) => q,
        }
    }

    /// The operation that undoes this one.
    pub fn inverse(&self) -> StockOperation {
        match *self {
            StockOperation::Reserve(q) => StockOperation::Release(q),
            StockOperation::Release(q) => StockOperation::Reserve(q),
            StockOperation::Commit(q) => StockOperation::Restore(q),
            StockOperation::Restore(q) => StockOperation::Commit(q),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StockOperation::Reserve(_) => "reserve",
            StockOperation::Release(_) => "release",
            StockOperation::Commit(_) => "commit",
            StockOperation::Restore(_) => "restore",
        }
    }
}

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub image: Option<String>,
    pub price: Money,
    pub variant: Variant,
    total_stock: u32,
    sold_count: u32,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a product.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub sku: String,
    pub name: String,
    pub image: Option<String>,
    pub price: Money,
    pub variant: Variant,
    pub total_stock: u32,
    pub is_featured: bool,
}

/// Admin edit of a product. `None` leaves a field untouched.
///
/// There is deliberately no way to set `sold_count`; only stock operations
/// move it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub image: Option<String>,
    pub price: Option<Money>,
    pub total_stock: Option<u32>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
}

impl Product {
    /// Creates an active product with nothing sold.
    pub fn new(new: NewProduct) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::new(),
            sku: new.sku,
            name: new.name,
            image: new.image,
            price: new.price,
            variant: new.variant,
            total_stock: new.total_stock,
            sold_count: 0,
            is_active: true,
            is_featured: new.is_featured,
            created_at: now,
            updated_at: now,
        }
    }

    /// Rebuilds a product from stored counters.
    ///
    /// Returns `None` when the counters violate `sold_count <= total_stock`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: ProductId,
        sku: String,
        name: String,
        image: Option<String>,
        price: Money,
        variant: Variant,
        total_stock: u32,
        sold_count: u32,
        is_active: bool,
        is_featured: bool,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Option<Self> {
        if sold_count > total_stock {
            return None;
        }
        Some(Self {
            id,
            sku,
            name,
            image,
            price,
            variant,
            total_stock,
            sold_count,
            is_active,
            is_featured,
            created_at,
            updated_at,
        })
    }

    pub fn total_stock(&self) -> u32 {
        self.total_stock
    }

    pub fn sold_count(&self) -> u32 {
        self.sold_count
    }

    pub fn available_stock(&self) -> u32 {
        self.total_stock - self.sold_count
    }

    pub fn in_stock(&self) -> bool {
        self.available_stock() > 0
    }

    /// Stock a buyer can actually get. Inactive products sell nothing.
    pub fn purchasable_stock(&self) -> u32 {
        if self.is_active {
            self.available_stock()
        } else {
            0
        }
    }

    /// Applies one stock operation, or leaves the product untouched on error.
    pub fn apply_stock(&mut self, op: StockOperation) -> Result<(), InventoryError> {
        let quantity = op.quantity();
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity { quantity });
        }

        match op {
            StockOperation::Reserve(q) => {
                let available = self.purchasable_stock();
                if available < q {
                    return Err(InventoryError::InsufficientStock {
                        product_id: self.id,
                        requested: q,
                        available,
                    });
                }
                self.sold_count += q;
            }
            StockOperation::Release(q) => {
                if self.sold_count < q {
                    return Err(InventoryError::ReleaseExceedsReserved {
                        product_id: self.id,
                        requested: q,
                        reserved: self.sold_count,
                    });
                }
                self.sold_count -= q;
            }
            StockOperation::Commit(q) => {
                if self.total_stock < q || self.total_stock - q < self.sold_count {
                    return Err(InventoryError::CommitExceedsStock {
                        product_id: self.id,
                        requested: q,
                        total_stock: self.total_stock,
                        sold_count: self.sold_count,
                    });
                }
                self.total_stock -= q;
            }
            StockOperation::Restore(q) => {
                self.total_stock = self
                    .total_stock
                    .checked_add(q)
                    .ok_or(InventoryError::StockOverflow {
                        product_id: self.id,
                    })?;
            }
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Applies an admin edit.
    ///
    /// Fails without changes if the new total stock is below what is already
    /// sold or reserved.
    pub fn apply_update(&mut self, update: ProductUpdate) -> Result<(), ProductUpdateError> {
        if let Some(total) = update.total_stock
            && total < self.sold_count
        {
            return Err(ProductUpdateError::StockBelowSold {
                requested: total,
                sold_count: self.sold_count,
            });
        }
        if let Some(price) = update.price
            && price.is_negative()
        {
            return Err(ProductUpdateError::NegativePrice);
        }

        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(image) = update.image {
            self.image = Some(image);
        }
        if let Some(price) = update.price {
            self.price = price;
        }
        if let Some(total) = update.total_stock {
            self.total_stock = total;
        }
        if let Some(active) = update.is_active {
            self.is_active = active;
        }
        if let Some(featured) = update.is_featured {
            self.is_featured = featured;
        }
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Rejected admin edit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductUpdateError {
    #[error("Total stock {requested} is below the {sold_count} units already sold")]
    StockBelowSold { requested: u32, sold_count: u32 },

    #[error("Price must not be negative")]
    NegativePrice,
}
