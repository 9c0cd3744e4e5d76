//! Per-user shopping cart aggregate.

use chrono::{DateTime, Utc};
use common::{LineItemId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;
use crate::product::{Product, Variant};

/// Errors raised by cart mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// The product does not come in the requested colour/size.
    #[error("Product {product_id} is not available as {requested}")]
    VariantUnavailable {
        product_id: ProductId,
        requested: Variant,
    },

    /// The (merged) quantity exceeds what the product has available.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// Quantity must be at least 1.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    /// No such line in the cart.
    #[error("Cart line not found: {0}")]
    LineNotFound(LineItemId),

    /// The product passed in is not the one the line refers to.
    #[error("Product {actual} does not belong to cart line for product {expected}")]
    ProductMismatch {
        expected: ProductId,
        actual: ProductId,
    },
}

/// A single product variant in a cart, with the price seen when it was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub id: LineItemId,
    pub product_id: ProductId,
    pub name: String,
    pub sku: String,
    pub image: Option<String>,
    pub variant: Variant,
    pub quantity: u32,
    pub unit_price: Money,
    pub added_at: DateTime<Utc>,
}

impl CartLine {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    fn same_item(&self, product_id: ProductId, variant: &Variant) -> bool {
        self.product_id == product_id && self.variant.matches(variant)
    }
}

/// A user's cart. There is at most one per user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    user_id: UserId,
    items: Vec<CartLine>,
    total_items: u32,
    total_amount: Money,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Cart {
    /// Creates an empty cart for a user.
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            total_items: 0,
            total_amount: Money::zero(),
            updated_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[CartLine] {
        &self.items
    }

    pub fn line(&self, line_id: LineItemId) -> Option<&CartLine> {
        self.items.iter().find(|l| l.id == line_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of quantities across all lines.
    pub fn total_items(&self) -> u32 {
        self.total_items
    }

    /// Sum of price snapshot × quantity across all lines.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// Command methods
impl Cart {
    /// Adds a product variant, merging into an existing line when the same
    /// product and variant are already in the cart.
    ///
    /// The price snapshot of a merged line is the one taken when the line was
    /// first added. Returns the id of the affected line.
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: u32,
        variant: &Variant,
    ) -> Result<LineItemId, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        if !product.variant.matches(variant) {
            return Err(CartError::VariantUnavailable {
                product_id: product.id,
                requested: variant.clone(),
            });
        }

        let existing = self
            .items
            .iter()
            .position(|l| l.same_item(product.id, variant));
        let already = existing.map_or(0, |i| self.items[i].quantity);
        let merged = already.saturating_add(quantity);
        check_stock(product, merged)?;

        let line_id = match existing {
            Some(i) => {
                self.items[i].quantity = merged;
                self.items[i].id
            }
            None => {
                let line = CartLine {
                    id: LineItemId::new(),
                    product_id: product.id,
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    image: product.image.clone(),
                    variant: product.variant.clone(),
                    quantity,
                    unit_price: product.price,
                    added_at: Utc::now(),
                };
                let id = line.id;
                self.items.push(line);
                id
            }
        };

        self.recalculate();
        Ok(line_id)
    }

    /// Sets a line's quantity. Zero removes the line; anything else is
    /// re-validated against the product's current stock.
    pub fn update_item_quantity(
        &mut self,
        line_id: LineItemId,
        quantity: u32,
        product: &Product,
    ) -> Result<(), CartError> {
        let index = self.index_of(line_id)?;

        if quantity == 0 {
            self.items.remove(index);
            self.recalculate();
            return Ok(());
        }

        let line = &self.items[index];
        if line.product_id != product.id {
            return Err(CartError::ProductMismatch {
                expected: line.product_id,
                actual: product.id,
            });
        }
        check_stock(product, quantity)?;

        self.items[index].quantity = quantity;
        self.recalculate();
        Ok(())
    }

    /// Removes a line.
    pub fn remove_item(&mut self, line_id: LineItemId) -> Result<CartLine, CartError> {
        let index = self.index_of(line_id)?;
        let line = self.items.remove(index);
        self.recalculate();
        Ok(line)
    }

    /// Empties the cart. The cart itself is kept.
    pub fn clear(&mut self) {
        self.items.clear();
        self.recalculate();
    }

    fn index_of(&self, line_id: LineItemId) -> Result<usize, CartError> {
        self.items
            .iter()
            .position(|l| l.id == line_id)
            .ok_or(CartError::LineNotFound(line_id))
    }

    fn recalculate(&mut self) {
        self.total_items = self.items.iter().map(|l| l.quantity).sum();
        self.total_amount = self.items.iter().map(CartLine::line_total).sum();
        self.updated_at = Utc::now();
    }
}

fn check_stock(product: &Product, requested: u32) -> Result<(), CartError> {
    let available = product.purchasable_stock();
    if requested > available {
        return Err(CartError::InsufficientStock {
            product_id: product.id,
            requested,
            available,
        });
    }
    Ok(())
}
