//! Cart service: loads the user's cart, applies one mutation, persists it.

use common::{LineItemId, ProductId, UserId};
use domain::{Cart, CartError, Product, Variant};
use store::{CartRepository, ProductRepository};

use crate::error::{CheckoutError, Result};

/// Application service for cart operations.
#[derive(Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S: CartRepository + ProductRepository> CartService<S> {
    /// Creates a new cart service.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the user's cart, or an empty one if nothing was added yet.
    pub async fn get_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self
            .store
            .get_cart(user_id)
            .await?
            .unwrap_or_else(|| Cart::new(user_id)))
    }

    /// Adds a product variant to the cart, creating the cart on first use.
    #[tracing::instrument(skip(self, variant), fields(%variant))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        quantity: u32,
        variant: &Variant,
    ) -> Result<Cart> {
        let product = self.load_product(product_id).await?;
        let mut cart = self.get_cart(user_id).await?;

        let line_id = cart.add_item(&product, quantity, variant)?;
        self.store.save_cart(&cart).await?;

        tracing::info!(%line_id, total_items = cart.total_items(), "cart item added");
        Ok(cart)
    }

    /// Sets a line's quantity; zero removes the line.
    #[tracing::instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: UserId,
        line_id: LineItemId,
        quantity: u32,
    ) -> Result<Cart> {
        let mut cart = self.get_cart(user_id).await?;
        let product_id = cart
            .line(line_id)
            .ok_or(CartError::LineNotFound(line_id))?
            .product_id;

        if quantity == 0 {
            cart.remove_item(line_id)?;
        } else {
            let product = self.load_product(product_id).await?;
            cart.update_item_quantity(line_id, quantity, &product)?;
        }

        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Removes a line without any stock check.
    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, line_id: LineItemId) -> Result<Cart> {
        let mut cart = self.get_cart(user_id).await?;
        cart.remove_item(line_id)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Empties the cart. The cart document is kept.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, user_id: UserId) -> Result<Cart> {
        let mut cart = self.get_cart(user_id).await?;
        cart.clear();
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    async fn load_product(&self, product_id: ProductId) -> Result<Product> {
        self.store
            .get_product(product_id)
            .await?
            .ok_or(CheckoutError::ProductNotFound(product_id))
    }
}
