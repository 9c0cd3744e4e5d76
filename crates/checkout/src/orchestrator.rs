//! Checkout orchestrator: cart → stock validation → pending order →
//! reservations → payment handle → cart clear.

use std::collections::HashMap;
use std::time::Instant;

use common::{OrderId, ProductId, UserId};
use domain::{
    Actor, Address, Cart, CartLine, InventoryState, NewOrder, Order, OrderError, OrderLine,
    OrderStatus, PricingPolicy, StockOperation, Variant,
};
use serde::Deserialize;
use store::{CommerceStore, StoreError};

use crate::error::{CheckoutError, Result, StockConflict};
use crate::ledger::{InventoryLedger, LedgerEntry};
use crate::payment::{PaymentConfirmation, PaymentGateway};

/// Order numbers are random; a collision is retried with a fresh one.
const MAX_ORDER_NUMBER_ATTEMPTS: usize = 5;

/// Shipping, billing and payment details supplied at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutDetails {
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub payment_method: String,
}

/// One line of a "buy now" request.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestedLine {
    pub product_id: ProductId,
    pub variant: Variant,
    pub quantity: u32,
}

/// Pricing and currency used for new orders.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub pricing: PricingPolicy,
    pub currency: String,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            currency: "USD".to_string(),
        }
    }
}

/// Turns carts (or explicit line lists) into pending orders with reserved
/// stock.
///
/// Any failure after the order is inserted compensates the reservations in
/// reverse and discards the order, so a failed checkout leaves no order and
/// no held stock behind.
pub struct CheckoutOrchestrator<S, P> {
    store: S,
    ledger: InventoryLedger<S>,
    payments: P,
    settings: CheckoutSettings,
}

impl<S, P> CheckoutOrchestrator<S, P>
where
    S: CommerceStore + Clone,
    P: PaymentGateway,
{
    /// Creates a new checkout orchestrator.
    pub fn new(store: S, payments: P, settings: CheckoutSettings) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
            payments,
            settings,
        }
    }

    /// Returns the pricing policy applied to new orders.
    pub fn pricing_policy(&self) -> &PricingPolicy {
        &self.settings.pricing
    }

    /// Checks out the user's cart.
    ///
    /// On success the order is `pending` with its stock reserved and a
    /// payment handle attached, and the cart is empty.
    #[tracing::instrument(skip(self, details))]
    pub async fn checkout(&self, user_id: UserId, details: CheckoutDetails) -> Result<Order> {
        let start = Instant::now();
        let result = self.checkout_cart(user_id, details).await;
        Self::record_outcome("cart", &result, start);
        result
    }

    /// Places an order for explicit lines without touching the stored cart.
    ///
    /// Lines are validated exactly like cart adds.
    #[tracing::instrument(skip(self, lines, details), fields(lines = lines.len()))]
    pub async fn place_order(
        &self,
        user_id: UserId,
        lines: Vec<RequestedLine>,
        details: CheckoutDetails,
    ) -> Result<Order> {
        let start = Instant::now();
        let result = self.buy_now(user_id, lines, details).await;
        Self::record_outcome("buy_now", &result, start);
        result
    }

    /// Confirms the order's payment with the gateway.
    ///
    /// On success the payment is marked paid and the order moves
    /// `pending → confirmed`. A decline marks the payment failed and leaves
    /// the order pending (and cancellable).
    #[tracing::instrument(skip(self))]
    pub async fn complete_checkout(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let mut order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if order.user_id() != user_id {
            return Err(CheckoutError::Forbidden(format!(
                "order {order_id} belongs to another user"
            )));
        }
        if order.status() != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                from: order.status(),
                to: OrderStatus::Confirmed,
            }
            .into());
        }
        let handle = order.payment().handle.clone().ok_or_else(|| {
            CheckoutError::Invalid(format!("order {order_id} has no payment to confirm"))
        })?;

        let loaded_version = order.version();
        match self.payments.confirm_payment(&handle).await? {
            PaymentConfirmation::Succeeded => {
                order.mark_paid();
                order.transition(
                    OrderStatus::Confirmed,
                    Some("payment confirmed".to_string()),
                    Actor::User(user_id),
                )?;
                self.store.save_order(&order, loaded_version).await?;

                metrics::counter!(
                    "order_transitions_total",
                    "from" => OrderStatus::Pending.as_str(),
                    "to" => OrderStatus::Confirmed.as_str()
                )
                .increment(1);
                tracing::info!(%order_id, order_number = %order.order_number(), "payment confirmed");
                Ok(order)
            }
            PaymentConfirmation::Declined(reason) => {
                order.mark_payment_failed();
                self.store.save_order(&order, loaded_version).await?;
                tracing::warn!(%order_id, %reason, "payment declined");
                Err(CheckoutError::PaymentFailed(reason))
            }
        }
    }

    async fn checkout_cart(&self, user_id: UserId, details: CheckoutDetails) -> Result<Order> {
        let mut cart = self
            .store
            .get_cart(user_id)
            .await?
            .filter(|c| !c.is_empty())
            .ok_or(CheckoutError::EmptyCart)?;

        self.revalidate(&cart).await?;

        let lines = cart.items().iter().map(order_line).collect();
        let order = self.submit(user_id, lines, details).await?;

        // The order is placed; a failed cart write is logged, not returned
        cart.clear();
        if let Err(e) = self.store.save_cart(&cart).await {
            metrics::counter!("cart_clear_failures_total").increment(1);
            tracing::error!(
                %user_id,
                order_id = %order.id(),
                error = %e,
                "order placed but cart could not be cleared"
            );
        }
        Ok(order)
    }

    async fn buy_now(
        &self,
        user_id: UserId,
        lines: Vec<RequestedLine>,
        details: CheckoutDetails,
    ) -> Result<Order> {
        if lines.is_empty() {
            return Err(OrderError::NoItems.into());
        }

        // A scratch cart gives the same variant, quantity and stock checks
        // (and line merging) as adding to the real cart.
        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products: HashMap<ProductId, _> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut scratch = Cart::new(user_id);
        for line in &lines {
            let product = products
                .get(&line.product_id)
                .ok_or(CheckoutError::ProductNotFound(line.product_id))?;
            scratch.add_item(product, line.quantity, &line.variant)?;
        }

        let lines = scratch.items().iter().map(order_line).collect();
        self.submit(user_id, lines, details).await
    }

    /// Fails with every cart line that exceeds current purchasable stock.
    async fn revalidate(&self, cart: &Cart) -> Result<()> {
        let ids: Vec<ProductId> = cart.items().iter().map(|l| l.product_id).collect();
        let available: HashMap<ProductId, u32> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p.purchasable_stock()))
            .collect();

        let conflicts: Vec<StockConflict> = cart
            .items()
            .iter()
            .filter_map(|line| {
                let available = available.get(&line.product_id).copied().unwrap_or(0);
                (line.quantity > available).then(|| StockConflict {
                    line_id: line.id,
                    product_id: line.product_id,
                    name: line.name.clone(),
                    requested: line.quantity,
                    available,
                })
            })
            .collect();

        if conflicts.is_empty() {
            Ok(())
        } else {
            Err(CheckoutError::StockConflict(conflicts))
        }
    }

    /// Inserts the pending order, reserves its stock and opens the payment.
    async fn submit(
        &self,
        user_id: UserId,
        lines: Vec<OrderLine>,
        details: CheckoutDetails,
    ) -> Result<Order> {
        let new_order = NewOrder {
            user_id,
            lines,
            shipping_address: details.shipping_address,
            billing_address: details.billing_address,
            payment_method: details.payment_method,
            pricing: self.settings.pricing,
        };
        let mut order = self.insert_order(new_order).await?;
        let order_id = order.id();
        let inserted_version = order.version();

        let reservations: Vec<LedgerEntry> = order
            .items()
            .iter()
            .map(|l| (l.product_id, StockOperation::Reserve(l.quantity)))
            .collect();

        if let Err(e) = self.ledger.apply_all(&reservations).await {
            self.discard(order_id).await;
            return Err(e);
        }

        let handle = match self
            .payments
            .create_payment(order_id, order.total(), &self.settings.currency)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                self.ledger.compensate(&reservations).await;
                self.discard(order_id).await;
                return Err(match e {
                    CheckoutError::PaymentFailed(reason) => CheckoutError::PaymentFailed(reason),
                    other => CheckoutError::PaymentFailed(other.to_string()),
                });
            }
        };

        order.record_payment_handle(handle);
        order.set_inventory_state(InventoryState::Reserved);
        if let Err(e) = self.store.save_order(&order, inserted_version).await {
            self.ledger.compensate(&reservations).await;
            self.discard(order_id).await;
            return Err(e.into());
        }

        tracing::info!(
            %order_id,
            order_number = %order.order_number(),
            total = %order.total(),
            "order placed"
        );
        Ok(order)
    }

    /// Inserts a new order, regenerating the order number on collision.
    async fn insert_order(&self, new_order: NewOrder) -> Result<Order> {
        let mut attempt = 1;
        loop {
            let order = Order::new(new_order.clone())?;
            match self.store.insert_order(&order).await {
                Ok(()) => return Ok(order),
                Err(StoreError::DuplicateKey { key, value })
                    if key == "order_number" && attempt < MAX_ORDER_NUMBER_ATTEMPTS =>
                {
                    tracing::warn!(attempt, order_number = %value, "order number collision, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn discard(&self, order_id: OrderId) {
        if let Err(e) = self.store.discard_order(order_id).await {
            tracing::error!(%order_id, error = %e, "failed to discard pending order");
        }
    }

    fn record_outcome(kind: &'static str, result: &Result<Order>, start: Instant) {
        metrics::histogram!("checkout_duration_seconds", "kind" => kind)
            .record(start.elapsed().as_secs_f64());
        match result {
            Ok(_) => metrics::counter!("checkout_total", "kind" => kind).increment(1),
            Err(e) => {
                metrics::counter!("checkout_failed_total", "kind" => kind, "reason" => e.kind())
                    .increment(1);
                tracing::warn!(error = %e, "checkout failed");
            }
        }
    }
}

fn order_line(line: &CartLine) -> OrderLine {
    OrderLine {
        product_id: line.product_id,
        name: line.name.clone(),
        sku: line.sku.clone(),
        image: line.image.clone(),
        variant: line.variant.clone(),
        unit_price: line.unit_price,
        quantity: line.quantity,
    }
}
