//! Order workflow: status transitions with their inventory side effects,
//! refunds and pricing adjustments.

use common::{OrderId, UserId};
use domain::{
    Actor, InventoryState, Money, Order, OrderError, OrderStatus, StockOperation, Tracking,
};
use serde::Deserialize;
use store::CommerceStore;

use crate::error::{CheckoutError, Result};
use crate::ledger::{InventoryLedger, LedgerEntry};
use crate::payment::PaymentGateway;

/// A requested status change.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub tracking: Option<Tracking>,
}

/// Discount and shipping overrides for an order that is not yet processing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PricingAdjustment {
    #[serde(default)]
    pub discount: Option<Money>,
    #[serde(default)]
    pub shipping_cost: Option<Money>,
}

/// Drives orders through the state machine and keeps the inventory ledger in
/// step with them.
pub struct OrderWorkflow<S, P> {
    store: S,
    ledger: InventoryLedger<S>,
    payments: P,
}

impl<S, P> OrderWorkflow<S, P>
where
    S: CommerceStore + Clone,
    P: PaymentGateway,
{
    /// Creates a new order workflow.
    pub fn new(store: S, payments: P) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
            payments,
        }
    }

    /// Loads an order.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// Lists a user's orders, newest first.
    pub async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(self.store.list_orders_for_user(user_id).await?)
    }

    /// Lists every order, newest first.
    pub async fn list_all(&self) -> Result<Vec<Order>> {
        Ok(self.store.list_orders().await?)
    }

    /// Moves an order to a new status.
    pub async fn update_status(
        &self,
        order_id: OrderId,
        update: StatusUpdate,
        actor: Actor,
    ) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        self.apply_status(order, update, actor).await
    }

    /// Moves an already loaded order to a new status.
    ///
    /// Side effects on the ledger, by target status:
    /// - `cancelled`: reserved stock is released (committed stock restored)
    /// - `shipped`: the reservation is released, then the stock committed
    /// - `returned`: committed stock is restored
    ///
    /// The new status is saved against the loaded version before any stock
    /// moves, so of two concurrent changes to one order only the first gets
    /// to touch the ledger. If the ledger then fails, the order is put back.
    #[tracing::instrument(
        skip(self, loaded, update),
        fields(order_id = %loaded.id(), to = %update.status)
    )]
    pub async fn apply_status(
        &self,
        loaded: Order,
        update: StatusUpdate,
        actor: Actor,
    ) -> Result<Order> {
        let order_id = loaded.id();
        let from = loaded.status();
        let to = update.status;

        if update.tracking.is_some() && !matches!(to, OrderStatus::Shipped | OrderStatus::Delivered)
        {
            return Err(OrderError::TrackingNotAllowed { status: to }.into());
        }

        let mut order = loaded.clone();
        order.transition(to, update.note, actor)?;
        if let Some(tracking) = update.tracking {
            order.set_tracking(tracking)?;
        }

        let (entries, inventory) = inventory_effect(&order, to);
        if let Some(state) = inventory {
            order.set_inventory_state(state);
        }

        self.store.save_order(&order, loaded.version()).await?;

        if let Err(e) = self.ledger.apply_all(&entries).await {
            self.roll_back(&order, loaded).await;
            return Err(e);
        }

        metrics::counter!(
            "order_transitions_total",
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);
        tracing::info!(
            %order_id,
            from = %from,
            to = %to,
            inventory = ?order.inventory(),
            "order status changed"
        );
        Ok(order)
    }

    /// Cancels an order and releases its reserved stock.
    pub async fn cancel(
        &self,
        order_id: OrderId,
        reason: Option<String>,
        actor: Actor,
    ) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        self.cancel_order(order, reason, actor).await
    }

    /// Cancels an already loaded order.
    pub async fn cancel_order(
        &self,
        order: Order,
        reason: Option<String>,
        actor: Actor,
    ) -> Result<Order> {
        self.apply_status(
            order,
            StatusUpdate {
                status: OrderStatus::Cancelled,
                note: reason,
                tracking: None,
            },
            actor,
        )
        .await
    }

    /// Refunds a returned order through the payment gateway.
    ///
    /// The order is saved as `refunded` before the gateway is called, so a
    /// second refund racing this one fails on the version check and never
    /// reaches the gateway. A gateway failure puts the order back to
    /// `returned`.
    #[tracing::instrument(skip(self, reason))]
    pub async fn refund(
        &self,
        order_id: OrderId,
        amount: Money,
        reason: String,
        actor: Actor,
    ) -> Result<Order> {
        let loaded = self.get_order(order_id).await?;

        let mut order = loaded.clone();
        order.process_refund(amount, reason, String::new(), actor)?;
        let handle = order.payment().handle.clone().ok_or_else(|| {
            CheckoutError::Invalid(format!("order {order_id} has no payment to refund"))
        })?;
        self.store.save_order(&order, loaded.version()).await?;

        let refund_id = match self.payments.refund(&handle, amount).await {
            Ok(refund_id) => refund_id,
            Err(e) => {
                self.roll_back(&order, loaded).await;
                return Err(e);
            }
        };

        let claimed_version = order.version();
        order.record_refund_id(refund_id.clone())?;
        if let Err(source) = self.store.save_order(&order, claimed_version).await {
            metrics::counter!("refunds_unrecorded_total").increment(1);
            tracing::error!(
                %order_id,
                %refund_id,
                %amount,
                error = %source,
                "refund issued by the gateway but not recorded on the order"
            );
            return Err(CheckoutError::RefundUnrecorded {
                order_id,
                refund_id,
                source,
            });
        }

        metrics::counter!("refunds_total").increment(1);
        metrics::counter!(
            "order_transitions_total",
            "from" => OrderStatus::Returned.as_str(),
            "to" => OrderStatus::Refunded.as_str()
        )
        .increment(1);
        tracing::info!(%order_id, %amount, %refund_id, "order refunded");
        Ok(order)
    }

    /// Applies a discount and/or shipping override and recomputes totals.
    #[tracing::instrument(skip(self))]
    pub async fn adjust_pricing(
        &self,
        order_id: OrderId,
        adjustment: PricingAdjustment,
    ) -> Result<Order> {
        let mut order = self.get_order(order_id).await?;
        let loaded_version = order.version();

        if let Some(discount) = adjustment.discount {
            order.apply_discount(discount)?;
        }
        if let Some(shipping_cost) = adjustment.shipping_cost {
            order.set_shipping_cost(shipping_cost)?;
        }

        self.store.save_order(&order, loaded_version).await?;
        tracing::info!(%order_id, total = %order.total(), "order pricing adjusted");
        Ok(order)
    }

    /// Puts back the content of `previous` over a saved change that could
    /// not be completed.
    async fn roll_back(&self, saved: &Order, previous: Order) {
        let order_id = saved.id();
        let restored = saved.rollback_to(previous);
        if let Err(e) = self.store.save_order(&restored, saved.version()).await {
            metrics::counter!("order_rollback_failures_total").increment(1);
            tracing::error!(
                %order_id,
                status = %saved.status(),
                restore_status = %restored.status(),
                error = %e,
                "failed to roll back order"
            );
        }
    }
}

/// Ledger entries a transition into `to` needs, and the resulting inventory
/// state. Empty when the transition does not touch stock.
fn inventory_effect(order: &Order, to: OrderStatus) -> (Vec<LedgerEntry>, Option<InventoryState>) {
    let per_line = |op: fn(u32) -> StockOperation| -> Vec<LedgerEntry> {
        order
            .items()
            .iter()
            .map(|l| (l.product_id, op(l.quantity)))
            .collect()
    };

    match (to, order.inventory()) {
        (OrderStatus::Cancelled, InventoryState::Reserved) => (
            per_line(StockOperation::Release),
            Some(InventoryState::Released),
        ),
        (OrderStatus::Cancelled | OrderStatus::Returned, InventoryState::Committed) => (
            per_line(StockOperation::Restore),
            Some(InventoryState::Restored),
        ),
        (OrderStatus::Shipped, InventoryState::Reserved) => {
            let entries = order
                .items()
                .iter()
                .flat_map(|l| {
                    [
                        (l.product_id, StockOperation::Release(l.quantity)),
                        (l.product_id, StockOperation::Commit(l.quantity)),
                    ]
                })
                .collect();
            (entries, Some(InventoryState::Committed))
        }
        _ => (Vec::new(), None),
    }
}
