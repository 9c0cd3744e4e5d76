//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{
    Actor, Address, InventoryState, OrderError, OrderLine, OrderNumber, OrderStatus, PaymentInfo,
    PaymentStatus, Pricing, PricingPolicy, RefundRecord, StatusChange, StatusTimestamps, Tracking,
};
use crate::money::Money;

/// Everything checkout knows when it creates an order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub payment_method: String,
    pub pricing: PricingPolicy,
}

/// Order aggregate root.
///
/// Line items and prices are snapshots; later catalog edits never reach an
/// existing order. The status only moves through [`Order::transition`] (and
/// [`Order::process_refund`]), and every move is appended to the history.
///
/// `version` goes up by one on every mutation. Stores compare it on save so a
/// change based on a stale read is rejected instead of overwriting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: OrderNumber,
    user_id: UserId,
    items: Vec<OrderLine>,
    pricing: Pricing,
    shipping_address: Address,
    billing_address: Address,
    payment: PaymentInfo,
    status: OrderStatus,
    status_history: Vec<StatusChange>,
    timestamps: StatusTimestamps,
    tracking: Option<Tracking>,
    refund: Option<RefundRecord>,
    inventory: InventoryState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    version: u64,
}

impl Order {
    /// Creates a pending order with a fresh id and order number.
    pub fn new(new: NewOrder) -> Result<Self, OrderError> {
        if new.lines.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(line) = new.lines.iter().find(|l| l.quantity == 0) {
            return Err(OrderError::InvalidQuantity {
                product_id: line.product_id,
            });
        }
        if let Some(field) = new.shipping_address.missing_field() {
            return Err(OrderError::InvalidAddress { field });
        }
        if let Some(field) = new
            .billing_address
            .as_ref()
            .and_then(Address::missing_field)
        {
            return Err(OrderError::InvalidAddress { field });
        }

        let now = Utc::now();
        let subtotal: Money = new.lines.iter().map(OrderLine::line_total).sum();
        let pricing = new.pricing.quote(subtotal);
        let billing_address = new
            .billing_address
            .unwrap_or_else(|| new.shipping_address.clone());

        Ok(Self {
            id: OrderId::new(),
            order_number: OrderNumber::generate(),
            user_id: new.user_id,
            items: new.lines,
            pricing,
            shipping_address: new.shipping_address,
            billing_address,
            payment: PaymentInfo {
                method: new.payment_method,
                ..PaymentInfo::default()
            },
            status: OrderStatus::Pending,
            status_history: vec![StatusChange {
                status: OrderStatus::Pending,
                at: now,
                note: Some("Order placed".to_string()),
                actor: Actor::User(new.user_id),
            }],
            timestamps: StatusTimestamps::default(),
            tracking: None,
            refund: None,
            inventory: InventoryState::Unreserved,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &OrderNumber {
        &self.order_number
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn items(&self) -> &[OrderLine] {
        &self.items
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub fn total(&self) -> Money {
        self.pricing.total
    }

    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    pub fn billing_address(&self) -> &Address {
        &self.billing_address
    }

    pub fn payment(&self) -> &PaymentInfo {
        &self.payment
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn timestamps(&self) -> &StatusTimestamps {
        &self.timestamps
    }

    pub fn tracking(&self) -> Option<&Tracking> {
        self.tracking.as_ref()
    }

    pub fn refund(&self) -> Option<&RefundRecord> {
        self.refund.as_ref()
    }

    pub fn inventory(&self) -> InventoryState {
        self.inventory
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Number of mutations applied since the order was created.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Total units across all lines.
    pub fn total_quantity(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// Command methods
impl Order {
    /// Moves the order to `next` if the transition table allows it.
    ///
    /// Appends a history entry and stamps the status timestamp. Inventory is
    /// not touched here; the caller drives the ledger.
    pub fn transition(
        &mut self,
        next: OrderStatus,
        note: Option<String>,
        actor: Actor,
    ) -> Result<(), OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.enter(next, note, actor);
        Ok(())
    }

    /// Records a refund and moves the order to `refunded`.
    ///
    /// The amount is checked before the status so an oversized refund is
    /// reported as such whatever state the order is in. Only `returned`
    /// orders can be refunded.
    pub fn process_refund(
        &mut self,
        amount: Money,
        reason: impl Into<String>,
        refund_id: impl Into<String>,
        actor: Actor,
    ) -> Result<(), OrderError> {
        if amount > self.pricing.total {
            return Err(OrderError::RefundExceedsTotal {
                requested: amount,
                total: self.pricing.total,
            });
        }
        if !amount.is_positive() {
            return Err(OrderError::InvalidAmount { amount });
        }
        self.ensure_refundable()?;

        let reason = reason.into();
        let now = Utc::now();
        self.refund = Some(RefundRecord {
            amount,
            reason: reason.clone(),
            refund_id: refund_id.into(),
            refunded_at: now,
        });
        self.payment.status = PaymentStatus::Refunded;
        self.enter(OrderStatus::Refunded, Some(reason), actor);
        Ok(())
    }

    /// Fails unless a refund could be recorded right now.
    ///
    /// Lets callers check before asking the payment gateway for money back.
    pub fn ensure_refundable(&self) -> Result<(), OrderError> {
        if !self.status.can_transition_to(OrderStatus::Refunded) {
            return Err(OrderError::InvalidTransition {
                from: self.status,
                to: OrderStatus::Refunded,
            });
        }
        Ok(())
    }

    /// Recomputes the price breakdown from lines, tax rate, shipping and
    /// discount.
    ///
    /// Idempotent: calling it again with unchanged inputs yields the same
    /// breakdown.
    pub fn calculate_totals(&mut self) -> Pricing {
        let subtotal: Money = self.items.iter().map(OrderLine::line_total).sum();
        self.pricing = Pricing::compute(
            subtotal,
            self.pricing.tax_rate_bps,
            self.pricing.shipping_cost,
            self.pricing.discount,
        );
        self.pricing
    }

    /// Sets the discount and recomputes totals.
    pub fn apply_discount(&mut self, discount: Money) -> Result<Pricing, OrderError> {
        self.ensure_pricing_adjustable(discount)?;
        self.pricing.discount = discount;
        self.touch();
        Ok(self.calculate_totals())
    }

    /// Overrides the shipping cost and recomputes totals.
    pub fn set_shipping_cost(&mut self, shipping_cost: Money) -> Result<Pricing, OrderError> {
        self.ensure_pricing_adjustable(shipping_cost)?;
        self.pricing.shipping_cost = shipping_cost;
        self.touch();
        Ok(self.calculate_totals())
    }

    /// Attaches carrier tracking. Only shipped or delivered orders carry one.
    pub fn set_tracking(&mut self, tracking: Tracking) -> Result<(), OrderError> {
        if !matches!(self.status, OrderStatus::Shipped | OrderStatus::Delivered) {
            return Err(OrderError::TrackingNotAllowed {
                status: self.status,
            });
        }
        self.tracking = Some(tracking);
        self.touch();
        Ok(())
    }

    /// Records where the order's stock sits in the ledger.
    pub fn set_inventory_state(&mut self, state: InventoryState) {
        self.inventory = state;
        self.touch();
    }

    pub fn record_payment_handle(&mut self, handle: impl Into<String>) {
        self.payment.handle = Some(handle.into());
        self.touch();
    }

    pub fn mark_paid(&mut self) {
        self.payment.status = PaymentStatus::Paid;
        self.payment.paid_at = Some(Utc::now());
        self.touch();
    }

    /// Stores the gateway reference on a refund recorded by
    /// [`Order::process_refund`].
    pub fn record_refund_id(&mut self, refund_id: impl Into<String>) -> Result<(), OrderError> {
        let refund = self.refund.as_mut().ok_or(OrderError::InvalidTransition {
            from: self.status,
            to: OrderStatus::Refunded,
        })?;
        refund.refund_id = refund_id.into();
        self.touch();
        Ok(())
    }

    /// Returns `previous` re-stamped as the next version of this order.
    ///
    /// Used to put back the content of an earlier read after a saved change
    /// could not be completed.
    pub fn rollback_to(&self, previous: Order) -> Order {
        Order {
            updated_at: Utc::now(),
            version: self.version + 1,
            ..previous
        }
    }

    pub fn mark_payment_failed(&mut self) {
        self.payment.status = PaymentStatus::Failed;
        self.touch();
    }

    fn ensure_pricing_adjustable(&self, amount: Money) -> Result<(), OrderError> {
        if !self.status.can_adjust_pricing() {
            return Err(OrderError::PricingLocked {
                status: self.status,
            });
        }
        if amount.is_negative() {
            return Err(OrderError::InvalidAmount { amount });
        }
        Ok(())
    }

    fn enter(&mut self, status: OrderStatus, note: Option<String>, actor: Actor) {
        let now = Utc::now();
        self.status = status;
        self.timestamps.record(status, now);
        self.status_history.push(StatusChange {
            status,
            at: now,
            note,
            actor,
        });
        self.updated_at = now;
        self.version += 1;
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}
