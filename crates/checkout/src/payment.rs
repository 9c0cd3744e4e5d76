//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::Money;
use tokio::sync::RwLock;

use crate::error::{CheckoutError, Result};

/// Result of confirming a payment handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentConfirmation {
    /// Funds captured.
    Succeeded,
    /// The gateway refused the charge.
    Declined(String),
}

/// Trait for payment processing operations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment for an order and returns the gateway's handle.
    async fn create_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        currency: &str,
    ) -> Result<String>;

    /// Confirms (captures) a previously created payment.
    async fn confirm_payment(&self, handle: &str) -> Result<PaymentConfirmation>;

    /// Refunds part or all of a confirmed payment. Returns the refund id.
    async fn refund(&self, handle: &str, amount: Money) -> Result<String>;
}

#[derive(Debug, Clone)]
struct PaymentRecord {
    order_id: OrderId,
    amount: Money,
    captured: bool,
    refunded: Money,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    payments: HashMap<String, PaymentRecord>,
    next_payment: u32,
    next_refund: u32,
    fail_on_create: bool,
    decline_on_confirm: bool,
    fail_on_refund: bool,
}

/// In-memory payment gateway.
///
/// Issues sequential `PAY-0001` / `REF-0001` ids and can be told to fail
/// each call for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory payment gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to fail every `create_payment` call.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Configures the gateway to decline every confirmation.
    pub async fn set_decline_on_confirm(&self, decline: bool) {
        self.state.write().await.decline_on_confirm = decline;
    }

    /// Configures the gateway to fail every refund.
    pub async fn set_fail_on_refund(&self, fail: bool) {
        self.state.write().await.fail_on_refund = fail;
    }

    /// Returns the number of open payments.
    pub async fn payment_count(&self) -> usize {
        self.state.read().await.payments.len()
    }

    /// Returns the amount refunded so far against a handle.
    pub async fn refunded_amount(&self, handle: &str) -> Option<Money> {
        self.state
            .read()
            .await
            .payments
            .get(handle)
            .map(|p| p.refunded)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_payment(
        &self,
        order_id: OrderId,
        amount: Money,
        _currency: &str,
    ) -> Result<String> {
        let mut state = self.state.write().await;

        if state.fail_on_create {
            return Err(CheckoutError::PaymentFailed(
                "Payment gateway unavailable".to_string(),
            ));
        }

        state.next_payment += 1;
        let handle = format!("PAY-{:04}", state.next_payment);
        state.payments.insert(
            handle.clone(),
            PaymentRecord {
                order_id,
                amount,
                captured: false,
                refunded: Money::zero(),
            },
        );

        tracing::debug!(%order_id, %amount, %handle, "payment created");
        Ok(handle)
    }

    async fn confirm_payment(&self, handle: &str) -> Result<PaymentConfirmation> {
        let mut state = self.state.write().await;
        let decline = state.decline_on_confirm;

        let payment = state
            .payments
            .get_mut(handle)
            .ok_or_else(|| CheckoutError::PaymentFailed(format!("Unknown payment {handle}")))?;

        if decline {
            return Ok(PaymentConfirmation::Declined("Card declined".to_string()));
        }

        payment.captured = true;
        tracing::debug!(order_id = %payment.order_id, handle, "payment captured");
        Ok(PaymentConfirmation::Succeeded)
    }

    async fn refund(&self, handle: &str, amount: Money) -> Result<String> {
        let mut state = self.state.write().await;

        if state.fail_on_refund {
            return Err(CheckoutError::PaymentFailed(
                "Refund rejected by gateway".to_string(),
            ));
        }

        let payment = state
            .payments
            .get_mut(handle)
            .ok_or_else(|| CheckoutError::PaymentFailed(format!("Unknown payment {handle}")))?;

        if !payment.captured {
            return Err(CheckoutError::PaymentFailed(format!(
                "Payment {handle} was never captured"
            )));
        }
        let remaining = payment.amount - payment.refunded;
        if amount > remaining {
            return Err(CheckoutError::PaymentFailed(format!(
                "Refund of {amount} exceeds remaining {remaining}"
            )));
        }
        payment.refunded += amount;

        state.next_refund += 1;
        Ok(format!("REF-{:04}", state.next_refund))
    }
}
