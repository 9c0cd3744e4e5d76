//! Checkout endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use ::checkout::CheckoutDetails;
use common::OrderId;
use domain::Order;
use serde::Deserialize;
use store::CommerceStore;

use super::{ApiJson, Envelope};
use crate::auth::{Capability, Principal};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CompleteCheckoutRequest {
    pub order_id: OrderId,
}

/// POST /checkout. Turns the caller's cart into a pending order with the
/// stock reserved.
#[tracing::instrument(skip(state, details))]
pub async fn checkout<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    ApiJson(details): ApiJson<CheckoutDetails>,
) -> Result<(StatusCode, Json<Envelope<Order>>), ApiError> {
    principal.require(Capability::OrdersPlace)?;
    state
        .rate_limiter
        .check(principal.user_id, "checkout")
        .await?;

    let order = state.checkout.checkout(principal.user_id, details).await?;

    Ok(Envelope::created(order, "Order created"))
}

/// POST /checkout/complete. Confirms payment for the caller's pending order.
#[tracing::instrument(skip(state, req))]
pub async fn complete<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    ApiJson(req): ApiJson<CompleteCheckoutRequest>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    principal.require(Capability::OrdersPlace)?;

    let order = state
        .checkout
        .complete_checkout(principal.user_id, req.order_id)
        .await?;

    Ok(Envelope::with_message(order, "Payment confirmed"))
}
