//! Order placement, lookup and lifecycle endpoints.

use std::sync::Arc;

use ::checkout::{CheckoutDetails, PricingAdjustment, RequestedLine, StatusUpdate};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{Actor, Money, Order};
use serde::Deserialize;
use store::CommerceStore;

use super::{ApiJson, Envelope, parse_id};
use crate::auth::{Capability, Principal};
use crate::error::ApiError;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<RequestedLine>,
    #[serde(flatten)]
    pub details: CheckoutDetails,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    pub amount: Money,
    pub reason: String,
}

// -- Handlers --

/// POST /orders. Buys the given lines directly, bypassing the stored cart.
#[tracing::instrument(skip(state, req))]
pub async fn place<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    ApiJson(req): ApiJson<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<Envelope<Order>>), ApiError> {
    principal.require(Capability::OrdersPlace)?;
    state
        .rate_limiter
        .check(principal.user_id, "checkout")
        .await?;

    let order = state
        .checkout
        .place_order(principal.user_id, req.items, req.details)
        .await?;

    Ok(Envelope::created(order, "Order created"))
}

/// GET /orders. Managers see every order, everyone else their own.
#[tracing::instrument(skip(state))]
pub async fn list<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
) -> Result<Json<Envelope<Vec<Order>>>, ApiError> {
    let orders = if principal.can(Capability::OrdersManage) {
        state.orders.list_all().await?
    } else {
        state.orders.list_for_user(principal.user_id).await?
    };

    Ok(Envelope::ok(orders))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    let order_id = parse_id(&id, "order", OrderId::parse_str)?;
    let order = state.orders.get_order(order_id).await?;
    principal.require_owner_or(order.user_id(), Capability::OrdersManage)?;

    Ok(Envelope::ok(order))
}

/// PUT /orders/{id}/status
#[tracing::instrument(skip(state, update))]
pub async fn update_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    principal.require(Capability::OrdersManage)?;
    let order_id = parse_id(&id, "order", OrderId::parse_str)?;

    let order = state
        .orders
        .update_status(order_id, update, Actor::User(principal.user_id))
        .await?;

    let message = format!("Order status updated to {}", order.status());
    Ok(Envelope::with_message(order, message))
}

/// PUT /orders/{id}/pricing
#[tracing::instrument(skip(state, adjustment))]
pub async fn adjust_pricing<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<String>,
    ApiJson(adjustment): ApiJson<PricingAdjustment>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    principal.require(Capability::OrdersManage)?;
    let order_id = parse_id(&id, "order", OrderId::parse_str)?;

    let order = state.orders.adjust_pricing(order_id, adjustment).await?;

    Ok(Envelope::with_message(order, "Order pricing updated"))
}

/// POST /orders/{id}/cancel. The body, with an optional `reason`, may be
/// omitted.
#[tracing::instrument(skip(state, body))]
pub async fn cancel<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Envelope<Order>>, ApiError> {
    let order_id = parse_id(&id, "order", OrderId::parse_str)?;
    let req: CancelRequest = if body.is_empty() {
        CancelRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Validation(format!("Invalid cancel request: {e}")))?
    };

    let order = state.orders.get_order(order_id).await?;
    principal.require_owner_or(order.user_id(), Capability::OrdersManage)?;
    state.rate_limiter.check(principal.user_id, "cancel").await?;

    let order = state
        .orders
        .cancel_order(order, req.reason, Actor::User(principal.user_id))
        .await?;

    Ok(Envelope::with_message(order, "Order cancelled"))
}

/// POST /orders/{id}/refund
#[tracing::instrument(skip(state, req))]
pub async fn refund<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<RefundRequest>,
) -> Result<Json<Envelope<Order>>, ApiError> {
    principal.require(Capability::OrdersRefund)?;
    let order_id = parse_id(&id, "order", OrderId::parse_str)?;
    state.rate_limiter.check(principal.user_id, "refund").await?;

    let order = state
        .orders
        .refund(
            order_id,
            req.amount,
            req.reason,
            Actor::User(principal.user_id),
        )
        .await?;

    Ok(Envelope::with_message(order, "Refund processed"))
}
