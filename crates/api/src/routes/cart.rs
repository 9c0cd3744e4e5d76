//! Cart endpoints. Every route acts on the caller's own cart.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{LineItemId, ProductId};
use domain::{Cart, Variant};
use serde::Deserialize;
use store::CommerceStore;

use super::{ApiJson, Envelope, parse_id};
use crate::auth::{Capability, Principal};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
    pub variant: Variant,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
) -> Result<Json<Envelope<Cart>>, ApiError> {
    principal.require(Capability::CartWrite)?;
    let cart = state.carts.get_cart(principal.user_id).await?;
    Ok(Envelope::ok(cart))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
) -> Result<Json<Envelope<Cart>>, ApiError> {
    principal.require(Capability::CartWrite)?;
    let cart = state.carts.clear(principal.user_id).await?;
    Ok(Envelope::with_message(cart, "Cart cleared"))
}

/// POST /cart/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    ApiJson(req): ApiJson<AddItemRequest>,
) -> Result<(StatusCode, Json<Envelope<Cart>>), ApiError> {
    principal.require(Capability::CartWrite)?;
    let cart = state
        .carts
        .add_item(principal.user_id, req.product_id, req.quantity, &req.variant)
        .await?;
    Ok(Envelope::created(cart, "Item added to cart"))
}

/// PUT /cart/items/{line_id}. A quantity of zero removes the line.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(line_id): Path<String>,
    ApiJson(req): ApiJson<UpdateItemRequest>,
) -> Result<Json<Envelope<Cart>>, ApiError> {
    principal.require(Capability::CartWrite)?;
    let line_id = parse_id(&line_id, "line item", LineItemId::parse_str)?;
    let cart = state
        .carts
        .update_item(principal.user_id, line_id, req.quantity)
        .await?;
    Ok(Envelope::with_message(cart, "Cart updated"))
}

/// DELETE /cart/items/{line_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(line_id): Path<String>,
) -> Result<Json<Envelope<Cart>>, ApiError> {
    principal.require(Capability::CartWrite)?;
    let line_id = parse_id(&line_id, "line item", LineItemId::parse_str)?;
    let cart = state.carts.remove_item(principal.user_id, line_id).await?;
    Ok(Envelope::with_message(cart, "Item removed from cart"))
}
