//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::ProductId;
use domain::{Money, NewProduct, Product, ProductUpdate, Variant};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::{ApiJson, Envelope, parse_id};
use crate::auth::{Capability, Principal};
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub price: Money,
    pub variant: Variant,
    pub total_stock: u32,
    #[serde(default)]
    pub is_featured: bool,
}

/// A product with its derived stock figures.
#[derive(Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub product: Product,
    pub available_stock: u32,
    pub in_stock: bool,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            available_stock: product.available_stock(),
            in_stock: product.in_stock(),
            product,
        }
    }
}

/// POST /products
#[tracing::instrument(skip(state, req))]
pub async fn create<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    ApiJson(req): ApiJson<CreateProductRequest>,
) -> Result<(StatusCode, Json<Envelope<ProductResponse>>), ApiError> {
    principal.require(Capability::CatalogManage)?;

    let sku = req.sku.trim();
    let name = req.name.trim();
    if sku.is_empty() || name.is_empty() {
        return Err(ApiError::Validation("sku and name are required".to_string()));
    }
    if req.price.is_negative() {
        return Err(ApiError::Validation("price must not be negative".to_string()));
    }

    let product = Product::new(NewProduct {
        sku: sku.to_string(),
        name: name.to_string(),
        image: req.image,
        price: req.price,
        variant: req.variant,
        total_stock: req.total_stock,
        is_featured: req.is_featured,
    });
    state.store.insert_product(&product).await?;

    tracing::info!(product_id = %product.id, sku = %product.sku, "product created");
    Ok(Envelope::created(product.into(), "Product created"))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ProductResponse>>, ApiError> {
    let product_id = parse_id(&id, "product", ProductId::parse_str)?;
    let product = state
        .store
        .get_product(product_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Product not found: {product_id}")))?;

    Ok(Envelope::ok(product.into()))
}

/// PATCH /products/{id}
#[tracing::instrument(skip(state, update))]
pub async fn update<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<String>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<Json<Envelope<ProductResponse>>, ApiError> {
    principal.require(Capability::CatalogManage)?;
    let product_id = parse_id(&id, "product", ProductId::parse_str)?;

    let product = state.store.update_product(product_id, update).await?;

    Ok(Envelope::with_message(product.into(), "Product updated"))
}

/// DELETE /products/{id}. Deactivates the product; existing orders keep
/// their snapshots and carts fail the next stock check.
#[tracing::instrument(skip(state))]
pub async fn deactivate<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<Envelope<ProductResponse>>, ApiError> {
    principal.require(Capability::CatalogManage)?;
    let product_id = parse_id(&id, "product", ProductId::parse_str)?;

    let update = ProductUpdate {
        is_active: Some(false),
        ..ProductUpdate::default()
    };
    let product = state.store.update_product(product_id, update).await?;

    tracing::info!(%product_id, "product deactivated");
    Ok(Envelope::with_message(product.into(), "Product deactivated"))
}
