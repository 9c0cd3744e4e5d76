//! API error types with HTTP response mapping.
//!
//! Every error is rendered as
//! `{"success": false, "error": {"code", "details"}, "message"}`.

use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use checkout::CheckoutError;
use domain::{CartError, DomainError, InventoryError, OrderError};
use serde_json::{Value, json};
use store::StoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Malformed input from the client.
    #[error("{0}")]
    Validation(String),

    #[error("Too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Checkout(#[from] CheckoutError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Status, machine-readable code and optional details of an error.
struct ErrorParts {
    status: StatusCode,
    code: &'static str,
    details: Option<Value>,
}

impl ErrorParts {
    fn new(status: StatusCode, code: &'static str) -> Self {
        Self {
            status,
            code,
            details: None,
        }
    }

    fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl ApiError {
    fn parts(&self) -> ErrorParts {
        match self {
            ApiError::Unauthenticated => ErrorParts::new(StatusCode::UNAUTHORIZED, "UNAUTHENTICATED"),
            ApiError::Forbidden(_) => ErrorParts::new(StatusCode::FORBIDDEN, "FORBIDDEN"),
            ApiError::NotFound(_) => ErrorParts::new(StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Validation(_) => {
                ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
            ApiError::RateLimited { retry_after_secs } => {
                ErrorParts::new(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED")
                    .with_details(json!({ "retry_after_secs": retry_after_secs }))
            }
            ApiError::Checkout(err) => checkout_error_parts(err),
            ApiError::Store(err) => store_error_parts(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let parts = self.parts();

        let message = if parts.status.is_server_error() {
            tracing::error!(error = %self, "internal server error");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = json!({
            "success": false,
            "error": {
                "code": parts.code,
                "details": parts.details,
            },
            "message": message,
        });

        let mut response = (parts.status, axum::Json(body)).into_response();
        if let ApiError::RateLimited { retry_after_secs } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

fn internal() -> ErrorParts {
    ErrorParts::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
}

fn checkout_error_parts(err: &CheckoutError) -> ErrorParts {
    match err {
        CheckoutError::EmptyCart => ErrorParts::new(StatusCode::BAD_REQUEST, "EMPTY_CART"),
        CheckoutError::StockConflict(conflicts) => {
            ErrorParts::new(StatusCode::CONFLICT, "STOCK_CONFLICT").with_details(json!(conflicts))
        }
        CheckoutError::ProductNotFound(_) | CheckoutError::OrderNotFound(_) => {
            ErrorParts::new(StatusCode::NOT_FOUND, "NOT_FOUND")
        }
        CheckoutError::Forbidden(_) => ErrorParts::new(StatusCode::FORBIDDEN, "FORBIDDEN"),
        CheckoutError::PaymentFailed(_) => {
            ErrorParts::new(StatusCode::PAYMENT_REQUIRED, "PAYMENT_FAILED")
        }
        CheckoutError::Invalid(_) => ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
        CheckoutError::RefundUnrecorded { refund_id, .. } => {
            ErrorParts::new(StatusCode::INTERNAL_SERVER_ERROR, "REFUND_UNRECORDED")
                .with_details(json!({ "refund_id": refund_id }))
        }
        CheckoutError::Domain(err) => domain_error_parts(err),
        CheckoutError::Store(err) => store_error_parts(err),
    }
}

fn store_error_parts(err: &StoreError) -> ErrorParts {
    match err {
        StoreError::ProductNotFound(_) | StoreError::OrderNotFound(_) => {
            ErrorParts::new(StatusCode::NOT_FOUND, "NOT_FOUND")
        }
        StoreError::DuplicateKey { key, .. } => ErrorParts::new(StatusCode::CONFLICT, "DUPLICATE_KEY")
            .with_details(json!({ "key": key })),
        StoreError::ConcurrencyConflict { .. } | StoreError::StockContention { .. } => {
            ErrorParts::new(StatusCode::CONFLICT, "CONFLICT")
        }
        StoreError::Inventory(err) => inventory_error_parts(err),
        StoreError::ProductUpdate(_) => {
            ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        }
        _ => internal(),
    }
}

fn domain_error_parts(err: &DomainError) -> ErrorParts {
    match err {
        DomainError::Inventory(err) => inventory_error_parts(err),
        DomainError::Cart(err) => match err {
            CartError::VariantUnavailable { .. } => {
                ErrorParts::new(StatusCode::BAD_REQUEST, "VARIANT_UNAVAILABLE")
            }
            CartError::InsufficientStock {
                product_id,
                requested,
                available,
            } => insufficient_stock(product_id, *requested, *available),
            CartError::LineNotFound(_) => ErrorParts::new(StatusCode::NOT_FOUND, "NOT_FOUND"),
            CartError::InvalidQuantity { .. } | CartError::ProductMismatch { .. } => {
                ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
        },
        DomainError::Order(err) => match err {
            OrderError::InvalidTransition { from, to } => {
                ErrorParts::new(StatusCode::CONFLICT, "INVALID_TRANSITION")
                    .with_details(json!({ "from": from, "to": to }))
            }
            OrderError::PricingLocked { status } => {
                ErrorParts::new(StatusCode::CONFLICT, "PRICING_LOCKED")
                    .with_details(json!({ "status": status }))
            }
            OrderError::RefundExceedsTotal { requested, total } => {
                ErrorParts::new(StatusCode::BAD_REQUEST, "REFUND_EXCEEDS_TOTAL")
                    .with_details(json!({ "requested": requested, "total": total }))
            }
            OrderError::InvalidAmount { .. }
            | OrderError::TrackingNotAllowed { .. }
            | OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::InvalidAddress { .. } => {
                ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
            }
        },
        DomainError::Product(_) => ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
    }
}

fn inventory_error_parts(err: &InventoryError) -> ErrorParts {
    match err {
        InventoryError::InsufficientStock {
            product_id,
            requested,
            available,
        } => insufficient_stock(product_id, *requested, *available),
        InventoryError::InvalidQuantity { .. } => {
            ErrorParts::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR")
        }
        // Ledger counters out of step with the order; not something the
        // client can fix.
        _ => internal(),
    }
}

fn insufficient_stock(product_id: &common::ProductId, requested: u32, available: u32) -> ErrorParts {
    ErrorParts::new(StatusCode::CONFLICT, "INSUFFICIENT_STOCK").with_details(json!({
        "product_id": product_id,
        "requested": requested,
        "available": available,
    }))
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout::StockConflict;
    use common::{LineItemId, OrderId, ProductId};
    use domain::{Money, OrderStatus};

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_stock_conflict_lists_lines() {
        let product_id = ProductId::new();
        let err = ApiError::from(CheckoutError::StockConflict(vec![StockConflict {
            line_id: LineItemId::new(),
            product_id,
            name: "Tee".to_string(),
            requested: 4,
            available: 2,
        }]));

        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "STOCK_CONFLICT");
        assert_eq!(body["error"]["details"][0]["requested"], 4);
        assert_eq!(body["error"]["details"][0]["available"], 2);
        assert_eq!(body["error"]["details"][0]["product_id"], product_id.to_string());
    }

    #[tokio::test]
    async fn test_invalid_transition_is_conflict() {
        let err = ApiError::from(CheckoutError::Domain(DomainError::Order(
            OrderError::InvalidTransition {
                from: OrderStatus::Pending,
                to: OrderStatus::Shipped,
            },
        )));

        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
        assert_eq!(body["error"]["details"]["from"], "pending");
        assert_eq!(body["error"]["details"]["to"], "shipped");
    }

    #[tokio::test]
    async fn test_pricing_locked_has_its_own_code() {
        let err = ApiError::from(CheckoutError::Domain(DomainError::Order(
            OrderError::PricingLocked {
                status: OrderStatus::Shipped,
            },
        )));

        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "PRICING_LOCKED");
        assert_eq!(body["error"]["details"]["status"], "shipped");
    }

    #[tokio::test]
    async fn test_concurrent_order_change_is_conflict() {
        let err = ApiError::from(CheckoutError::Store(StoreError::ConcurrencyConflict {
            order_id: OrderId::new(),
            expected: 3,
            actual: 4,
        }));

        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
    }

    #[tokio::test]
    async fn test_contended_release_is_not_reported_as_out_of_stock() {
        let err = ApiError::from(CheckoutError::Store(StoreError::StockContention {
            product_id: ProductId::new(),
            operation: "release",
            attempts: 3,
        }));

        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "CONFLICT");
        assert!(body["message"].as_str().unwrap().contains("release"));
    }

    #[tokio::test]
    async fn test_unrecorded_refund_exposes_refund_id() {
        let err = ApiError::from(CheckoutError::RefundUnrecorded {
            order_id: OrderId::new(),
            refund_id: "REF-0007".to_string(),
            source: StoreError::Unavailable("write rejected".into()),
        });

        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "REFUND_UNRECORDED");
        assert_eq!(body["error"]["details"]["refund_id"], "REF-0007");
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_refund_exceeds_total_is_bad_request() {
        let err = ApiError::from(CheckoutError::Domain(DomainError::Order(
            OrderError::RefundExceedsTotal {
                requested: Money::from_cents(1_001),
                total: Money::from_cents(1_000),
            },
        )));

        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "REFUND_EXCEEDS_TOTAL");
    }

    #[tokio::test]
    async fn test_not_found_and_payment_codes() {
        let (status, body) =
            body_of(ApiError::from(CheckoutError::OrderNotFound(OrderId::new()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");

        let (status, body) =
            body_of(ApiError::from(CheckoutError::PaymentFailed("declined".into()))).await;
        assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(body["error"]["code"], "PAYMENT_FAILED");
    }

    #[tokio::test]
    async fn test_store_failures_hide_details() {
        let err = ApiError::from(StoreError::Unavailable("pool timed out".into()));

        let (status, body) = body_of(err).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "INTERNAL_ERROR");
        assert_eq!(body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited {
            retry_after_secs: 42,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");
    }
}
