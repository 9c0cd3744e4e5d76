//! Integration tests for the API server.

use std::sync::OnceLock;

use api::auth::Role;
use api::config::ApiToken;
use api::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::UserId;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

const ALICE: &str = "alice-token";
const BOB: &str = "bob-token";
const STAFF: &str = "staff-token";
const ADMIN: &str = "admin-token";

struct TestApp {
    app: Router,
    alice: UserId,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(|_| {})
    }

    fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let alice = UserId::new();
        let grant = |token: &str, user_id: UserId, role: Role| ApiToken {
            token: token.to_string(),
            user_id,
            role,
        };

        let mut config = Config {
            api_tokens: vec![
                grant(ALICE, alice, Role::Customer),
                grant(BOB, UserId::new(), Role::Customer),
                grant(STAFF, UserId::new(), Role::Staff),
                grant(ADMIN, UserId::new(), Role::Admin),
            ],
            ..Config::default()
        };
        adjust(&mut config);

        let state = api::create_default_state(InMemoryStore::new(), &config);
        let app = api::create_app(state, get_metrics_handle());
        Self { app, alice }
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value).unwrap())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    async fn create_product(&self, sku: &str, price_cents: i64, stock: u32) -> String {
        let (status, body) = self
            .send(
                "POST",
                "/products",
                Some(ADMIN),
                Some(json!({
                    "sku": sku,
                    "name": format!("Product {sku}"),
                    "price": price_cents,
                    "variant": { "colour": "Navy", "size": "lg" },
                    "total_stock": stock,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_str().unwrap().to_string()
    }

    async fn add_to_cart(&self, token: &str, product_id: &str, quantity: u32) -> (StatusCode, Value) {
        self.send(
            "POST",
            "/cart/items",
            Some(token),
            Some(json!({
                "product_id": product_id,
                "quantity": quantity,
                "variant": { "colour": "navy", "size": "lg" },
            })),
        )
        .await
    }

    async fn checkout(&self, token: &str) -> (StatusCode, Value) {
        self.send("POST", "/checkout", Some(token), Some(checkout_details()))
            .await
    }

    async fn set_status(&self, order_id: &str, status: &str) -> (StatusCode, Value) {
        self.send(
            "PUT",
            &format!("/orders/{order_id}/status"),
            Some(STAFF),
            Some(json!({ "status": status })),
        )
        .await
    }
}

fn checkout_details() -> Value {
    json!({
        "shipping_address": {
            "name": "Grace Hopper",
            "street1": "1 Navy Way",
            "city": "Arlington",
            "state": "VA",
            "postal_code": "22202",
            "country": "US"
        },
        "payment_method": "card"
    })
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new();

    let (status, body) = t.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_missing_or_unknown_token_is_unauthenticated() {
    let t = TestApp::new();

    let (status, body) = t.send("GET", "/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "UNAUTHENTICATED");

    let (status, _) = t.send("GET", "/cart", Some("who-knows"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_customer_cannot_manage_catalog() {
    let t = TestApp::new();

    let (status, body) = t
        .send(
            "POST",
            "/products",
            Some(ALICE),
            Some(json!({
                "sku": "X",
                "name": "X",
                "price": 100,
                "variant": { "colour": "red", "size": "sm" },
                "total_stock": 1,
            })),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_product_lifecycle() {
    let t = TestApp::new();
    let id = t.create_product("TEE-NAVY-LG", 2_000, 7).await;

    let (status, body) = t.send("GET", &format!("/products/{id}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["sku"], "TEE-NAVY-LG");
    assert_eq!(body["data"]["available_stock"], 7);
    assert_eq!(body["data"]["in_stock"], true);

    let (status, body) = t
        .send(
            "PATCH",
            &format!("/products/{id}"),
            Some(ADMIN),
            Some(json!({ "price": 2_500, "total_stock": 9 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["price"], 2_500);
    assert_eq!(body["data"]["available_stock"], 9);

    let (status, body) = t
        .send("DELETE", &format!("/products/{id}"), Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);

    let (status, _) = t
        .send(
            "POST",
            "/products",
            Some(ADMIN),
            Some(json!({
                "sku": "TEE-NAVY-LG",
                "name": "Again",
                "price": 100,
                "variant": { "colour": "navy", "size": "lg" },
                "total_stock": 1,
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_unknown_and_malformed_product_ids() {
    let t = TestApp::new();

    let missing = common::ProductId::new();
    let (status, body) = t
        .send("GET", &format!("/products/{missing}"), None, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, body) = t.send("GET", "/products/not-a-uuid", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_wrong_variant_is_rejected() {
    let t = TestApp::new();
    let id = t.create_product("CAP", 1_000, 5).await;

    let (status, body) = t
        .send(
            "POST",
            "/cart/items",
            Some(ALICE),
            Some(json!({
                "product_id": id,
                "quantity": 1,
                "variant": { "colour": "navy", "size": "sm" },
            })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VARIANT_UNAVAILABLE");
}

#[tokio::test]
async fn test_cart_checkout_and_complete_flow() {
    let t = TestApp::new();
    let product_id = t.create_product("P1", 2_500, 3).await;

    let (status, body) = t.add_to_cart(ALICE, &product_id, 3).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["total_items"], 3);
    assert_eq!(body["data"]["total_amount"], 7_500);

    let (status, body) = t.checkout(ALICE).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let order = &body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(order["user_id"], t.alice.to_string());
    assert_eq!(order["pricing"]["subtotal"], 7_500);
    assert_eq!(order["pricing"]["tax"], 600);
    assert_eq!(order["pricing"]["shipping_cost"], 1_000);
    assert_eq!(order["pricing"]["total"], 9_100);
    assert!(order["order_number"].as_str().unwrap().starts_with("ORD-"));
    let order_id = order["id"].as_str().unwrap().to_string();

    let (_, body) = t.send("GET", "/cart", Some(ALICE), None).await;
    assert_eq!(body["data"]["items"], json!([]));

    let (_, body) = t
        .send("GET", &format!("/products/{product_id}"), None, None)
        .await;
    assert_eq!(body["data"]["sold_count"], 3);
    assert_eq!(body["data"]["available_stock"], 0);

    let (status, body) = t
        .send(
            "POST",
            "/checkout/complete",
            Some(ALICE),
            Some(json!({ "order_id": order_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "confirmed");
    assert_eq!(body["data"]["payment"]["status"], "paid");

    let (status, body) = t.send("GET", "/orders", Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stock_conflict_reports_lines() {
    let t = TestApp::new();
    let product_id = t.create_product("P2", 1_000, 4).await;

    t.add_to_cart(ALICE, &product_id, 4).await;
    t.add_to_cart(BOB, &product_id, 2).await;
    let (status, _) = t.checkout(BOB).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = t.checkout(ALICE).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "STOCK_CONFLICT");
    let conflicts = body["error"]["details"].as_array().unwrap();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0]["product_id"], product_id.as_str());
    assert_eq!(conflicts[0]["requested"], 4);
    assert_eq!(conflicts[0]["available"], 2);

    let (_, body) = t
        .send("GET", &format!("/products/{product_id}"), None, None)
        .await;
    assert_eq!(body["data"]["sold_count"], 2);
}

#[tokio::test]
async fn test_empty_cart_checkout() {
    let t = TestApp::new();

    let (status, body) = t.checkout(ALICE).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "EMPTY_CART");
}

#[tokio::test]
async fn test_buy_now_order() {
    let t = TestApp::new();
    let product_id = t.create_product("P3", 3_000, 5).await;

    let mut request = checkout_details();
    request["items"] = json!([{
        "product_id": product_id,
        "variant": { "colour": "navy", "size": "lg" },
        "quantity": 2,
    }]);
    let (status, body) = t.send("POST", "/orders", Some(ALICE), Some(request)).await;

    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["pricing"]["subtotal"], 6_000);
}

#[tokio::test]
async fn test_order_visibility() {
    let t = TestApp::new();
    let product_id = t.create_product("P4", 1_000, 5).await;
    t.add_to_cart(ALICE, &product_id, 1).await;
    let (_, body) = t.checkout(ALICE).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/orders/{order_id}");

    let (status, _) = t.send("GET", &uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = t.send("GET", &uri, Some(BOB), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    let (status, _) = t.send("GET", &uri, Some(STAFF), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = t.send("GET", "/orders", Some(BOB), None).await;
    assert_eq!(body["data"], json!([]));

    let (status, _) = t
        .send("POST", &format!("{uri}/cancel"), Some(BOB), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_transition_is_conflict() {
    let t = TestApp::new();
    let product_id = t.create_product("P5", 1_000, 5).await;
    t.add_to_cart(ALICE, &product_id, 1).await;
    let (_, body) = t.checkout(ALICE).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = t.set_status(&order_id, "shipped").await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "INVALID_TRANSITION");
    assert_eq!(body["error"]["details"]["from"], "pending");

    let (status, _) = t
        .send(
            "PUT",
            &format!("/orders/{order_id}/status"),
            Some(ALICE),
            Some(json!({ "status": "confirmed" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_customer_cancel_releases_stock() {
    let t = TestApp::new();
    let product_id = t.create_product("P6", 1_000, 5).await;
    t.add_to_cart(ALICE, &product_id, 2).await;
    let (_, body) = t.checkout(ALICE).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = t
        .send(
            "POST",
            &format!("/orders/{order_id}/cancel"),
            Some(ALICE),
            Some(json!({ "reason": "ordered by mistake" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
    let (_, body) = t
        .send("GET", &format!("/products/{product_id}"), None, None)
        .await;
    assert_eq!(body["data"]["sold_count"], 0);
}

#[tokio::test]
async fn test_pricing_adjustment_before_processing() {
    let t = TestApp::new();
    let product_id = t.create_product("P7", 20_000, 5).await;
    t.add_to_cart(ALICE, &product_id, 1).await;
    let (_, body) = t.checkout(ALICE).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/orders/{order_id}/pricing");

    let (status, body) = t
        .send("PUT", &uri, Some(STAFF), Some(json!({ "discount": 1_000 })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["pricing"]["discount"], 1_000);
    // 20000 + 1600 tax + free shipping - 1000
    assert_eq!(body["data"]["pricing"]["total"], 20_600);

    t.set_status(&order_id, "confirmed").await;
    t.set_status(&order_id, "processing").await;
    let (status, body) = t
        .send("PUT", &uri, Some(STAFF), Some(json!({ "shipping_cost": 0 })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "PRICING_LOCKED");
    assert_eq!(body["error"]["details"]["status"], "processing");
}

#[tokio::test]
async fn test_return_and_refund_limits() {
    let t = TestApp::new();
    let product_id = t.create_product("P8", 4_000, 5).await;
    t.add_to_cart(ALICE, &product_id, 1).await;
    let (_, body) = t.checkout(ALICE).await;
    let order_id = body["data"]["id"].as_str().unwrap().to_string();
    t.send(
        "POST",
        "/checkout/complete",
        Some(ALICE),
        Some(json!({ "order_id": order_id })),
    )
    .await;
    for status in ["processing", "shipped", "delivered", "returned"] {
        let (code, body) = t.set_status(&order_id, status).await;
        assert_eq!(code, StatusCode::OK, "{status}: {body}");
    }

    let (_, body) = t
        .send("GET", &format!("/orders/{order_id}"), Some(ALICE), None)
        .await;
    let total = body["data"]["pricing"]["total"].as_i64().unwrap();
    let refund_uri = format!("/orders/{order_id}/refund");

    let (status, _) = t
        .send(
            "POST",
            &refund_uri,
            Some(STAFF),
            Some(json!({ "amount": total, "reason": "damaged" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .send(
            "POST",
            &refund_uri,
            Some(ADMIN),
            Some(json!({ "amount": total + 1, "reason": "damaged" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "REFUND_EXCEEDS_TOTAL");

    let (status, body) = t
        .send(
            "POST",
            &refund_uri,
            Some(ADMIN),
            Some(json!({ "amount": total, "reason": "damaged" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "refunded");
    assert_eq!(body["data"]["refund"]["amount"], total);
}

#[tokio::test]
async fn test_checkout_is_rate_limited() {
    let t = TestApp::with_config(|config| config.rate_limit_max = 2);

    for _ in 0..2 {
        let (status, _) = t.checkout(ALICE).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (status, body) = t.checkout(ALICE).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "RATE_LIMITED");

    let (status, _) = t.checkout(BOB).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forbidden_cancel_does_not_use_rate_limit() {
    let t = TestApp::with_config(|config| config.rate_limit_max = 1);
    let product_id = t.create_product("P10", 1_000, 5).await;
    t.add_to_cart(ALICE, &product_id, 1).await;
    let (_, body) = t.checkout(ALICE).await;
    let uri = format!("/orders/{}/cancel", body["data"]["id"].as_str().unwrap());

    for _ in 0..3 {
        let (status, body) = t.send("POST", &uri, Some(BOB), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"]["code"], "FORBIDDEN");
    }

    let (status, body) = t.send("POST", &uri, Some(ALICE), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "cancelled");
}

#[tokio::test]
async fn test_malformed_body_uses_error_envelope() {
    let t = TestApp::new();

    let (status, body) = t
        .send(
            "POST",
            "/cart/items",
            Some(ALICE),
            Some(json!({ "quantity": "lots" })),
        )
        .await;

    assert!(status.is_client_error());
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new();
    let product_id = t.create_product("P9", 1_000, 5).await;
    t.add_to_cart(ALICE, &product_id, 1).await;
    t.checkout(ALICE).await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("checkout_total"));
}
