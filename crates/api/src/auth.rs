//! Bearer-token authentication and role capabilities.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use common::UserId;
use store::CommerceStore;

use crate::config::ApiToken;
use crate::error::ApiError;
use crate::state::AppState;

/// A permission tag granted by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    CartWrite,
    OrdersPlace,
    OrdersManage,
    OrdersRefund,
    CatalogManage,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::CartWrite => "cart:write",
            Capability::OrdersPlace => "orders:place",
            Capability::OrdersManage => "orders:manage",
            Capability::OrdersRefund => "orders:refund",
            Capability::CatalogManage => "catalog:manage",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

const CUSTOMER: &[Capability] = &[Capability::CartWrite, Capability::OrdersPlace];

const STAFF: &[Capability] = &[
    Capability::CartWrite,
    Capability::OrdersPlace,
    Capability::OrdersManage,
];

const ADMIN: &[Capability] = &[
    Capability::CartWrite,
    Capability::OrdersPlace,
    Capability::OrdersManage,
    Capability::OrdersRefund,
    Capability::CatalogManage,
];

impl Role {
    /// Capabilities granted by this role.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Customer => CUSTOMER,
            Role::Staff => STAFF,
            Role::Admin => ADMIN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Staff => "staff",
            Role::Admin => "admin",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "customer" | "user" => Ok(Role::Customer),
            "staff" => Ok(Role::Staff),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// The caller of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.capabilities().contains(&capability)
    }

    /// Fails with `Forbidden` unless the role grants `capability`.
    pub fn require(&self, capability: Capability) -> Result<(), ApiError> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!("Missing capability {capability}")))
        }
    }

    /// Passes for the owner of a resource or for holders of `capability`.
    pub fn require_owner_or(&self, owner: UserId, capability: Capability) -> Result<(), ApiError> {
        if self.user_id == owner || self.can(capability) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "Not allowed to access this resource".to_string(),
            ))
        }
    }
}

/// Resolves bearer tokens to principals.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    /// Returns the principal for a token, or `None` if it is unknown.
    async fn current_user(&self, token: &str) -> Option<Principal>;
}

/// Static token table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuthGateway {
    tokens: HashMap<String, Principal>,
}

impl InMemoryAuthGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: &[ApiToken]) -> Self {
        let mut gateway = Self::new();
        for grant in tokens {
            gateway.insert(&grant.token, Principal::new(grant.user_id, grant.role));
        }
        gateway
    }

    pub fn insert(&mut self, token: &str, principal: Principal) {
        self.tokens.insert(token.to_string(), principal);
    }
}

#[async_trait]
impl AuthGateway for InMemoryAuthGateway {
    async fn current_user(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).copied()
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();

    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Authenticates a request against the gateway.
pub async fn authenticate(
    gateway: &dyn AuthGateway,
    headers: &HeaderMap,
) -> Result<Principal, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthenticated)?;
    gateway
        .current_user(token)
        .await
        .ok_or(ApiError::Unauthenticated)
}

impl<S> FromRequestParts<Arc<AppState<S>>> for Principal
where
    S: CommerceStore + Clone + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<S>>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(state.auth.as_ref(), &parts.headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_role_capabilities() {
        let customer = Principal::new(UserId::new(), Role::Customer);
        let staff = Principal::new(UserId::new(), Role::Staff);
        let admin = Principal::new(UserId::new(), Role::Admin);

        assert!(customer.can(Capability::CartWrite));
        assert!(!customer.can(Capability::OrdersManage));
        assert!(staff.can(Capability::OrdersManage));
        assert!(!staff.can(Capability::OrdersRefund));
        assert!(admin.can(Capability::CatalogManage));
    }

    #[test]
    fn test_require_reports_missing_capability() {
        let customer = Principal::new(UserId::new(), Role::Customer);

        let err = customer.require(Capability::OrdersRefund).unwrap_err();

        assert!(matches!(err, ApiError::Forbidden(msg) if msg.contains("orders:refund")));
    }

    #[test]
    fn test_owner_or_capability() {
        let owner = UserId::new();
        let customer = Principal::new(owner, Role::Customer);
        let stranger = Principal::new(UserId::new(), Role::Customer);
        let staff = Principal::new(UserId::new(), Role::Staff);

        assert!(customer.require_owner_or(owner, Capability::OrdersManage).is_ok());
        assert!(stranger.require_owner_or(owner, Capability::OrdersManage).is_err());
        assert!(staff.require_owner_or(owner, Capability::OrdersManage).is_ok());
    }

    #[test]
    fn test_bearer_token_parsing() {
        assert_eq!(bearer_token(&headers("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers("bearer  abc ")), Some("abc"));
        assert_eq!(bearer_token(&headers("Basic abc")), None);
        assert_eq!(bearer_token(&headers("Bearer ")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[tokio::test]
    async fn test_authenticate_known_and_unknown_tokens() {
        let user = UserId::new();
        let mut gateway = InMemoryAuthGateway::new();
        gateway.insert("secret", Principal::new(user, Role::Customer));

        let principal = authenticate(&gateway, &headers("Bearer secret"))
            .await
            .unwrap();
        assert_eq!(principal.user_id, user);

        let err = authenticate(&gateway, &headers("Bearer nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated));
    }
}
