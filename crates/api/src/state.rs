//! Shared application state.

use std::sync::Arc;

use checkout::{
    CartService, CheckoutOrchestrator, CheckoutSettings, InMemoryPaymentGateway, OrderWorkflow,
};
use store::CommerceStore;

use crate::auth::{AuthGateway, InMemoryAuthGateway};
use crate::config::Config;
use crate::rate_limit::RateLimiter;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore> {
    pub store: S,
    pub carts: CartService<S>,
    pub checkout: CheckoutOrchestrator<S, InMemoryPaymentGateway>,
    pub orders: OrderWorkflow<S, InMemoryPaymentGateway>,
    pub auth: Arc<dyn AuthGateway>,
    pub rate_limiter: RateLimiter,
}

impl<S: CommerceStore + Clone + 'static> AppState<S> {
    /// Wires the services around a store, with the mock payment gateway and
    /// the tokens listed in the configuration.
    pub fn new(store: S, config: &Config) -> Self {
        Self::with_auth(
            store,
            config,
            Arc::new(InMemoryAuthGateway::from_tokens(&config.api_tokens)),
        )
    }

    pub fn with_auth(store: S, config: &Config, auth: Arc<dyn AuthGateway>) -> Self {
        let payments = InMemoryPaymentGateway::new();
        let settings = CheckoutSettings {
            pricing: config.pricing_policy(),
            currency: config.currency.clone(),
        };

        Self {
            carts: CartService::new(store.clone()),
            checkout: CheckoutOrchestrator::new(store.clone(), payments.clone(), settings),
            orders: OrderWorkflow::new(store.clone(), payments),
            auth,
            rate_limiter: RateLimiter::in_memory(config.rate_limit_max, config.rate_limit_window()),
            store,
        }
    }
}
