//! Application configuration loaded from environment variables.

use std::time::Duration;

use common::UserId;
use domain::{Money, PricingPolicy};

use crate::auth::Role;

/// A bearer token granted to a user at start-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiToken {
    pub token: String,
    pub user_id: UserId,
    pub role: Role,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` bind address (default: `"0.0.0.0"`)
/// - `PORT` listen port (default: `3000`)
/// - `RUST_LOG` tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` PostgreSQL connection string (unset: in-memory store)
/// - `DATABASE_MAX_CONNECTIONS` pool size (default: `10`)
/// - `TAX_RATE_BPS` tax rate in basis points (default: `800`)
/// - `FREE_SHIPPING_THRESHOLD_CENTS` (default: `10000`)
/// - `FLAT_SHIPPING_CENTS` (default: `1000`)
/// - `REDUCED_SHIPPING_CENTS` (default: `0`)
/// - `CURRENCY` (default: `"USD"`)
/// - `RATE_LIMIT_MAX` requests per window and operation (default: `10`)
/// - `RATE_LIMIT_WINDOW_SECS` (default: `60`)
/// - `API_TOKENS` comma-separated `token:user-uuid:role` entries
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub tax_rate_bps: u32,
    pub free_shipping_threshold_cents: i64,
    pub flat_shipping_cents: i64,
    pub reduced_shipping_cents: i64,
    pub currency: String,
    pub rate_limit_max: u64,
    pub rate_limit_window_secs: u64,
    pub api_tokens: Vec<ApiToken>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT").unwrap_or(defaults.port),
            log_level: std::env::var("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: std::env::var("DATABASE_URL")
                .ok()
                .filter(|url| !url.is_empty()),
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS")
                .unwrap_or(defaults.database_max_connections),
            tax_rate_bps: env_parse("TAX_RATE_BPS").unwrap_or(defaults.tax_rate_bps),
            free_shipping_threshold_cents: env_parse("FREE_SHIPPING_THRESHOLD_CENTS")
                .unwrap_or(defaults.free_shipping_threshold_cents),
            flat_shipping_cents: env_parse("FLAT_SHIPPING_CENTS")
                .unwrap_or(defaults.flat_shipping_cents),
            reduced_shipping_cents: env_parse("REDUCED_SHIPPING_CENTS")
                .unwrap_or(defaults.reduced_shipping_cents),
            currency: std::env::var("CURRENCY").unwrap_or(defaults.currency),
            rate_limit_max: env_parse("RATE_LIMIT_MAX").unwrap_or(defaults.rate_limit_max),
            rate_limit_window_secs: env_parse("RATE_LIMIT_WINDOW_SECS")
                .unwrap_or(defaults.rate_limit_window_secs),
            api_tokens: std::env::var("API_TOKENS")
                .map(|raw| parse_api_tokens(&raw))
                .unwrap_or_default(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Tax and shipping rules for new orders.
    pub fn pricing_policy(&self) -> PricingPolicy {
        PricingPolicy {
            tax_rate_bps: self.tax_rate_bps,
            free_shipping_threshold: Money::from_cents(self.free_shipping_threshold_cents),
            flat_shipping: Money::from_cents(self.flat_shipping_cents),
            reduced_shipping: Money::from_cents(self.reduced_shipping_cents),
        }
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            database_max_connections: 10,
            tax_rate_bps: 800,
            free_shipping_threshold_cents: 10_000,
            flat_shipping_cents: 1_000,
            reduced_shipping_cents: 0,
            currency: "USD".to_string(),
            rate_limit_max: 10,
            rate_limit_window_secs: 60,
            api_tokens: Vec::new(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Parses `token:user-uuid:role` entries separated by commas.
///
/// Malformed entries are skipped with a warning.
pub fn parse_api_tokens(raw: &str) -> Vec<ApiToken> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| {
            let parsed = parse_token_entry(entry);
            if parsed.is_none() {
                tracing::warn!(entry, "ignoring malformed API token entry");
            }
            parsed
        })
        .collect()
}

fn parse_token_entry(entry: &str) -> Option<ApiToken> {
    let mut parts = entry.splitn(3, ':');
    let token = parts.next()?.trim();
    let user_id = UserId::parse_str(parts.next()?.trim()).ok()?;
    let role = parts.next()?.trim().parse().ok()?;

    if token.is_empty() {
        return None;
    }

    Some(ApiToken {
        token: token.to_string(),
        user_id,
        role,
    })
}
