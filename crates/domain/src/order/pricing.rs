//! Order price breakdown and the checkout pricing policy.

use serde::{Deserialize, Serialize};

use crate::money::Money;

/// Price breakdown of an order.
///
/// `total = max(0, subtotal + tax + shipping_cost - discount)`, with tax
/// computed on the subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pricing {
    pub subtotal: Money,
    pub tax: Money,
    /// Tax rate in basis points (800 = 8%).
    pub tax_rate_bps: u32,
    pub shipping_cost: Money,
    pub discount: Money,
    pub total: Money,
}

impl Pricing {
    /// Computes a full breakdown from its inputs.
    ///
    /// Pure: the same inputs always give the same breakdown.
    pub fn compute(subtotal: Money, tax_rate_bps: u32, shipping_cost: Money, discount: Money) -> Self {
        let tax = subtotal.percent_bps(tax_rate_bps);
        let total = (subtotal + tax + shipping_cost - discount).clamp_non_negative();
        Self {
            subtotal,
            tax,
            tax_rate_bps,
            shipping_cost,
            discount,
            total,
        }
    }
}

/// Tax and shipping rules applied at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Tax rate in basis points.
    pub tax_rate_bps: u32,
    /// Subtotals at or above this ship at `reduced_shipping`.
    pub free_shipping_threshold: Money,
    /// Shipping below the threshold.
    pub flat_shipping: Money,
    /// Shipping at or above the threshold (zero for free shipping).
    pub reduced_shipping: Money,
}

impl PricingPolicy {
    pub fn shipping_for(&self, subtotal: Money) -> Money {
        if subtotal >= self.free_shipping_threshold {
            self.reduced_shipping
        } else {
            self.flat_shipping
        }
    }

    /// Prices a subtotal with no discount.
    pub fn quote(&self, subtotal: Money) -> Pricing {
        Pricing::compute(
            subtotal,
            self.tax_rate_bps,
            self.shipping_for(subtotal),
            Money::zero(),
        )
    }
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 800,
            free_shipping_threshold: Money::from_cents(10_000),
            flat_shipping: Money::from_cents(1_000),
            reduced_shipping: Money::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_breakdown() {
        let p = Pricing::compute(
            Money::from_cents(5_000),
            800,
            Money::from_cents(1_000),
            Money::from_cents(500),
        );
        assert_eq!(p.tax.cents(), 400);
        assert_eq!(p.total.cents(), 5_000 + 400 + 1_000 - 500);
    }

    #[test]
    fn test_total_clamped_at_zero() {
        let p = Pricing::compute(
            Money::from_cents(1_000),
            0,
            Money::zero(),
            Money::from_cents(5_000),
        );
        assert_eq!(p.total, Money::zero());
    }

    #[test]
    fn test_compute_is_idempotent() {
        let a = Pricing::compute(Money::from_cents(1_234), 825, Money::from_cents(99), Money::zero());
        let b = Pricing::compute(a.subtotal, a.tax_rate_bps, a.shipping_cost, a.discount);
        assert_eq!(a, b);
    }

    #[test]
    fn test_shipping_threshold() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.shipping_for(Money::from_cents(9_999)).cents(), 1_000);
        assert_eq!(policy.shipping_for(Money::from_cents(10_000)), Money::zero());
    }

    #[test]
    fn test_reduced_shipping_above_threshold() {
        let policy = PricingPolicy {
            reduced_shipping: Money::from_cents(300),
            ..PricingPolicy::default()
        };
        let quote = policy.quote(Money::from_cents(20_000));
        assert_eq!(quote.shipping_cost.cents(), 300);
        assert_eq!(quote.total.cents(), 20_000 + 1_600 + 300);
    }
}
