//! Cart and order pricing.
//!
//! Everything is computed in integer cents so the amount shown at checkout,
//! the amount frozen on the order and the amount sent to the payment
//! provider are identical.

use serde::{Deserialize, Serialize};

use crate::cart::CartSnapshot;
use crate::order::Money;

/// Delivery speed chosen at checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingOption {
    #[default]
    Standard,
    Express,
}

/// Fees and rates applied by [`PricingPolicy::price`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Standard shipping is free from this subtotal upwards.
    pub free_shipping_threshold: Money,
    pub standard_shipping: Money,
    /// Flat fee, charged regardless of subtotal.
    pub express_shipping: Money,
    /// Tax rate in basis points (800 = 8%).
    pub tax_rate_bps: u32,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_cents(50_000),
            standard_shipping: Money::from_cents(5_999),
            express_shipping: Money::from_cents(14_999),
            tax_rate_bps: 800,
        }
    }
}

/// Derived totals; frozen into the order at placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
}

impl PricingPolicy {
    /// Prices a set of `(unit_price, quantity)` lines.
    pub fn price<I>(&self, lines: I, option: ShippingOption) -> PriceBreakdown
    where
        I: IntoIterator<Item = (Money, u32)>,
    {
        let mut subtotal = Money::zero();
        let mut any_line = false;
        for (unit_price, quantity) in lines {
            subtotal += unit_price.multiply(quantity);
            any_line = true;
        }

        let shipping_cost = if !any_line {
            Money::zero()
        } else {
            match option {
                ShippingOption::Express => self.express_shipping,
                ShippingOption::Standard if subtotal >= self.free_shipping_threshold => {
                    Money::zero()
                }
                ShippingOption::Standard => self.standard_shipping,
            }
        };

        let tax = self.tax_on(subtotal);

        PriceBreakdown {
            subtotal,
            shipping_cost,
            tax,
            total: subtotal + shipping_cost + tax,
        }
    }

    pub fn price_cart(&self, cart: &CartSnapshot, option: ShippingOption) -> PriceBreakdown {
        self.price(
            cart.items.iter().map(|item| (item.unit_price, item.quantity)),
            option,
        )
    }

    /// Tax rounded half-up to the cent.
    fn tax_on(&self, subtotal: Money) -> Money {
        let scaled = i128::from(subtotal.cents()) * i128::from(self.tax_rate_bps);
        let half = 5_000i128;
        let rounded = if scaled >= 0 {
            (scaled + half) / 10_000
        } else {
            (scaled - half) / 10_000
        };
        Money::from_cents(rounded as i64)
    }
}
