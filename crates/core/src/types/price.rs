//! Type-safe price representation using decimal arithmetic.
//!
//! The store sells in a single currency (USD), so a price is just a
//! non-negative decimal rounded to cents. Arithmetic that could go negative
//! saturates at zero instead of producing an invalid price.

use core::fmt;
use core::iter::Sum;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Error returned when constructing a [`Price`] from a negative amount.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("price cannot be negative")]
pub struct NegativePrice;

/// A non-negative amount of money, rounded to cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Zero dollars.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a price, rounding half-away-from-zero to cents.
    ///
    /// # Errors
    ///
    /// Returns [`NegativePrice`] if `amount` is below zero.
    pub fn new(amount: Decimal) -> Result<Self, NegativePrice> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(NegativePrice);
        }
        Ok(Self(round_cents(amount)))
    }

    /// Create a price from a whole number of cents.
    #[must_use]
    pub fn from_cents(cents: u32) -> Self {
        Self(Decimal::new(i64::from(cents), 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Whether this price is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Line total for `quantity` units.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(round_cents(self.0 * Decimal::from(quantity)))
    }

    /// Sum of two prices.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self(self.0 + other.0)
    }

    /// Difference of two prices, floored at zero.
    #[must_use]
    pub fn saturating_sub(self, other: Self) -> Self {
        if other.0 >= self.0 {
            Self::ZERO
        } else {
            Self(self.0 - other.0)
        }
    }

    /// `percent` percent of this price. Percent is clamped to `0..=100`.
    #[must_use]
    pub fn percent(self, percent: Decimal) -> Self {
        let pct = percent.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED);
        Self(round_cents(self.0 * pct / Decimal::ONE_HUNDRED))
    }

    /// The smaller of two prices.
    #[must_use]
    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 { self } else { other }
    }
}

fn round_cents(amount: Decimal) -> Decimal {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded
}

impl TryFrom<Decimal> for Price {
    type Error = NegativePrice;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::add)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn price(cents: u32) -> Price {
        Price::from_cents(cents)
    }

    #[test]
    fn test_rejects_negative() {
        assert_eq!(Price::new(Decimal::new(-1, 2)), Err(NegativePrice));
        assert!(Price::new(Decimal::ZERO).is_ok());
    }

    #[test]
    fn test_rounds_to_cents() {
        let p = Price::new(Decimal::new(12_345, 3)).unwrap();
        assert_eq!(p.to_string(), "$12.35");
        assert_eq!(Price::new(Decimal::from(3)).unwrap().to_string(), "$3.00");
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(price(499).times(3), price(1497));
        assert_eq!(price(1000).saturating_sub(price(250)), price(750));
        assert_eq!(price(250).saturating_sub(price(1000)), Price::ZERO);
        assert_eq!(price(2000).percent(Decimal::from(15)), price(300));
        assert_eq!(price(2000).percent(Decimal::from(150)), price(2000));
        assert_eq!(price(999).min(price(100)), price(100));
    }

    #[test]
    fn test_sum() {
        let total: Price = [price(100), price(250), price(1)].into_iter().sum();
        assert_eq!(total, price(351));
    }

    #[test]
    fn test_deserialize_from_number_and_string() {
        let from_number: Price = serde_json::from_str("4.5").unwrap();
        let from_string: Price = serde_json::from_str("\"4.50\"").unwrap();
        assert_eq!(from_number, from_string);
        assert!(serde_json::from_str::<Price>("-2").is_err());
    }
}
