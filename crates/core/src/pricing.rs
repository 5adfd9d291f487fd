//! Coupon evaluation, shipping, and order totals.
//!
//! Mirrors the arithmetic of the backend's `place_order` function so the
//! checkout page can show the same totals the order will be charged at.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{DiscountKind, Price};

/// The parts of a coupon that decide whether and how much it discounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CouponRules {
    pub code: String,
    pub kind: DiscountKind,
    /// Percentage (0-100) or a fixed amount, depending on `kind`.
    pub value: Decimal,
    pub min_order: Option<Price>,
    pub max_uses: Option<u32>,
    pub used_count: u32,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

/// Why a coupon could not be applied.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CouponRejection {
    #[error("this coupon is no longer active")]
    Inactive,
    #[error("this coupon has expired")]
    Expired,
    #[error("this coupon has reached its usage limit")]
    Exhausted,
    #[error("spend at least {minimum} to use this coupon")]
    BelowMinimum {
        /// Minimum subtotal required.
        minimum: Price,
    },
    #[error("coupon not found")]
    NotFound,
}

impl CouponRejection {
    /// Short machine-readable reason, matching the backend's error codes.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Expired => "expired",
            Self::Exhausted => "exhausted",
            Self::BelowMinimum { .. } => "below_minimum",
            Self::NotFound => "not_found",
        }
    }
}

/// Normalize user-entered coupon codes.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Work out the discount a coupon gives on `subtotal` at time `now`.
///
/// Checks run in a fixed order (inactive, expired, exhausted, minimum) so
/// the customer always sees the most fundamental problem first.
///
/// # Errors
///
/// Returns a [`CouponRejection`] when the coupon cannot be applied.
pub fn evaluate_coupon(
    rules: &CouponRules,
    subtotal: Price,
    now: DateTime<Utc>,
) -> Result<Price, CouponRejection> {
    if !rules.active {
        return Err(CouponRejection::Inactive);
    }
    if rules.expires_at.is_some_and(|expires| expires <= now) {
        return Err(CouponRejection::Expired);
    }
    if rules.max_uses.is_some_and(|max| rules.used_count >= max) {
        return Err(CouponRejection::Exhausted);
    }
    if let Some(minimum) = rules.min_order
        && subtotal < minimum
    {
        return Err(CouponRejection::BelowMinimum { minimum });
    }

    let discount = match rules.kind {
        DiscountKind::Percentage => subtotal.percent(rules.value),
        DiscountKind::Fixed => Price::new(rules.value.max(Decimal::ZERO))
            .unwrap_or(Price::ZERO)
            .min(subtotal),
    };
    Ok(discount)
}

/// Flat-rate shipping with a free-shipping threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub flat_fee: Price,
    pub free_over: Price,
}

impl ShippingPolicy {
    /// Shipping charged on an order whose discounted subtotal is `amount`.
    #[must_use]
    pub fn fee_for(&self, amount: Price) -> Price {
        if amount >= self.free_over {
            Price::ZERO
        } else {
            self.flat_fee
        }
    }

    /// How much more the customer needs to spend for free shipping.
    #[must_use]
    pub fn remaining_for_free(&self, amount: Price) -> Price {
        self.free_over.saturating_sub(amount)
    }
}

/// Totals shown at checkout and stored on the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Price,
    pub discount: Price,
    pub shipping: Price,
    pub total: Price,
}

impl OrderTotals {
    /// Compute totals: `total = subtotal - discount + shipping`.
    ///
    /// A zero subtotal is an empty cart and ships free. A cart discounted
    /// down to zero still pays shipping, as `place_order` charges it.
    #[must_use]
    pub fn compute(subtotal: Price, discount: Price, policy: &ShippingPolicy) -> Self {
        let discount = discount.min(subtotal);
        let discounted = subtotal.saturating_sub(discount);
        let shipping = if subtotal.is_zero() {
            Price::ZERO
        } else {
            policy.fee_for(discounted)
        };
        Self {
            subtotal,
            discount,
            shipping,
            total: discounted.add(shipping),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn rules(kind: DiscountKind, value: i64) -> CouponRules {
        CouponRules {
            code: "HARVEST".to_string(),
            kind,
            value: Decimal::from(value),
            min_order: None,
            max_uses: None,
            used_count: 0,
            expires_at: None,
            active: true,
        }
    }

    fn policy() -> ShippingPolicy {
        ShippingPolicy {
            flat_fee: Price::from_cents(499),
            free_over: Price::from_cents(5000),
        }
    }

    #[test]
    fn test_percentage_coupon() {
        let discount =
            evaluate_coupon(&rules(DiscountKind::Percentage, 10), Price::from_cents(4250), Utc::now())
                .unwrap();
        assert_eq!(discount, Price::from_cents(425));
    }

    #[test]
    fn test_fixed_coupon_never_exceeds_subtotal() {
        let discount =
            evaluate_coupon(&rules(DiscountKind::Fixed, 20), Price::from_cents(1500), Utc::now())
                .unwrap();
        assert_eq!(discount, Price::from_cents(1500));
    }

    #[test]
    fn test_rejection_order() {
        let now = Utc::now();
        let mut r = rules(DiscountKind::Fixed, 5);
        r.active = false;
        r.expires_at = Some(now - Duration::days(1));
        assert_eq!(
            evaluate_coupon(&r, Price::from_cents(100), now),
            Err(CouponRejection::Inactive)
        );

        r.active = true;
        assert_eq!(
            evaluate_coupon(&r, Price::from_cents(100), now),
            Err(CouponRejection::Expired)
        );

        r.expires_at = Some(now + Duration::days(1));
        r.max_uses = Some(3);
        r.used_count = 3;
        assert_eq!(
            evaluate_coupon(&r, Price::from_cents(100), now),
            Err(CouponRejection::Exhausted)
        );

        r.used_count = 2;
        r.min_order = Some(Price::from_cents(2000));
        assert_eq!(
            evaluate_coupon(&r, Price::from_cents(100), now),
            Err(CouponRejection::BelowMinimum {
                minimum: Price::from_cents(2000)
            })
        );
    }

    #[test]
    fn test_totals_with_shipping() {
        let totals = OrderTotals::compute(Price::from_cents(3000), Price::ZERO, &policy());
        assert_eq!(totals.shipping, Price::from_cents(499));
        assert_eq!(totals.total, Price::from_cents(3499));
    }

    #[test]
    fn test_totals_free_shipping_uses_discounted_amount() {
        // 55.00 qualifies on its own, but not after a 10.00 discount.
        let totals =
            OrderTotals::compute(Price::from_cents(5500), Price::from_cents(1000), &policy());
        assert_eq!(totals.shipping, Price::from_cents(499));
        assert_eq!(totals.total, Price::from_cents(4999));

        let free = OrderTotals::compute(Price::from_cents(6000), Price::from_cents(1000), &policy());
        assert_eq!(free.shipping, Price::ZERO);
        assert_eq!(free.total, Price::from_cents(5000));
    }

    #[test]
    fn test_empty_cart_ships_free() {
        let totals = OrderTotals::compute(Price::ZERO, Price::ZERO, &policy());
        assert_eq!(totals.shipping, Price::ZERO);
        assert_eq!(totals.total, Price::ZERO);
    }

    #[test]
    fn test_fully_discounted_cart_still_pays_shipping() {
        let totals =
            OrderTotals::compute(Price::from_cents(1500), Price::from_cents(1500), &policy());
        assert_eq!(totals.discount, Price::from_cents(1500));
        assert_eq!(totals.shipping, Price::from_cents(499));
        assert_eq!(totals.total, Price::from_cents(499));
    }

    #[test]
    fn test_remaining_for_free() {
        assert_eq!(
            policy().remaining_for_free(Price::from_cents(4200)),
            Price::from_cents(800)
        );
        assert_eq!(policy().remaining_for_free(Price::from_cents(9000)), Price::ZERO);
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code("  harvest10 "), "HARVEST10");
    }
}
