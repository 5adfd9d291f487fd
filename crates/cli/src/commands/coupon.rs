//! Coupon commands.
//!
//! Uses the same validation as the admin panel's coupon form, so a code
//! created here follows the same rules as one created in the browser.
//!
//! # Usage
//!
//! ```bash
//! # 10% off, no limits
//! verdant coupon create --code SPRING10 --kind percentage --value 10
//!
//! # $5 off orders over $25, 100 uses, valid for 30 days
//! verdant coupon create --code FIVE --kind fixed --value 5 \
//!     --min-order 25 --max-uses 100 --expires-days 30
//! ```

use chrono::{Days, Utc};
use thiserror::Error;
use verdant_admin::routes::coupons::CouponFormInput;
use verdant_backend::BackendError;

use super::{BackendSetupError, service_client};

/// Errors that can occur during coupon operations.
#[derive(Debug, Error)]
pub enum CouponError {
    #[error(transparent)]
    Setup(#[from] BackendSetupError),

    #[error("Invalid coupon: {0}")]
    Invalid(String),

    #[error("A coupon named {0} already exists")]
    Exists(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

/// Options for a new coupon, as given on the command line.
#[derive(Debug, Clone)]
pub struct CreateArgs {
    pub code: String,
    pub kind: String,
    pub value: String,
    pub min_order: Option<String>,
    pub max_uses: Option<u32>,
    pub expires_days: Option<u64>,
}

impl CreateArgs {
    fn into_form(self) -> Result<CouponFormInput, CouponError> {
        let expires_on = match self.expires_days {
            Some(days) => Utc::now()
                .date_naive()
                .checked_add_days(Days::new(days))
                .ok_or_else(|| CouponError::Invalid("expiry is too far away".to_string()))?
                .format("%Y-%m-%d")
                .to_string(),
            None => String::new(),
        };
        Ok(CouponFormInput {
            code: self.code,
            kind: self.kind,
            value: self.value,
            min_order: self.min_order.unwrap_or_default(),
            max_uses: self.max_uses.map(|n| n.to_string()).unwrap_or_default(),
            expires_on,
        })
    }
}

/// Create an active coupon.
///
/// # Errors
///
/// Returns an error if the options are invalid, the code is taken, or the
/// backend request fails.
pub async fn create(args: CreateArgs) -> Result<(), CouponError> {
    let coupon = args
        .into_form()?
        .validate(Utc::now().date_naive())
        .map_err(CouponError::Invalid)?;

    let client = service_client()?;
    let created = match client.create_coupon(&coupon).await {
        Ok(created) => created,
        Err(BackendError::Conflict(_)) => return Err(CouponError::Exists(coupon.code)),
        Err(e) => return Err(e.into()),
    };

    tracing::info!("Coupon created! ID: {}, Code: {}", created.id, created.code);
    tracing::info!("  Discount: {}", created.summary());
    if let Some(min) = created.min_order {
        tracing::info!("  Minimum order: {}", min);
    }
    if let Some(max) = created.max_uses {
        tracing::info!("  Usage limit: {}", max);
    }
    if let Some(expires) = created.expires_at {
        tracing::info!("  Expires: {}", expires.format("%Y-%m-%d %H:%M UTC"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use verdant_core::DiscountKind;

    fn args() -> CreateArgs {
        CreateArgs {
            code: "spring10".to_string(),
            kind: "percentage".to_string(),
            value: "10".to_string(),
            min_order: None,
            max_uses: None,
            expires_days: None,
        }
    }

    #[test]
    fn test_minimal_args_validate() {
        let form = args().into_form().unwrap();
        assert!(form.expires_on.is_empty());
        assert!(form.max_uses.is_empty());

        let coupon = form.validate(Utc::now().date_naive()).unwrap();
        assert_eq!(coupon.code, "SPRING10");
        assert_eq!(coupon.kind, DiscountKind::Percentage);
        assert!(coupon.active);
    }

    #[test]
    fn test_expires_days_becomes_a_date() {
        let form = CreateArgs {
            expires_days: Some(30),
            max_uses: Some(100),
            ..args()
        }
        .into_form()
        .unwrap();
        let expected = Utc::now()
            .date_naive()
            .checked_add_days(Days::new(30))
            .unwrap();
        assert_eq!(form.expires_on, expected.format("%Y-%m-%d").to_string());
        assert_eq!(form.max_uses, "100");

        let coupon = form.validate(Utc::now().date_naive()).unwrap();
        assert_eq!(coupon.max_uses, Some(100));
        assert!(coupon.expires_at.is_some());
    }

    #[test]
    fn test_zero_max_uses_rejected() {
        let form = CreateArgs {
            max_uses: Some(0),
            ..args()
        }
        .into_form()
        .unwrap();
        assert!(form.validate(Utc::now().date_naive()).is_err());
    }
}
