//! Coupon management route handlers.

#![allow(clippy::used_underscore_binding)]

use std::str::FromStr;

use askama::Template;
use axum::{
    Form,
    extract::{Path, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::{BackendError, Coupon, NewCoupon};
use verdant_core::pricing::normalize_code;
use verdant_core::{CouponId, DiscountKind, Price};

use crate::{
    error::Result,
    filters,
    middleware::auth::RequireAdminAuth,
    models::{CurrentAdmin, Flash},
    state::AppState,
};

use super::{dashboard::AdminUserView, non_blank, render};

/// Longest accepted coupon code.
const MAX_CODE_LENGTH: usize = 32;

/// Coupon row for the listing.
#[derive(Debug, Clone)]
pub struct CouponView {
    pub id: i64,
    pub code: String,
    pub summary: String,
    pub min_order: Option<String>,
    pub usage: String,
    pub expires: String,
    pub expired: bool,
    pub active: bool,
}

impl CouponView {
    fn new(coupon: &Coupon, now: DateTime<Utc>) -> Self {
        let usage = coupon.max_uses.map_or_else(
            || format!("{} uses", coupon.used_count),
            |max| format!("{}/{} uses", coupon.used_count, max),
        );
        Self {
            id: coupon.id.as_i64(),
            code: coupon.code.clone(),
            summary: coupon.summary(),
            min_order: coupon.min_order.map(|p| p.to_string()),
            usage,
            expires: coupon
                .expires_at
                .map_or_else(|| "Never".to_string(), |t| t.format("%Y-%m-%d").to_string()),
            expired: coupon.expires_at.is_some_and(|t| t <= now),
            active: coupon.active,
        }
    }
}

/// Coupon form values, as typed.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponFormInput {
    pub code: String,
    pub kind: String,
    pub value: String,
    #[serde(default)]
    pub min_order: String,
    #[serde(default)]
    pub max_uses: String,
    /// Last valid day, `YYYY-MM-DD`.
    #[serde(default)]
    pub expires_on: String,
}

impl Default for CouponFormInput {
    fn default() -> Self {
        Self {
            code: String::new(),
            kind: "percentage".to_string(),
            value: String::new(),
            min_order: String::new(),
            max_uses: String::new(),
            expires_on: String::new(),
        }
    }
}

impl CouponFormInput {
    /// Validate into an insert body. New coupons start active.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self, today: NaiveDate) -> std::result::Result<NewCoupon, String> {
        let code = normalize_code(&self.code);
        if code.is_empty() {
            return Err("Code is required".to_string());
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err("Code may only contain letters and digits".to_string());
        }
        if code.len() > MAX_CODE_LENGTH {
            return Err(format!("Code must be at most {MAX_CODE_LENGTH} characters"));
        }

        let kind = DiscountKind::from_str(self.kind.trim())
            .map_err(|_| "Choose percentage or fixed amount".to_string())?;

        let value = Decimal::from_str(self.value.trim().trim_start_matches('$'))
            .map_err(|_| "Value must be a number".to_string())?;
        if value <= Decimal::ZERO {
            return Err("Value must be greater than zero".to_string());
        }
        if kind == DiscountKind::Percentage && value > Decimal::ONE_HUNDRED {
            return Err("Percentage cannot exceed 100".to_string());
        }

        let min_order = match non_blank(Some(&self.min_order)) {
            Some(raw) => {
                let amount = Decimal::from_str(raw.trim_start_matches('$'))
                    .map_err(|_| "Minimum order must be a number".to_string())?;
                Some(Price::new(amount).map_err(|_| "Minimum order must be zero or more".to_string())?)
            }
            None => None,
        };

        let max_uses = match non_blank(Some(&self.max_uses)) {
            Some(raw) => match raw.parse::<u32>() {
                Ok(n) if n > 0 => Some(n),
                _ => return Err("Usage limit must be a positive whole number".to_string()),
            },
            None => None,
        };

        let expires_at = match non_blank(Some(&self.expires_on)) {
            Some(raw) => {
                let day = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|_| "Expiry must be a date".to_string())?;
                if day < today {
                    return Err("Expiry cannot be in the past".to_string());
                }
                day.and_hms_opt(23, 59, 59).map(|t| t.and_utc())
            }
            None => None,
        };

        Ok(NewCoupon {
            code,
            kind,
            value,
            min_order,
            max_uses,
            expires_at,
            active: true,
        })
    }
}

/// Coupons page template (listing plus the create form).
#[derive(Template)]
#[template(path = "coupons/index.html")]
pub struct CouponsIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flashes: Vec<Flash>,
    pub coupons: Vec<CouponView>,
    pub form: CouponFormInput,
    pub error: Option<String>,
}

async fn coupons_page(
    state: &AppState,
    admin: &CurrentAdmin,
    flashes: Vec<Flash>,
    form: CouponFormInput,
    error: Option<String>,
) -> Html<String> {
    let now = Utc::now();
    let coupons = match state.backend().list_coupons().await {
        Ok(coupons) => coupons.iter().map(|c| CouponView::new(c, now)).collect(),
        Err(e) => {
            tracing::error!("Failed to fetch coupons: {e}");
            vec![]
        }
    };

    render(&CouponsIndexTemplate {
        admin_user: AdminUserView::from(admin),
        current_path: "/coupons".to_string(),
        flashes,
        coupons,
        form,
        error,
    })
}

/// Coupons list page handler.
#[instrument(skip(admin, state, session))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
) -> Html<String> {
    let flashes = Flash::take_all(&session).await;
    coupons_page(&state, &admin, flashes, CouponFormInput::default(), None).await
}

/// Create coupon handler.
#[instrument(skip(admin, state, session, input), fields(code = %input.code))]
pub async fn create(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Form(input): Form<CouponFormInput>,
) -> Result<Response> {
    let coupon = match input.validate(Utc::now().date_naive()) {
        Ok(coupon) => coupon,
        Err(message) => {
            return Ok(coupons_page(&state, &admin, Vec::new(), input, Some(message))
                .await
                .into_response());
        }
    };

    match state.backend().create_coupon(&coupon).await {
        Ok(created) => {
            tracing::info!(coupon_id = %created.id, code = %created.code, "Coupon created");
            Flash::success(format!("Created {} ({})", created.code, created.summary()))
                .push(&session)
                .await;
            Ok(Redirect::to("/coupons").into_response())
        }
        Err(BackendError::Conflict(_)) => Ok(coupons_page(
            &state,
            &admin,
            Vec::new(),
            input,
            Some(format!("A coupon named {} already exists", coupon.code)),
        )
        .await
        .into_response()),
        Err(e) => Err(e.into()),
    }
}

/// Activate or deactivate a coupon.
#[instrument(skip(_admin, state, session))]
pub async fn toggle(
    RequireAdminAuth(_admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Redirect> {
    let coupon_id = CouponId::new(id);
    let current = state
        .backend()
        .list_coupons()
        .await?
        .into_iter()
        .find(|c| c.id == coupon_id)
        .ok_or_else(|| BackendError::NotFound("coupons".to_string()))?;

    let updated = state
        .backend()
        .set_coupon_active(coupon_id, !current.active)
        .await?;
    tracing::info!(coupon_id = %coupon_id, active = updated.active, "Coupon toggled");

    let verb = if updated.active { "Activated" } else { "Deactivated" };
    Flash::success(format!("{verb} {}", updated.code))
        .push(&session)
        .await;
    Ok(Redirect::to("/coupons"))
}

/// Delete a coupon. Orders keep the code they were placed with.
#[instrument(skip(_admin, state, session))]
pub async fn delete(
    RequireAdminAuth(_admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Redirect> {
    let coupon_id = CouponId::new(id);
    state.backend().delete_coupon(coupon_id).await?;
    tracing::info!(coupon_id = %coupon_id, "Coupon deleted");
    Flash::success("Coupon deleted").push(&session).await;
    Ok(Redirect::to("/coupons"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn form(code: &str, kind: &str, value: &str) -> CouponFormInput {
        CouponFormInput {
            code: code.to_string(),
            kind: kind.to_string(),
            value: value.to_string(),
            ..CouponFormInput::default()
        }
    }

    #[test]
    fn test_code_is_uppercased() {
        let coupon = form(" spring10 ", "percentage", "10").validate(today()).unwrap();
        assert_eq!(coupon.code, "SPRING10");
        assert_eq!(coupon.kind, DiscountKind::Percentage);
        assert!(coupon.active);
        assert_eq!(coupon.expires_at, None);
    }

    #[test]
    fn test_code_must_be_alphanumeric() {
        assert_eq!(
            form("SPRING-10", "percentage", "10")
                .validate(today())
                .unwrap_err(),
            "Code may only contain letters and digits"
        );
        assert_eq!(
            form("  ", "fixed", "5").validate(today()).unwrap_err(),
            "Code is required"
        );
    }

    #[test]
    fn test_value_rules() {
        assert_eq!(
            form("ZERO", "fixed", "0").validate(today()).unwrap_err(),
            "Value must be greater than zero"
        );
        assert_eq!(
            form("HUGE", "percentage", "100.5")
                .validate(today())
                .unwrap_err(),
            "Percentage cannot exceed 100"
        );
        assert!(form("ALL", "percentage", "100").validate(today()).is_ok());
        assert!(form("BIG", "fixed", "150").validate(today()).is_ok());
        assert!(form("ODD", "bogo", "1").validate(today()).is_err());
    }

    #[test]
    fn test_optional_limits() {
        let mut input = form("LIMITED", "fixed", "$5");
        input.min_order = "25".to_string();
        input.max_uses = "100".to_string();
        input.expires_on = "2026-03-31".to_string();
        let coupon = input.validate(today()).unwrap();
        assert_eq!(coupon.value, Decimal::new(5, 0));
        assert_eq!(coupon.min_order, Some(Price::from_cents(2500)));
        assert_eq!(coupon.max_uses, Some(100));
        assert_eq!(
            coupon.expires_at.unwrap().to_rfc3339(),
            "2026-03-31T23:59:59+00:00"
        );

        input.max_uses = "0".to_string();
        assert!(input.validate(today()).is_err());

        input.max_uses = String::new();
        input.expires_on = "2026-02-01".to_string();
        assert_eq!(
            input.validate(today()).unwrap_err(),
            "Expiry cannot be in the past"
        );
    }
}
