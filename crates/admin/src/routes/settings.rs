//! Store settings route handlers.
//!
//! Shipping lives in the backend's `store_settings` row so the storefront's
//! checkout preview and the `place_order` function read the same numbers.

use std::str::FromStr;

use askama::Template;
use axum::{
    Form,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::StoreSettings;
use verdant_core::Price;

use crate::{
    error::Result,
    filters,
    middleware::auth::RequireAdminAuth,
    models::Flash,
    state::AppState,
};

use super::{dashboard::AdminUserView, render};

/// Shipping form values, as typed.
#[derive(Debug, Clone, Deserialize)]
pub struct ShippingFormInput {
    pub shipping_flat_fee: String,
    pub free_shipping_threshold: String,
}

impl From<&StoreSettings> for ShippingFormInput {
    fn from(settings: &StoreSettings) -> Self {
        Self {
            shipping_flat_fee: settings.shipping_flat_fee.amount().to_string(),
            free_shipping_threshold: settings.free_shipping_threshold.amount().to_string(),
        }
    }
}

impl ShippingFormInput {
    /// Parse both amounts.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> std::result::Result<(Price, Price), String> {
        let parse = |raw: &str, label: &str| {
            let amount = Decimal::from_str(raw.trim().trim_start_matches('$'))
                .map_err(|_| format!("{label} must be a number"))?;
            Price::new(amount).map_err(|_| format!("{label} must be zero or more"))
        };
        Ok((
            parse(&self.shipping_flat_fee, "Flat fee")?,
            parse(&self.free_shipping_threshold, "Free shipping threshold")?,
        ))
    }
}

/// Settings page template.
#[derive(Template)]
#[template(path = "settings.html")]
pub struct SettingsTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flashes: Vec<Flash>,
    pub form: ShippingFormInput,
    pub updated_at: Option<String>,
    pub error: Option<String>,
}

fn updated_label(settings: &StoreSettings) -> Option<String> {
    settings
        .updated_at
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
}

/// Settings page handler.
#[instrument(skip(admin, state, session))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
) -> Result<Html<String>> {
    let settings = state.backend().store_settings().await?;

    let template = SettingsTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/settings".to_string(),
        flashes: Flash::take_all(&session).await,
        form: ShippingFormInput::from(&settings),
        updated_at: updated_label(&settings),
        error: None,
    };

    Ok(render(&template))
}

/// Update shipping settings handler.
#[instrument(skip(admin, state, session, input))]
pub async fn update(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Form(input): Form<ShippingFormInput>,
) -> Result<Response> {
    let (flat_fee, free_over) = match input.validate() {
        Ok(amounts) => amounts,
        Err(message) => {
            return Ok(render(&SettingsTemplate {
                admin_user: AdminUserView::from(&admin),
                current_path: "/settings".to_string(),
                flashes: Vec::new(),
                form: input,
                updated_at: None,
                error: Some(message),
            })
            .into_response());
        }
    };

    let settings = state.backend().update_shipping(flat_fee, free_over).await?;
    tracing::info!(
        flat_fee = %settings.shipping_flat_fee,
        free_over = %settings.free_shipping_threshold,
        "Shipping settings updated"
    );
    Flash::success("Shipping settings saved")
        .push(&session)
        .await;

    Ok(Redirect::to("/settings").into_response())
}
