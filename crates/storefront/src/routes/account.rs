//! Account route handlers.
//!
//! These routes require authentication.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::{BackendError, ProfileUpdate, ShippingAddress};

use crate::error::Result;
use crate::filters;
use crate::middleware::{RequireAuth, set_current_customer};
use crate::models::Flash;
use crate::routes::layout::PageLayout;
use crate::routes::views::OrderView;
use crate::state::AppState;

/// Orders shown on the account overview.
const RECENT_ORDERS: usize = 3;

/// Account overview page template.
#[derive(Template, WebTemplate)]
#[template(path = "account/index.html")]
pub struct AccountIndexTemplate {
    pub layout: PageLayout,
    pub email: String,
    pub full_name: String,
    pub phone: String,
    pub address: ShippingAddress,
    pub recent_orders: Vec<OrderView>,
}

/// Profile form data.
#[derive(Debug, Deserialize)]
pub struct ProfileForm {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default)]
    pub country: String,
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl ProfileForm {
    /// Profile changes; the address is kept only when it is complete.
    fn update(&self) -> std::result::Result<ProfileUpdate, String> {
        let full_name = non_blank(&self.full_name);
        let phone = non_blank(&self.phone);
        let address = ShippingAddress {
            full_name: full_name.clone().unwrap_or_default(),
            phone: phone.clone().unwrap_or_default(),
            line1: self.line1.trim().to_string(),
            line2: non_blank(&self.line2),
            city: self.city.trim().to_string(),
            region: non_blank(&self.region),
            postal_code: self.postal_code.trim().to_string(),
            country: self.country.trim().to_string(),
        };

        let any_address = [&self.line1, &self.city, &self.postal_code, &self.country]
            .iter()
            .any(|v| !v.trim().is_empty());
        let default_address = if any_address {
            address.validate().map_err(|e| format!("{e}."))?;
            Some(address)
        } else {
            None
        };

        Ok(ProfileUpdate {
            full_name,
            phone,
            default_address,
        })
    }
}

/// Display account overview page.
#[instrument(skip(state, layout, customer))]
pub async fn index(
    State(state): State<AppState>,
    layout: PageLayout,
    RequireAuth(customer): RequireAuth,
) -> Result<impl IntoResponse> {
    let backend = state.backend();
    let (profile, orders) = tokio::join!(
        backend.profile(customer.id, customer.token()),
        backend.orders_for_user(customer.id, customer.token()),
    );

    // A missing profile row just means nothing was saved yet.
    let profile = match profile {
        Ok(profile) => Some(profile),
        Err(BackendError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    let orders = orders.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load recent orders");
        Vec::new()
    });

    Ok(AccountIndexTemplate {
        layout,
        email: customer.email.clone(),
        full_name: profile
            .as_ref()
            .and_then(|p| p.full_name.clone())
            .or_else(|| customer.name.clone())
            .unwrap_or_default(),
        phone: profile
            .as_ref()
            .and_then(|p| p.phone.clone())
            .unwrap_or_default(),
        address: profile
            .and_then(|p| p.default_address)
            .unwrap_or_default(),
        recent_orders: orders
            .iter()
            .take(RECENT_ORDERS)
            .map(OrderView::from)
            .collect(),
    })
}

/// Save profile changes.
#[instrument(skip(state, session, customer, form))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Form(form): Form<ProfileForm>,
) -> Result<Redirect> {
    let update = match form.update() {
        Ok(update) => update,
        Err(message) => {
            Flash::error(message).push(&session).await?;
            return Ok(Redirect::to("/account"));
        }
    };

    let profile = state
        .backend()
        .upsert_profile(customer.id, &update, customer.token())
        .await?;

    // Keep the greeting in the header in step with the new name.
    if profile.full_name != customer.name {
        let refreshed = crate::models::CurrentCustomer {
            name: profile.full_name,
            ..customer
        };
        set_current_customer(&session, &refreshed).await?;
    }

    tracing::info!("Profile updated");
    Flash::success("Your details were saved.").push(&session).await?;
    Ok(Redirect::to("/account"))
}
