//! Cart route handlers.
//!
//! Cart operations use HTMX for dynamic updates without full page reloads.
//! Plain form posts (no JavaScript) fall back to a redirect with a flash.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_core::ProductId;

use crate::error::Result;
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::Flash;
use crate::routes::layout::PageLayout;
use crate::routes::views::CartView;
use crate::services::{CartService, CartServiceError};
use crate::state::AppState;

/// Add to cart form data.
#[derive(Debug, Deserialize)]
pub struct AddToCartForm {
    pub product_id: i64,
    pub quantity: Option<u32>,
}

/// Update cart form data.
#[derive(Debug, Deserialize)]
pub struct UpdateCartForm {
    pub product_id: i64,
    pub quantity: u32,
}

/// Remove from cart form data.
#[derive(Debug, Deserialize)]
pub struct RemoveFromCartForm {
    pub product_id: i64,
}

/// Cart page template.
#[derive(Template, WebTemplate)]
#[template(path = "cart/show.html")]
pub struct CartShowTemplate {
    pub layout: PageLayout,
    pub cart: CartView,
    pub free_shipping_remaining: Option<String>,
    /// Shared with the items fragment; full page loads have no error.
    pub error: Option<String>,
}

/// Cart items fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_items.html")]
pub struct CartItemsTemplate {
    pub cart: CartView,
    pub error: Option<String>,
}

/// Cart count badge fragment template (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/cart_count.html")]
pub struct CartCountTemplate {
    pub count: u32,
    pub error: Option<String>,
}

/// Whether the request came from HTMX.
pub(crate) fn is_htmx(headers: &HeaderMap) -> bool {
    headers.contains_key("HX-Request")
}

/// Display cart page.
#[instrument(skip(state, session, layout, customer))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    layout: PageLayout,
    OptionalAuth(customer): OptionalAuth,
) -> Result<impl IntoResponse> {
    let service = CartService::new(state.backend(), &session, customer.as_ref());
    let (snapshot, settings) = tokio::join!(service.snapshot(), state.catalog().settings());
    let snapshot = snapshot?;
    let policy = settings.unwrap_or_default().policy();

    let remaining = policy.remaining_for_free(snapshot.subtotal);
    let free_shipping_remaining =
        (!snapshot.is_empty() && !remaining.is_zero()).then(|| remaining.to_string());

    Ok(CartShowTemplate {
        layout: PageLayout {
            cart_count: snapshot.item_count,
            ..layout
        },
        cart: CartView::from(&snapshot),
        free_shipping_remaining,
        error: None,
    })
}

/// Add item to cart (HTMX).
///
/// Returns the count badge with an HTMX trigger so other elements refresh.
/// Stock problems come back as a 400 with the message in the badge slot.
#[instrument(skip(state, session, customer, headers))]
pub async fn add(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
    headers: HeaderMap,
    Form(form): Form<AddToCartForm>,
) -> Result<Response> {
    let service = CartService::new(state.backend(), &session, customer.as_ref());
    let product_id = ProductId::new(form.product_id);

    match service.add(product_id, form.quantity.unwrap_or(1)).await {
        Ok(count) => {
            if !is_htmx(&headers) {
                Flash::success("Added to your cart.").push(&session).await?;
                return Ok(Redirect::to("/cart").into_response());
            }
            Ok((
                AppendHeaders([("HX-Trigger", "cart-updated")]),
                CartCountTemplate { count, error: None },
            )
                .into_response())
        }
        Err(CartServiceError::Quantity(err)) => {
            tracing::info!(%product_id, error = %err, "Add to cart refused");
            if !is_htmx(&headers) {
                Flash::error(capitalize(&err.to_string()))
                    .push(&session)
                    .await?;
                return Ok(Redirect::to("/cart").into_response());
            }
            let count = service.count().await?;
            Ok((
                StatusCode::BAD_REQUEST,
                CartCountTemplate {
                    count,
                    error: Some(capitalize(&err.to_string())),
                },
            )
                .into_response())
        }
        Err(e) => Err(e.into()),
    }
}

/// Update cart item quantity (HTMX). A quantity of zero removes the line.
#[instrument(skip(state, session, customer, headers))]
pub async fn update(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
    headers: HeaderMap,
    Form(form): Form<UpdateCartForm>,
) -> Result<Response> {
    let service = CartService::new(state.backend(), &session, customer.as_ref());

    let error = match service
        .set_quantity(ProductId::new(form.product_id), form.quantity)
        .await
    {
        Ok(()) => None,
        Err(CartServiceError::Quantity(err)) => Some(capitalize(&err.to_string())),
        Err(e) => return Err(e.into()),
    };

    if !is_htmx(&headers) {
        if let Some(message) = error {
            Flash::error(message).push(&session).await?;
        }
        return Ok(Redirect::to("/cart").into_response());
    }

    let cart = CartView::from(&service.snapshot().await?);
    Ok((
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        CartItemsTemplate { cart, error },
    )
        .into_response())
}

/// Remove item from cart (HTMX).
#[instrument(skip(state, session, customer, headers))]
pub async fn remove(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
    headers: HeaderMap,
    Form(form): Form<RemoveFromCartForm>,
) -> Result<Response> {
    let service = CartService::new(state.backend(), &session, customer.as_ref());
    service.remove(ProductId::new(form.product_id)).await?;

    if !is_htmx(&headers) {
        return Ok(Redirect::to("/cart").into_response());
    }

    let cart = CartView::from(&service.snapshot().await?);
    Ok((
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        CartItemsTemplate { cart, error: None },
    )
        .into_response())
}

/// Get cart count badge (HTMX).
#[instrument(skip(state, session, customer))]
pub async fn count(
    State(state): State<AppState>,
    session: Session,
    OptionalAuth(customer): OptionalAuth,
) -> impl IntoResponse {
    let count = CartService::new(state.backend(), &session, customer.as_ref())
        .count()
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to count cart");
            0
        });

    CartCountTemplate { count, error: None }
}

/// Uppercase the first letter of an error message for display.
fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
