//! Wishlist route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::{Path, State},
    http::HeaderMap,
    response::{AppendHeaders, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_core::ProductId;

use crate::error::Result;
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::Flash;
use crate::routes::cart::is_htmx;
use crate::routes::layout::PageLayout;
use crate::routes::views::ProductView;
use crate::services::{CartService, CartServiceError};
use crate::state::AppState;

/// Wishlist page template.
#[derive(Template, WebTemplate)]
#[template(path = "wishlist/index.html")]
pub struct WishlistTemplate {
    pub layout: PageLayout,
    pub products: Vec<ProductView>,
}

/// Heart button fragment (for HTMX).
#[derive(Template, WebTemplate)]
#[template(path = "partials/wishlist_button.html")]
pub struct WishlistButtonTemplate {
    pub product_id: i64,
    pub wishlisted: bool,
}

/// Wishlist form data.
#[derive(Debug, Deserialize)]
pub struct WishlistForm {
    pub product_id: i64,
}

/// Show the customer's wishlist.
#[instrument(skip(state, layout, customer))]
pub async fn index(
    State(state): State<AppState>,
    layout: PageLayout,
    RequireAuth(customer): RequireAuth,
) -> Result<impl IntoResponse> {
    let rows = state
        .backend()
        .wishlist(customer.id, customer.token())
        .await?;

    // Rows whose product was deleted come back without one.
    let products = rows
        .iter()
        .filter_map(|row| row.product.as_ref())
        .map(|p| ProductView {
            wishlisted: true,
            ..ProductView::from(p)
        })
        .collect();

    Ok(WishlistTemplate { layout, products })
}

/// Add or remove a product (HTMX). Returns the updated heart button.
#[instrument(skip(state, session, customer, headers))]
pub async fn toggle(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    headers: HeaderMap,
    Form(form): Form<WishlistForm>,
) -> Result<Response> {
    let product_id = ProductId::new(form.product_id);
    let backend = state.backend();
    let current = backend
        .wishlist_product_ids(customer.id, customer.token())
        .await?;

    let wishlisted = if current.contains(&product_id) {
        backend
            .remove_from_wishlist(customer.id, product_id, customer.token())
            .await?;
        false
    } else {
        backend
            .add_to_wishlist(customer.id, product_id, customer.token())
            .await?;
        true
    };
    tracing::debug!(%product_id, wishlisted, "Wishlist toggled");

    if !is_htmx(&headers) {
        let message = if wishlisted {
            "Saved to your wishlist."
        } else {
            "Removed from your wishlist."
        };
        Flash::success(message).push(&session).await?;
        return Ok(Redirect::to("/wishlist").into_response());
    }

    Ok(WishlistButtonTemplate {
        product_id: form.product_id,
        wishlisted,
    }
    .into_response())
}

/// Move a wishlisted product into the cart.
#[instrument(skip(state, session, customer))]
pub async fn move_to_cart(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<i64>,
) -> Result<Response> {
    let product_id = ProductId::new(id);
    let cart = CartService::new(state.backend(), &session, Some(&customer));

    match cart.add(product_id, 1).await {
        Ok(_) => {
            state
                .backend()
                .remove_from_wishlist(customer.id, product_id, customer.token())
                .await?;
            Flash::success("Moved to your cart.").push(&session).await?;
        }
        Err(CartServiceError::Quantity(err)) => {
            Flash::error(format!("Could not add to cart: {err}."))
                .push(&session)
                .await?;
        }
        Err(e) => return Err(e.into()),
    }

    Ok((
        AppendHeaders([("HX-Trigger", "cart-updated")]),
        Redirect::to("/wishlist"),
    )
        .into_response())
}
