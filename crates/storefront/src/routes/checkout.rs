//! Checkout route handlers.
//!
//! Checkout requires a signed-in customer. Payment is recorded as the
//! customer's chosen method; nothing is charged online.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::ShippingAddress;
use verdant_core::PaymentMethod;

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::models::Flash;
use crate::routes::layout::PageLayout;
use crate::routes::views::CartView;
use crate::services::{CheckoutError, CheckoutForm, CheckoutService};
use crate::state::AppState;

/// A payment method radio option.
#[derive(Debug, Clone)]
pub struct PaymentOption {
    pub value: &'static str,
    pub label: &'static str,
    pub checked: bool,
}

fn payment_options(selected: PaymentMethod) -> Vec<PaymentOption> {
    [PaymentMethod::CashOnDelivery, PaymentMethod::BankTransfer]
        .into_iter()
        .map(|method| PaymentOption {
            value: match method {
                PaymentMethod::CashOnDelivery => "cash_on_delivery",
                PaymentMethod::BankTransfer => "bank_transfer",
            },
            label: method.label(),
            checked: method == selected,
        })
        .collect()
}

/// Checkout page template.
#[derive(Template, WebTemplate)]
#[template(path = "checkout/show.html")]
pub struct CheckoutTemplate {
    pub layout: PageLayout,
    pub cart: CartView,
    pub subtotal: String,
    pub discount: Option<String>,
    pub shipping: String,
    pub total: String,
    pub coupon_code: Option<String>,
    pub coupon_summary: Option<String>,
    pub coupon_error: Option<String>,
    pub free_shipping_remaining: Option<String>,
    pub address: ShippingAddress,
    pub payment_options: Vec<PaymentOption>,
}

/// Coupon form data.
#[derive(Debug, Deserialize)]
pub struct CouponForm {
    #[serde(default)]
    pub code: String,
    pub action: Option<String>,
}

/// Place-order form data.
#[derive(Debug, Deserialize)]
pub struct PlaceOrderForm {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: String,
    pub city: String,
    #[serde(default)]
    pub region: String,
    pub postal_code: String,
    pub country: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub notes: String,
    pub save_address: Option<String>,
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl From<PlaceOrderForm> for CheckoutForm {
    fn from(form: PlaceOrderForm) -> Self {
        Self {
            address: ShippingAddress {
                full_name: form.full_name.trim().to_string(),
                phone: form.phone.trim().to_string(),
                line1: form.line1.trim().to_string(),
                line2: non_blank(form.line2),
                city: form.city.trim().to_string(),
                region: non_blank(form.region),
                postal_code: form.postal_code.trim().to_string(),
                country: form.country.trim().to_string(),
            },
            payment_method: form.payment_method,
            notes: non_blank(form.notes),
            save_address: form.save_address.is_some(),
        }
    }
}

/// Display the checkout page.
#[instrument(skip(state, session, layout, customer))]
pub async fn show(
    State(state): State<AppState>,
    session: Session,
    layout: PageLayout,
    RequireAuth(customer): RequireAuth,
) -> Result<Response> {
    let service = CheckoutService::new(&state, &session, &customer);
    let preview = service.preview().await.map_err(checkout_failure)?;

    if preview.cart.is_empty() {
        Flash::info("Your cart is empty.").push(&session).await?;
        return Ok(Redirect::to("/cart").into_response());
    }

    let profile = state
        .backend()
        .profile(customer.id, customer.token())
        .await
        .map_err(|e| tracing::warn!(error = %e, "Failed to load profile for checkout"))
        .ok();
    let address = profile
        .as_ref()
        .and_then(|p| p.default_address.clone())
        .unwrap_or_else(|| ShippingAddress {
            full_name: profile
                .as_ref()
                .and_then(|p| p.full_name.clone())
                .unwrap_or_else(|| customer.display_name()),
            phone: profile
                .as_ref()
                .and_then(|p| p.phone.clone())
                .unwrap_or_default(),
            ..ShippingAddress::default()
        });

    let totals = preview.totals;
    Ok(CheckoutTemplate {
        layout: PageLayout {
            cart_count: preview.cart.item_count,
            ..layout
        },
        cart: CartView::from(&preview.cart),
        subtotal: totals.subtotal.to_string(),
        discount: (!totals.discount.is_zero()).then(|| totals.discount.to_string()),
        shipping: if totals.shipping.is_zero() {
            "Free".to_string()
        } else {
            totals.shipping.to_string()
        },
        total: totals.total.to_string(),
        coupon_code: preview.coupon.as_ref().map(|c| c.code.clone()),
        coupon_summary: preview.coupon.map(|c| c.summary),
        coupon_error: preview.coupon_error,
        free_shipping_remaining: (!preview.free_shipping_remaining.is_zero())
            .then(|| preview.free_shipping_remaining.to_string()),
        address,
        payment_options: payment_options(PaymentMethod::default()),
    }
    .into_response())
}

/// Apply or remove a coupon code.
#[instrument(skip(state, session, customer, form))]
pub async fn coupon(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Form(form): Form<CouponForm>,
) -> Result<Redirect> {
    let service = CheckoutService::new(&state, &session, &customer);

    if form.action.as_deref() == Some("remove") || form.code.trim().is_empty() {
        service.remove_coupon().await.map_err(checkout_failure)?;
        Flash::info("Coupon removed.").push(&session).await?;
        return Ok(Redirect::to("/checkout"));
    }

    match service.apply_coupon(&form.code).await {
        Ok(applied) => {
            Flash::success(format!("Coupon {} applied: {}.", applied.code, applied.summary))
                .push(&session)
                .await?;
        }
        Err(err) if err.is_customer_facing() => {
            Flash::error(err.to_string()).push(&session).await?;
        }
        Err(err) => return Err(checkout_failure(err)),
    }
    Ok(Redirect::to("/checkout"))
}

/// Place the order.
#[instrument(skip(state, session, customer, form))]
pub async fn place_order(
    State(state): State<AppState>,
    session: Session,
    RequireAuth(customer): RequireAuth,
    Form(form): Form<PlaceOrderForm>,
) -> Result<Redirect> {
    let service = CheckoutService::new(&state, &session, &customer);

    match service.place_order(CheckoutForm::from(form)).await {
        Ok(order_id) => {
            tracing::info!(%order_id, user_id = %customer.id, "Order placed");
            Flash::success("Thank you! Your order has been placed.")
                .push(&session)
                .await?;
            Ok(Redirect::to(&format!("/orders/{order_id}")))
        }
        Err(err) if err.is_customer_facing() => {
            tracing::info!(error = %err, "Checkout refused");
            let back_to = match err {
                CheckoutError::EmptyCart
                | CheckoutError::CartChanged
                | CheckoutError::InsufficientStock(_) => "/cart",
                _ => "/checkout",
            };
            // CartChanged already queued the per-line notices.
            let flash = if matches!(err, CheckoutError::CartChanged) {
                Flash::info(err.to_string())
            } else {
                Flash::error(err.to_string())
            };
            flash.push(&session).await?;
            Ok(Redirect::to(back_to))
        }
        Err(err) => Err(checkout_failure(err)),
    }
}

fn checkout_failure(err: CheckoutError) -> AppError {
    match err {
        CheckoutError::Cart(e) => AppError::Cart(e),
        CheckoutError::Backend(e) => AppError::Backend(e),
        other => AppError::BadRequest(other.to_string()),
    }
}
