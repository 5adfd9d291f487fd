//! Order management route handlers.

#![allow(clippy::used_underscore_binding)]

use askama::Template;
use axum::{
    Form,
    extract::{Path, Query, State},
    response::{Html, Redirect},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::{Order, OrderItem};
use verdant_core::{OrderId, OrderStatus};

use crate::{
    error::Result,
    filters,
    middleware::auth::RequireAdminAuth,
    models::Flash,
    state::AppState,
};

use super::{dashboard::AdminUserView, render};

const PER_PAGE: u32 = 20;

/// Listing query parameters.
#[derive(Debug, Deserialize)]
pub struct OrdersQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
}

impl OrdersQuery {
    /// Status filter; unknown values mean "all".
    fn status(&self) -> Option<OrderStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Status filter tab.
#[derive(Debug, Clone)]
pub struct StatusTab {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

fn status_tabs(selected: Option<OrderStatus>) -> Vec<StatusTab> {
    std::iter::once(StatusTab {
        value: "",
        label: "All",
        selected: selected.is_none(),
    })
    .chain(OrderStatus::ALL.iter().map(|s| StatusTab {
        value: s.as_str(),
        label: s.label(),
        selected: selected == Some(*s),
    }))
    .collect()
}

/// Order row for the listing.
#[derive(Debug, Clone)]
pub struct OrderRowView {
    pub id: i64,
    pub reference: String,
    pub customer_name: String,
    pub item_count: u32,
    pub total: String,
    pub status: &'static str,
    pub status_label: &'static str,
    pub payment: &'static str,
    pub placed_at: String,
}

impl From<&Order> for OrderRowView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.as_i64(),
            reference: order.reference(),
            customer_name: order.shipping_address.full_name.clone(),
            item_count: order.item_count(),
            total: order.total.to_string(),
            status: order.status.as_str(),
            status_label: order.status.label(),
            payment: order.payment_method.label(),
            placed_at: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

/// Orders list page template.
#[derive(Template)]
#[template(path = "orders/index.html")]
pub struct OrdersIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flashes: Vec<Flash>,
    pub orders: Vec<OrderRowView>,
    pub tabs: Vec<StatusTab>,
    pub status_param: String,
    pub total: u64,
    pub page: u32,
    pub total_pages: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

/// Order line for the detail page.
#[derive(Debug, Clone)]
pub struct OrderLineView {
    pub name: String,
    pub unit_price: String,
    pub quantity: i32,
    pub line_total: String,
}

impl From<&OrderItem> for OrderLineView {
    fn from(item: &OrderItem) -> Self {
        Self {
            name: item.product_name.clone(),
            unit_price: item.unit_price.to_string(),
            quantity: item.quantity,
            line_total: item.line_total.to_string(),
        }
    }
}

/// A status the order may move to next.
#[derive(Debug, Clone)]
pub struct NextStatusView {
    pub value: &'static str,
    pub label: &'static str,
    pub destructive: bool,
}

/// Full order for the detail page.
#[derive(Debug, Clone)]
pub struct OrderDetailView {
    pub id: i64,
    pub reference: String,
    pub status: &'static str,
    pub status_label: &'static str,
    pub placed_at: String,
    pub updated_at: Option<String>,
    pub customer_id: String,
    pub ship_to_name: String,
    pub ship_to_phone: String,
    pub ship_to_address: String,
    pub payment: &'static str,
    pub notes: Option<String>,
    pub coupon_code: Option<String>,
    pub lines: Vec<OrderLineView>,
    pub subtotal: String,
    pub discount: Option<String>,
    pub shipping: String,
    pub total: String,
    /// Delivered or cancelled.
    pub closed: bool,
    pub next_statuses: Vec<NextStatusView>,
}

impl From<&Order> for OrderDetailView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.as_i64(),
            reference: order.reference(),
            status: order.status.as_str(),
            status_label: order.status.label(),
            placed_at: order.created_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            updated_at: order
                .updated_at
                .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string()),
            customer_id: order.user_id.to_string(),
            ship_to_name: order.shipping_address.full_name.clone(),
            ship_to_phone: order.shipping_address.phone.clone(),
            ship_to_address: order.shipping_address.one_line(),
            payment: order.payment_method.label(),
            notes: order.notes.clone().filter(|n| !n.trim().is_empty()),
            coupon_code: order.coupon_code.clone(),
            lines: order.items.iter().map(OrderLineView::from).collect(),
            subtotal: order.subtotal.to_string(),
            discount: (!order.discount.is_zero()).then(|| order.discount.to_string()),
            shipping: if order.shipping.is_zero() {
                "Free".to_string()
            } else {
                order.shipping.to_string()
            },
            total: order.total.to_string(),
            closed: order.status.is_terminal(),
            next_statuses: order
                .status
                .next_statuses()
                .into_iter()
                .map(|s| NextStatusView {
                    value: s.as_str(),
                    label: s.label(),
                    destructive: s == OrderStatus::Cancelled,
                })
                .collect(),
        }
    }
}

/// Order detail page template.
#[derive(Template)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flashes: Vec<Flash>,
    pub order: OrderDetailView,
}

/// Status change form.
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    pub status: String,
}

/// Check a requested status change against the lifecycle.
///
/// # Errors
///
/// Returns a message when the value is unknown or the move is not allowed.
pub fn check_transition(
    current: OrderStatus,
    requested: &str,
) -> std::result::Result<OrderStatus, String> {
    let next: OrderStatus = requested
        .parse()
        .map_err(|_| format!("Unknown status \"{requested}\""))?;
    if current.can_transition_to(next) {
        Ok(next)
    } else {
        Err(format!("Cannot move an order from {current} to {next}"))
    }
}

/// Orders list page handler.
#[instrument(skip(admin, state, session))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<OrdersQuery>,
) -> Html<String> {
    let status = query.status();
    let page_number = query.page.unwrap_or(1).max(1);

    let (orders, total, total_pages, prev_page, next_page) = match state
        .backend()
        .list_orders(status, page_number, PER_PAGE)
        .await
    {
        Ok(page) => (
            page.items.iter().map(OrderRowView::from).collect(),
            page.total,
            page.total_pages(),
            page.has_prev().then(|| page.page - 1),
            page.has_next().then(|| page.page + 1),
        ),
        Err(e) => {
            tracing::error!("Failed to fetch orders: {e}");
            (vec![], 0, 0, None, None)
        }
    };

    let template = OrdersIndexTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/orders".to_string(),
        flashes: Flash::take_all(&session).await,
        orders,
        tabs: status_tabs(status),
        status_param: status.map(|s| s.as_str().to_string()).unwrap_or_default(),
        total,
        page: page_number,
        total_pages,
        prev_page,
        next_page,
    };

    render(&template)
}

/// Order detail page handler.
#[instrument(skip(admin, state, session))]
pub async fn show(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Html<String>> {
    let order = state
        .backend()
        .order_with_items(OrderId::new(id), None)
        .await?;

    let template = OrderShowTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/orders".to_string(),
        flashes: Flash::take_all(&session).await,
        order: OrderDetailView::from(&order),
    };

    Ok(render(&template))
}

/// Status change handler.
///
/// Re-reads the order so the check runs against its current status, not
/// whatever the page showed when it was loaded.
#[instrument(skip(_admin, state, session))]
pub async fn update_status(
    RequireAdminAuth(_admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Form(form): Form<StatusForm>,
) -> Result<Redirect> {
    let order_id = OrderId::new(id);
    let order = state.backend().order_with_items(order_id, None).await?;
    let back = format!("/orders/{id}");

    let next = match check_transition(order.status, &form.status) {
        Ok(next) => next,
        Err(message) => {
            tracing::warn!(order_id = %order_id, from = %order.status, to = %form.status, "Rejected status change");
            Flash::error(message).push(&session).await;
            return Ok(Redirect::to(&back));
        }
    };

    let updated = state.backend().update_order_status(order_id, next).await?;
    tracing::info!(order_id = %order_id, from = %order.status, to = %updated.status, "Order status changed");
    Flash::success(format!(
        "{} is now {}",
        updated.reference(),
        updated.status.label().to_lowercase()
    ))
    .push(&session)
    .await;

    Ok(Redirect::to(&back))
}
