//! Order history and tracking.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::instrument;
use verdant_backend::BackendError;
use verdant_core::OrderId;

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::RequireAuth;
use crate::routes::layout::PageLayout;
use crate::routes::views::OrderView;
use crate::state::AppState;

/// Order history page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/index.html")]
pub struct OrdersIndexTemplate {
    pub layout: PageLayout,
    pub orders: Vec<OrderView>,
}

/// Order detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "orders/show.html")]
pub struct OrderShowTemplate {
    pub layout: PageLayout,
    pub order: OrderView,
}

/// List the customer's orders, newest first.
#[instrument(skip(state, layout, customer))]
pub async fn index(
    State(state): State<AppState>,
    layout: PageLayout,
    RequireAuth(customer): RequireAuth,
) -> Result<impl IntoResponse> {
    let orders = state
        .backend()
        .orders_for_user(customer.id, customer.token())
        .await?;

    Ok(OrdersIndexTemplate {
        layout,
        orders: orders.iter().map(OrderView::from).collect(),
    })
}

/// Show one order with its tracking timeline.
#[instrument(skip(state, layout, customer))]
pub async fn show(
    State(state): State<AppState>,
    layout: PageLayout,
    RequireAuth(customer): RequireAuth,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    let order_id = OrderId::new(id);
    let order = match state
        .backend()
        .order_with_items(order_id, customer.token())
        .await
    {
        Ok(order) => order,
        Err(BackendError::NotFound(_)) => {
            return Err(AppError::NotFound(format!("order {order_id}")));
        }
        Err(e) => return Err(e.into()),
    };

    // Row-level security already hides other customers' orders.
    if order.user_id != customer.id {
        return Err(AppError::NotFound(format!("order {order_id}")));
    }

    Ok(OrderShowTemplate {
        layout,
        order: OrderView::from(&order),
    })
}
