//! Dashboard route handler.

use askama::Template;
use axum::{extract::State, response::Html};
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::{Order, OrderStats, Product};
use verdant_core::OrderStatus;

use crate::{
    filters,
    middleware::auth::RequireAdminAuth,
    models::{CurrentAdmin, Flash},
    state::AppState,
};

use super::render;

/// How many orders the dashboard lists.
const RECENT_ORDER_LIMIT: u32 = 8;

/// Admin user view for templates.
#[derive(Debug, Clone)]
pub struct AdminUserView {
    pub name: String,
    pub email: String,
}

impl From<&CurrentAdmin> for AdminUserView {
    fn from(admin: &CurrentAdmin) -> Self {
        Self {
            name: admin.name.clone(),
            email: admin.email.to_string(),
        }
    }
}

/// One tile in the status breakdown.
#[derive(Debug, Clone)]
pub struct StatusCountView {
    pub status: &'static str,
    pub label: &'static str,
    pub count: i64,
}

/// Dashboard metrics.
#[derive(Debug, Clone)]
pub struct DashboardMetrics {
    pub total_orders: i64,
    pub orders_today: i64,
    pub revenue: String,
    pub by_status: Vec<StatusCountView>,
}

impl Default for DashboardMetrics {
    fn default() -> Self {
        Self {
            total_orders: 0,
            orders_today: 0,
            revenue: "$0.00".to_string(),
            by_status: OrderStatus::ALL
                .iter()
                .map(|s| StatusCountView {
                    status: s.as_str(),
                    label: s.label(),
                    count: 0,
                })
                .collect(),
        }
    }
}

impl From<&OrderStats> for DashboardMetrics {
    fn from(stats: &OrderStats) -> Self {
        Self {
            total_orders: stats.total_orders,
            orders_today: stats.orders_today,
            revenue: stats.revenue.to_string(),
            by_status: OrderStatus::ALL
                .iter()
                .map(|s| StatusCountView {
                    status: s.as_str(),
                    label: s.label(),
                    count: stats.count_for(*s),
                })
                .collect(),
        }
    }
}

/// Recent order view for dashboard.
#[derive(Debug, Clone)]
pub struct RecentOrderView {
    pub id: i64,
    pub reference: String,
    pub customer_name: String,
    pub total: String,
    pub status: &'static str,
    pub status_label: &'static str,
    pub placed_at: String,
}

impl From<&Order> for RecentOrderView {
    fn from(order: &Order) -> Self {
        let name = order.shipping_address.full_name.trim();
        Self {
            id: order.id.as_i64(),
            reference: order.reference(),
            customer_name: if name.is_empty() {
                "Customer".to_string()
            } else {
                name.to_string()
            },
            total: order.total.to_string(),
            status: order.status.as_str(),
            status_label: order.status.label(),
            placed_at: order.created_at.format("%b %-d, %H:%M").to_string(),
        }
    }
}

/// Low-stock row for dashboard.
#[derive(Debug, Clone)]
pub struct LowStockView {
    pub id: i64,
    pub name: String,
    pub stock: u32,
}

impl From<&Product> for LowStockView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.as_i64(),
            name: product.name.clone(),
            stock: product.available(),
        }
    }
}

/// Dashboard template.
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flashes: Vec<Flash>,
    pub metrics: DashboardMetrics,
    pub recent_orders: Vec<RecentOrderView>,
    pub low_stock: Vec<LowStockView>,
    pub low_stock_threshold: u32,
}

/// Dashboard page handler.
#[instrument(skip(admin, state, session))]
pub async fn dashboard(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
) -> Html<String> {
    let threshold = state.config().low_stock_threshold;

    // Fetch from the backend in parallel
    let (stats_result, low_stock_result, orders_result) = tokio::join!(
        state.backend().order_stats(),
        state.backend().low_stock(threshold),
        state.backend().recent_orders(RECENT_ORDER_LIMIT),
    );

    let metrics = match stats_result {
        Ok(stats) => DashboardMetrics::from(&stats),
        Err(e) => {
            tracing::error!("Failed to fetch order stats: {e}");
            DashboardMetrics::default()
        }
    };

    let low_stock = match low_stock_result {
        Ok(products) => products.iter().map(LowStockView::from).collect(),
        Err(e) => {
            tracing::error!("Failed to fetch low stock products: {e}");
            vec![]
        }
    };

    let recent_orders = match orders_result {
        Ok(orders) => orders.iter().map(RecentOrderView::from).collect(),
        Err(e) => {
            tracing::error!("Failed to fetch recent orders: {e}");
            vec![]
        }
    };

    let template = DashboardTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/".to_string(),
        flashes: Flash::take_all(&session).await,
        metrics,
        recent_orders,
        low_stock,
        low_stock_threshold: threshold,
    };

    render(&template)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rust_decimal::Decimal;
    use verdant_backend::StatusCount;
    use verdant_core::Price;

    use super::*;

    #[test]
    fn test_metrics_cover_every_status() {
        let stats = OrderStats {
            status_counts: vec![
                StatusCount {
                    status: OrderStatus::Pending,
                    count: 3,
                },
                StatusCount {
                    status: OrderStatus::Delivered,
                    count: 9,
                },
            ],
            revenue: Price::new(Decimal::new(123_450, 2)).unwrap(),
            total_orders: 12,
            orders_today: 2,
        };

        let metrics = DashboardMetrics::from(&stats);
        assert_eq!(metrics.by_status.len(), OrderStatus::ALL.len());
        assert_eq!(metrics.revenue, "$1234.50");
        let pending = metrics
            .by_status
            .iter()
            .find(|s| s.status == "pending")
            .unwrap();
        assert_eq!(pending.count, 3);
        let shipped = metrics
            .by_status
            .iter()
            .find(|s| s.status == "shipped")
            .unwrap();
        assert_eq!(shipped.count, 0);
    }

    #[test]
    fn test_default_metrics_are_zero() {
        let metrics = DashboardMetrics::default();
        assert_eq!(metrics.total_orders, 0);
        assert!(metrics.by_status.iter().all(|s| s.count == 0));
    }
}
