//! `orders` and `order_items` tables, and the order RPCs.

use tracing::instrument;
use verdant_core::{OrderId, OrderStatus, UserId};

use crate::rest::{Page, Query};
use crate::tables::products::first;
use crate::types::{Order, OrderStats, PlaceOrderRequest};
use crate::{BackendClient, Result};

const TABLE: &str = "orders";
const WITH_ITEMS: &str = "*,items:order_items(*)";

impl BackendClient {
    /// Place an order for the signed-in customer.
    ///
    /// The `place_order` function re-checks stock and the coupon, writes the
    /// order and its lines, decrements stock and bumps coupon usage in one
    /// transaction.
    ///
    /// # Errors
    ///
    /// Validation failures surface as [`crate::BackendError::Api`] whose
    /// [`raised_message`](crate::BackendError::raised_message) is one of
    /// `insufficient_stock:<id>`, `invalid_coupon:<reason>` or `empty_cart`.
    #[instrument(skip(self, request, token), fields(lines = request.items.len()))]
    pub async fn place_order(&self, request: &PlaceOrderRequest, token: &str) -> Result<OrderId> {
        let id: OrderId = self.rpc("place_order", request, Some(token)).await?;
        tracing::info!(order_id = %id, "Order placed");
        Ok(id)
    }

    /// A customer's orders with their lines, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn orders_for_user(&self, user_id: UserId, token: Option<&str>) -> Result<Vec<Order>> {
        let query = Query::table(TABLE)
            .select(WITH_ITEMS)
            .eq("user_id", user_id)
            .order("created_at", false);
        self.select(&query, token).await
    }

    /// One order with its lines. With a customer token, row-level security
    /// hides other customers' orders.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::NotFound`] if the order is not visible.
    #[instrument(skip(self, token))]
    pub async fn order_with_items(&self, id: OrderId, token: Option<&str>) -> Result<Order> {
        let query = Query::table(TABLE).select(WITH_ITEMS).eq("id", id);
        self.select_one(&query, token).await
    }

    /// Admin listing, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        status: Option<OrderStatus>,
        page: u32,
        per_page: u32,
    ) -> Result<Page<Order>> {
        let mut query = Query::table(TABLE).select(WITH_ITEMS);
        if let Some(status) = status {
            query = query.eq("status", status);
        }
        self.select_page(&query.order("created_at", false), page, per_page, None)
            .await
    }

    /// Most recent orders, for the dashboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn recent_orders(&self, limit: u32) -> Result<Vec<Order>> {
        let query = Query::table(TABLE)
            .select(WITH_ITEMS)
            .order("created_at", false)
            .limit(limit);
        self.select(&query, None).await
    }

    /// Set an order's status. Callers validate the transition first.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::NotFound`] if the order does not exist.
    #[instrument(skip(self))]
    pub async fn update_order_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        let rows: Vec<Order> = self
            .update(
                &Query::table(TABLE).eq("id", id).select(WITH_ITEMS),
                &serde_json::json!({ "status": status }),
                None,
            )
            .await?;
        first(rows, TABLE)
    }

    /// Order counts by status and revenue.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn order_stats(&self) -> Result<OrderStats> {
        self.rpc("admin_order_stats", &serde_json::json!({}), None)
            .await
    }
}
