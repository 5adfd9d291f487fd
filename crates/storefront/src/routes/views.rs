//! Display types shared by several templates.

use verdant_backend::{Order, OrderItem, Page, Product};
use verdant_core::OrderStatus;

use crate::services::{CartItem, CartSnapshot};

/// Stock at or below this shows a "only N left" badge.
pub const LOW_STOCK_BADGE: u32 = 5;

/// Product display data for templates.
#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub description: String,
    pub category: Option<String>,
    pub price: String,
    pub compare_at_price: Option<String>,
    pub unit: Option<String>,
    pub image_url: Option<String>,
    pub stock: u32,
    pub in_stock: bool,
    pub low_stock: bool,
    pub wishlisted: bool,
}

impl From<&Product> for ProductView {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.as_i64(),
            slug: product.slug.clone(),
            name: product.name.clone(),
            description: product.description.clone().unwrap_or_default(),
            category: product.category.clone(),
            price: product.price.to_string(),
            compare_at_price: product
                .is_on_sale()
                .then(|| product.compare_at_price.map(|p| p.to_string()))
                .flatten(),
            unit: product.unit.clone(),
            image_url: product.image_url.clone(),
            stock: product.available(),
            in_stock: product.in_stock(),
            low_stock: product.is_low_stock(LOW_STOCK_BADGE),
            wishlisted: false,
        }
    }
}

impl ProductView {
    /// Mark products that are on the customer's wishlist.
    #[must_use]
    pub fn with_wishlist(mut self, wishlist: &[verdant_core::ProductId]) -> Self {
        self.wishlisted = wishlist.iter().any(|id| id.as_i64() == self.id);
        self
    }
}

/// Pagination links for listings.
#[derive(Debug, Clone, Default)]
pub struct Pagination {
    pub page: u32,
    pub total_pages: u32,
    pub total: u64,
    pub prev_url: Option<String>,
    pub next_url: Option<String>,
}

impl Pagination {
    /// Build links from a page, keeping the other query parameters.
    #[must_use]
    pub fn from_page<T>(page: &Page<T>, base_query: &str) -> Self {
        let link = |n: u32| {
            if base_query.is_empty() {
                format!("?page={n}")
            } else {
                format!("?{base_query}&page={n}")
            }
        };
        Self {
            page: page.page,
            total_pages: page.total_pages(),
            total: page.total,
            prev_url: page.has_prev().then(|| link(page.page.saturating_sub(1))),
            next_url: page.has_next().then(|| link(page.page + 1)),
        }
    }
}

/// A cart line for templates.
#[derive(Debug, Clone)]
pub struct CartItemView {
    pub product: ProductView,
    pub quantity: u32,
    pub line_total: String,
}

impl From<&CartItem> for CartItemView {
    fn from(item: &CartItem) -> Self {
        Self {
            product: ProductView::from(&item.product),
            quantity: item.quantity,
            line_total: item.line_total.to_string(),
        }
    }
}

/// A cart for templates.
#[derive(Debug, Clone)]
pub struct CartView {
    pub items: Vec<CartItemView>,
    pub subtotal: String,
    pub item_count: u32,
    pub notices: Vec<String>,
}

impl From<&CartSnapshot> for CartView {
    fn from(cart: &CartSnapshot) -> Self {
        Self {
            items: cart.items.iter().map(CartItemView::from).collect(),
            subtotal: cart.subtotal.to_string(),
            item_count: cart.item_count,
            notices: cart.notices.clone(),
        }
    }
}

impl CartView {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// One step on the order tracking timeline.
#[derive(Debug, Clone)]
pub struct TrackingStep {
    pub label: &'static str,
    pub done: bool,
    pub current: bool,
}

/// An order line for templates.
#[derive(Debug, Clone)]
pub struct OrderItemView {
    pub name: String,
    pub unit_price: String,
    pub quantity: i32,
    pub line_total: String,
}

impl From<&OrderItem> for OrderItemView {
    fn from(item: &OrderItem) -> Self {
        Self {
            name: item.product_name.clone(),
            unit_price: item.unit_price.to_string(),
            quantity: item.quantity,
            line_total: item.line_total.to_string(),
        }
    }
}

/// An order for templates.
#[derive(Debug, Clone)]
pub struct OrderView {
    pub id: i64,
    pub reference: String,
    pub status: OrderStatus,
    pub status_label: &'static str,
    pub placed_on: String,
    pub item_count: u32,
    pub items: Vec<OrderItemView>,
    pub subtotal: String,
    pub discount: Option<String>,
    pub shipping: String,
    pub total: String,
    pub coupon_code: Option<String>,
    pub payment_method: &'static str,
    pub ship_to_name: String,
    pub ship_to: String,
    pub notes: Option<String>,
}

impl From<&Order> for OrderView {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id.as_i64(),
            reference: order.reference(),
            status: order.status,
            status_label: order.status.label(),
            placed_on: order.created_at.format("%B %-d, %Y").to_string(),
            item_count: order.item_count(),
            items: order.items.iter().map(OrderItemView::from).collect(),
            subtotal: order.subtotal.to_string(),
            discount: (!order.discount.is_zero()).then(|| order.discount.to_string()),
            shipping: if order.shipping.is_zero() {
                "Free".to_string()
            } else {
                order.shipping.to_string()
            },
            total: order.total.to_string(),
            coupon_code: order.coupon_code.clone(),
            payment_method: order.payment_method.label(),
            ship_to_name: order.shipping_address.full_name.clone(),
            ship_to: order.shipping_address.one_line(),
            notes: order.notes.clone(),
        }
    }
}

impl OrderView {
    /// Timeline steps; empty for cancelled orders.
    #[must_use]
    pub fn tracking(&self) -> Vec<TrackingStep> {
        let Some(reached) = self.status.tracking_index() else {
            return Vec::new();
        };
        OrderStatus::TRACKING_STEPS
            .iter()
            .enumerate()
            .map(|(i, step)| TrackingStep {
                label: step.label(),
                done: i <= reached,
                current: i == reached,
            })
            .collect()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.status == OrderStatus::Cancelled
    }

    /// CSS modifier for the status badge.
    #[must_use]
    pub const fn status_class(&self) -> &'static str {
        self.status.as_str()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn page(page: u32, total: u64) -> Page<()> {
        Page {
            items: Vec::new(),
            total,
            page,
            per_page: 12,
        }
    }

    #[test]
    fn test_pagination_links_keep_query() {
        let p = Pagination::from_page(&page(2, 40), "q=oat&sort=price_asc");
        assert_eq!(p.total_pages, 4);
        assert_eq!(p.prev_url.as_deref(), Some("?q=oat&sort=price_asc&page=1"));
        assert_eq!(p.next_url.as_deref(), Some("?q=oat&sort=price_asc&page=3"));

        let first = Pagination::from_page(&page(1, 5), "");
        assert!(first.prev_url.is_none());
        assert!(first.next_url.is_none());
    }
}
