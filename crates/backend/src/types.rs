//! Row types for the hosted tables.
//!
//! Column names follow the SQL in `migrations/`. Integer columns that are
//! constrained non-negative in the schema are still read as `i32` and
//! converted, so a bad row degrades to zero instead of failing a whole page.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use verdant_core::cart::{CartLine, StockLevel};
use verdant_core::pricing::{CouponRules, ShippingPolicy};
use verdant_core::{
    CartItemId, CouponId, DiscountKind, OrderId, OrderItemId, OrderStatus, PaymentMethod, Price,
    ProductId, UserId, UserRole, WishlistItemId,
};

fn non_negative(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

// =============================================================================
// Products
// =============================================================================

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub compare_at_price: Option<Price>,
    pub stock: i32,
    /// Selling unit, e.g. "500 g jar".
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub active: bool,
    #[serde(default)]
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Product {
    #[must_use]
    pub fn available(&self) -> u32 {
        non_negative(self.stock)
    }

    #[must_use]
    pub fn stock_level(&self) -> StockLevel {
        StockLevel {
            product_id: self.id,
            stock: self.available(),
            active: self.active,
        }
    }

    #[must_use]
    pub fn in_stock(&self) -> bool {
        self.active && self.stock > 0
    }

    #[must_use]
    pub fn is_on_sale(&self) -> bool {
        self.compare_at_price.is_some_and(|compare| compare > self.price)
    }

    /// Whether stock is positive but at or below `threshold`.
    #[must_use]
    pub fn is_low_stock(&self, threshold: u32) -> bool {
        let stock = self.available();
        stock > 0 && stock <= threshold
    }
}

/// Fields an admin (or the seeder) sets on a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub compare_at_price: Option<Price>,
    pub stock: u32,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub featured: bool,
}

const fn default_true() -> bool {
    true
}

/// Just the columns the stock watcher needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct StockRow {
    pub id: ProductId,
    pub stock: i32,
    pub active: bool,
}

impl From<StockRow> for StockLevel {
    fn from(row: StockRow) -> Self {
        Self {
            product_id: row.id,
            stock: non_negative(row.stock),
            active: row.active,
        }
    }
}

// =============================================================================
// Cart & wishlist
// =============================================================================

/// A saved cart line for a signed-in customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItemRow {
    pub id: CartItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

impl CartItemRow {
    #[must_use]
    pub fn line(&self) -> CartLine {
        CartLine::new(self.product_id, non_negative(self.quantity))
    }
}

/// Insert/upsert body for `cart_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NewCartItem {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
}

/// A wishlist entry with its product embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistRow {
    pub id: WishlistItemId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub product: Option<Product>,
}

// =============================================================================
// Coupons
// =============================================================================

/// A discount code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    #[serde(default)]
    pub min_order: Option<Price>,
    #[serde(default)]
    pub max_uses: Option<i32>,
    pub used_count: i32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl Coupon {
    #[must_use]
    pub fn rules(&self) -> CouponRules {
        CouponRules {
            code: self.code.clone(),
            kind: self.kind,
            value: self.value,
            min_order: self.min_order,
            max_uses: self.max_uses.map(non_negative),
            used_count: non_negative(self.used_count),
            expires_at: self.expires_at,
            active: self.active,
        }
    }

    /// Short description for listings, e.g. "10% off" or "$5.00 off".
    #[must_use]
    pub fn summary(&self) -> String {
        match self.kind {
            DiscountKind::Percentage => format!("{}% off", self.value.normalize()),
            DiscountKind::Fixed => Price::new(self.value)
                .map_or_else(|_| "invalid".to_string(), |p| format!("{p} off")),
        }
    }
}

/// Insert body for `coupons`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCoupon {
    pub code: String,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_order: Option<Price>,
    pub max_uses: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
    pub active: bool,
}

// =============================================================================
// Orders
// =============================================================================

/// Where an order ships to. Stored as JSON on the order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub phone: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub region: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// A required address field was left blank.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{0} is required")]
pub struct MissingField(pub &'static str);

impl ShippingAddress {
    /// Check that every required field has content.
    ///
    /// # Errors
    ///
    /// Returns the first blank required field.
    pub fn validate(&self) -> Result<(), MissingField> {
        let required = [
            ("Full name", &self.full_name),
            ("Phone", &self.phone),
            ("Address", &self.line1),
            ("City", &self.city),
            ("Postal code", &self.postal_code),
            ("Country", &self.country),
        ];
        match required.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((label, _)) => Err(MissingField(label)),
            None => Ok(()),
        }
    }

    /// One-line rendering for lists and emails.
    #[must_use]
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.line1.trim()];
        if let Some(line2) = self.line2.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            parts.push(line2);
        }
        parts.push(self.city.trim());
        if let Some(region) = self.region.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            parts.push(region);
        }
        parts.push(self.postal_code.trim());
        parts.push(self.country.trim());
        parts.join(", ")
    }
}

/// A line on a placed order. Name and price are copied at order time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    pub product_name: String,
    pub unit_price: Price,
    pub quantity: i32,
    pub line_total: Price,
}

/// A placed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub subtotal: Price,
    pub discount: Price,
    pub shipping: Price,
    pub total: Price,
    #[serde(default)]
    pub coupon_code: Option<String>,
    pub payment_method: PaymentMethod,
    pub shipping_address: ShippingAddress,
    #[serde(default)]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Embedded `order_items`, when selected.
    #[serde(default)]
    pub items: Vec<OrderItem>,
}

impl Order {
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |acc, item| acc.saturating_add(non_negative(item.quantity)))
    }

    /// Public order reference, e.g. `VO-001042`.
    #[must_use]
    pub fn reference(&self) -> String {
        format!("VO-{:06}", self.id.as_i64())
    }
}

/// Arguments for the `place_order` database function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlaceOrderRequest {
    #[serde(rename = "p_items")]
    pub items: Vec<CartLine>,
    #[serde(rename = "p_coupon_code")]
    pub coupon_code: Option<String>,
    #[serde(rename = "p_shipping_address")]
    pub shipping_address: ShippingAddress,
    #[serde(rename = "p_payment_method")]
    pub payment_method: PaymentMethod,
    #[serde(rename = "p_notes")]
    pub notes: Option<String>,
}

/// Orders per status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: i64,
}

/// Dashboard figures from the `admin_order_stats` function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStats {
    #[serde(default)]
    pub status_counts: Vec<StatusCount>,
    /// Sum of totals for orders that were not cancelled.
    pub revenue: Price,
    pub total_orders: i64,
    pub orders_today: i64,
}

impl OrderStats {
    /// Count for one status (zero when absent).
    #[must_use]
    pub fn count_for(&self, status: OrderStatus) -> i64 {
        self.status_counts
            .iter()
            .find(|c| c.status == status)
            .map_or(0, |c| c.count)
    }
}

// =============================================================================
// Profiles & settings
// =============================================================================

/// Per-user profile row, created by a trigger on sign-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub role: UserRole,
    #[serde(default)]
    pub default_address: Option<ShippingAddress>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Fields a customer may change on their own profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub default_address: Option<ShippingAddress>,
}

/// Store-wide settings (single row, `id = 1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    pub shipping_flat_fee: Price,
    pub free_shipping_threshold: Price,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoreSettings {
    #[must_use]
    pub const fn policy(&self) -> ShippingPolicy {
        ShippingPolicy {
            flat_fee: self.shipping_flat_fee,
            free_over: self.free_shipping_threshold,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            shipping_flat_fee: Price::from_cents(499),
            free_shipping_threshold: Price::from_cents(5000),
            updated_at: None,
        }
    }
}
