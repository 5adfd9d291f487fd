//! Checkout: coupon handling, totals preview, and order placement.
//!
//! The totals shown here are a preview computed with `verdant_core::pricing`.
//! The backend's `place_order` function recomputes everything inside one
//! transaction and is the only thing that decides what an order costs.

use chrono::Utc;
use thiserror::Error;
use tower_sessions::Session;
use verdant_backend::{BackendError, MissingField, PlaceOrderRequest, ShippingAddress};
use verdant_core::cart::StockChange;
use verdant_core::pricing::{self, CouponRejection, OrderTotals, ShippingPolicy};
use verdant_core::{OrderId, PaymentMethod, Price, ProductId};

use crate::models::{CurrentCustomer, Flash, session_keys};
use crate::services::cart::{CartService, CartServiceError, CartSnapshot};
use crate::state::AppState;

/// Why an order could not be placed.
#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("Your cart is empty.")]
    EmptyCart,

    #[error("Some items in your cart ran out while you were checking out.")]
    InsufficientStock(ProductId),

    #[error("Coupon not applied: {0}.")]
    InvalidCoupon(String),

    #[error("{0}.")]
    InvalidAddress(#[from] MissingField),

    /// The cart was adjusted against stock just before placing the order.
    #[error("Your cart changed. Please review it before placing your order.")]
    CartChanged,

    #[error(transparent)]
    Cart(#[from] CartServiceError),

    #[error(transparent)]
    Backend(BackendError),
}

impl CheckoutError {
    /// Whether the customer can fix this by editing the form or cart.
    #[must_use]
    pub const fn is_customer_facing(&self) -> bool {
        !matches!(self, Self::Cart(_) | Self::Backend(_))
    }
}

impl From<BackendError> for CheckoutError {
    fn from(err: BackendError) -> Self {
        if let Some(mapped) = err.raised_message().and_then(parse_raised) {
            return mapped;
        }
        Self::Backend(err)
    }
}

/// Map a message raised by `place_order` to a checkout error.
fn parse_raised(message: &str) -> Option<CheckoutError> {
    if message == "empty_cart" {
        return Some(CheckoutError::EmptyCart);
    }
    if let Some(id) = message.strip_prefix("insufficient_stock:") {
        return id.trim().parse().ok().map(CheckoutError::InsufficientStock);
    }
    message
        .strip_prefix("invalid_coupon:")
        .map(|reason| CheckoutError::InvalidCoupon(coupon_reason(reason).to_string()))
}

/// Human wording for a coupon rejection code.
fn coupon_reason(code: &str) -> &'static str {
    match code {
        "inactive" => "this coupon is no longer active",
        "expired" => "this coupon has expired",
        "exhausted" => "this coupon has reached its usage limit",
        "below_minimum" => "your subtotal is below this coupon's minimum",
        _ => "coupon not found",
    }
}

/// A coupon that currently applies to the cart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedCoupon {
    pub code: String,
    pub summary: String,
}

/// What the checkout page shows.
#[derive(Debug, Clone)]
pub struct CheckoutPreview {
    pub cart: CartSnapshot,
    pub totals: OrderTotals,
    pub coupon: Option<AppliedCoupon>,
    /// Set when the coupon in the session stopped applying.
    pub coupon_error: Option<String>,
    /// Amount still needed for free shipping (zero once reached).
    pub free_shipping_remaining: Price,
}

/// Checkout form fields.
#[derive(Debug, Clone)]
pub struct CheckoutForm {
    pub address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub save_address: bool,
}

/// Checkout operations for one signed-in request.
pub struct CheckoutService<'a> {
    state: &'a AppState,
    session: &'a Session,
    customer: &'a CurrentCustomer,
}

impl<'a> CheckoutService<'a> {
    #[must_use]
    pub const fn new(
        state: &'a AppState,
        session: &'a Session,
        customer: &'a CurrentCustomer,
    ) -> Self {
        Self {
            state,
            session,
            customer,
        }
    }

    fn cart(&self) -> CartService<'a> {
        CartService::new(self.state.backend(), self.session, Some(self.customer))
    }

    async fn policy(&self) -> ShippingPolicy {
        match self.state.catalog().settings().await {
            Ok(settings) => settings.policy(),
            Err(e) => {
                tracing::warn!(error = %e, "Store settings unavailable, using defaults");
                verdant_backend::StoreSettings::default().policy()
            }
        }
    }

    /// Reconciled cart with totals, coupon and shipping figures.
    ///
    /// A coupon in the session that no longer applies is dropped and its
    /// reason returned in `coupon_error`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart, coupon or settings cannot be loaded.
    pub async fn preview(&self) -> Result<CheckoutPreview, CheckoutError> {
        let cart = self.cart().snapshot().await?;
        let policy = self.policy().await;

        let mut coupon = None;
        let mut coupon_error = None;
        let mut discount = Price::ZERO;

        let code = self
            .session
            .get::<String>(session_keys::COUPON_CODE)
            .await
            .map_err(CartServiceError::from)?;
        if let Some(code) = code {
            match self.evaluate(&code, cart.subtotal).await? {
                Ok((applied, amount)) => {
                    coupon = Some(applied);
                    discount = amount;
                }
                Err(rejection) => {
                    self.session
                        .remove::<String>(session_keys::COUPON_CODE)
                        .await
                        .map_err(CartServiceError::from)?;
                    coupon_error = Some(rejection.to_string());
                }
            }
        }

        let totals = OrderTotals::compute(cart.subtotal, discount, &policy);
        let free_shipping_remaining = if cart.is_empty() {
            Price::ZERO
        } else {
            policy.remaining_for_free(totals.subtotal.saturating_sub(totals.discount))
        };

        Ok(CheckoutPreview {
            cart,
            totals,
            coupon,
            coupon_error,
            free_shipping_remaining,
        })
    }

    /// Check a code against the current cart and remember it if it applies.
    ///
    /// # Errors
    ///
    /// Returns [`CheckoutError::InvalidCoupon`] with the reason it was rejected.
    pub async fn apply_coupon(&self, code: &str) -> Result<AppliedCoupon, CheckoutError> {
        let code = pricing::normalize_code(code);
        if code.is_empty() {
            return Err(CheckoutError::InvalidCoupon("enter a coupon code".to_string()));
        }

        let cart = self.cart().snapshot().await?;
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        match self.evaluate(&code, cart.subtotal).await? {
            Ok((applied, _)) => {
                self.session
                    .insert(session_keys::COUPON_CODE, &applied.code)
                    .await
                    .map_err(CartServiceError::from)?;
                tracing::info!(code = %applied.code, "Coupon applied");
                Ok(applied)
            }
            Err(rejection) => {
                tracing::info!(code = %code, reason = rejection.code(), "Coupon rejected");
                Err(CheckoutError::InvalidCoupon(rejection.to_string()))
            }
        }
    }

    /// Forget the applied coupon.
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be written.
    pub async fn remove_coupon(&self) -> Result<(), CheckoutError> {
        self.session
            .remove::<String>(session_keys::COUPON_CODE)
            .await
            .map_err(CartServiceError::from)?;
        Ok(())
    }

    async fn evaluate(
        &self,
        code: &str,
        subtotal: Price,
    ) -> Result<Result<(AppliedCoupon, Price), CouponRejection>, CheckoutError> {
        let coupon = match self
            .state
            .backend()
            .coupon_by_code(code, self.customer.token())
            .await
        {
            Ok(coupon) => coupon,
            Err(BackendError::NotFound(_)) => return Ok(Err(CouponRejection::NotFound)),
            Err(e) => return Err(CheckoutError::Backend(e)),
        };

        Ok(
            pricing::evaluate_coupon(&coupon.rules(), subtotal, Utc::now()).map(|discount| {
                (
                    AppliedCoupon {
                        summary: coupon.summary(),
                        code: coupon.code,
                    },
                    discount,
                )
            }),
        )
    }

    /// Place the order.
    ///
    /// The cart is reconciled first; if that changes anything the order is
    /// not placed and the customer is sent back to review. On success the
    /// cart and coupon are cleared and new stock levels are broadcast. Once
    /// the backend has accepted the order this always returns its id.
    ///
    /// # Errors
    ///
    /// Returns a [`CheckoutError`] describing what the customer must fix, or
    /// a backend error.
    pub async fn place_order(&self, form: CheckoutForm) -> Result<OrderId, CheckoutError> {
        form.address.validate()?;

        let cart = self.cart().snapshot().await?;
        if !cart.notices.is_empty() {
            for notice in cart.notices {
                Flash::info(notice)
                    .push(self.session)
                    .await
                    .map_err(CartServiceError::from)?;
            }
            return Err(CheckoutError::CartChanged);
        }
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let coupon_code = self
            .session
            .get::<String>(session_keys::COUPON_CODE)
            .await
            .map_err(CartServiceError::from)?;

        let request = PlaceOrderRequest {
            items: cart.lines(),
            coupon_code,
            shipping_address: form.address.clone(),
            payment_method: form.payment_method,
            notes: form.notes.filter(|n| !n.trim().is_empty()),
        };

        let token = self
            .customer
            .token()
            .ok_or_else(|| BackendError::Unauthorized("missing access token".into()))?;
        let order_id = self.state.backend().place_order(&request, token).await?;

        // The order exists from here on; cleanup failures are only logged.
        // `place_order` already emptied the saved cart server-side.
        if let Err(e) = self.cart().clear().await {
            tracing::warn!(order_id = %order_id, error = %e, "Failed to clear cart after order");
        }
        if let Err(e) = self.remove_coupon().await {
            tracing::warn!(order_id = %order_id, error = %e, "Failed to drop coupon after order");
        }

        if form.save_address {
            let update = verdant_backend::ProfileUpdate {
                full_name: Some(form.address.full_name.clone()),
                phone: Some(form.address.phone.clone()),
                default_address: Some(form.address),
            };
            if let Err(e) = self
                .state
                .backend()
                .upsert_profile(self.customer.id, &update, self.customer.token())
                .await
            {
                tracing::warn!(error = %e, "Failed to save default address");
            }
        }

        self.broadcast_stock(&request).await;
        Ok(order_id)
    }

    /// Push the post-order stock of every ordered product to live listeners.
    async fn broadcast_stock(&self, request: &PlaceOrderRequest) {
        let ids: Vec<ProductId> = request.items.iter().map(|l| l.product_id).collect();
        match self.state.backend().stock_levels(Some(&ids)).await {
            Ok(levels) => {
                for level in levels {
                    self.state.catalog().invalidate_product(level.product_id);
                    self.state.stock().publish(StockChange {
                        product_id: level.product_id,
                        stock: if level.active { level.stock } else { 0 },
                    });
                }
            }
            Err(e) => tracing::warn!(error = %e, "Could not refresh stock after order"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::{self, BackendData, FakeBackend, ORDER_ID, product};

    fn raised(message: &str) -> BackendError {
        BackendError::Api {
            status: 400,
            code: Some("P0001".into()),
            message: message.into(),
        }
    }

    #[test]
    fn test_raised_messages_map_to_checkout_errors() {
        assert!(matches!(
            CheckoutError::from(raised("empty_cart")),
            CheckoutError::EmptyCart
        ));
        assert!(matches!(
            CheckoutError::from(raised("insufficient_stock:42")),
            CheckoutError::InsufficientStock(id) if id == ProductId::new(42)
        ));
        match CheckoutError::from(raised("invalid_coupon:expired")) {
            CheckoutError::InvalidCoupon(reason) => assert_eq!(reason, "this coupon has expired"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_errors_stay_backend_errors() {
        assert!(matches!(
            CheckoutError::from(raised("not_authenticated")),
            CheckoutError::Backend(_)
        ));
        assert!(matches!(
            CheckoutError::from(BackendError::NotFound("orders".into())),
            CheckoutError::Backend(_)
        ));
    }

    #[test]
    fn test_customer_facing_errors() {
        assert!(CheckoutError::EmptyCart.is_customer_facing());
        assert!(CheckoutError::InvalidAddress(MissingField("City")).is_customer_facing());
        assert!(!CheckoutError::Backend(BackendError::InvalidConfig("x".into())).is_customer_facing());
        assert_eq!(
            CheckoutError::InvalidAddress(MissingField("City")).to_string(),
            "City is required."
        );
    }

    #[test]
    fn test_coupon_reason_wording() {
        assert_eq!(coupon_reason("below_minimum"), "your subtotal is below this coupon's minimum");
        assert_eq!(coupon_reason("whatever"), "coupon not found");
    }

    fn form() -> CheckoutForm {
        CheckoutForm {
            address: ShippingAddress {
                full_name: "Ada Lovelace".into(),
                phone: "+44 20 7946 0000".into(),
                line1: "12 Orchard Lane".into(),
                line2: None,
                city: "Bristol".into(),
                region: None,
                postal_code: "BS1 4DJ".into(),
                country: "GB".into(),
            },
            payment_method: PaymentMethod::CashOnDelivery,
            notes: Some("   ".into()),
            save_address: false,
        }
    }

    async fn backend_with(saved_cart: Vec<(i64, u32)>, fail_cart_delete: bool) -> FakeBackend {
        FakeBackend::start(BackendData {
            products: vec![product(1, "Raw Honey", 1250, 5)],
            saved_cart,
            fail_cart_delete,
            ..BackendData::default()
        })
        .await
    }

    #[tokio::test]
    async fn test_place_order_returns_id_when_cleanup_fails() {
        let fake = backend_with(vec![(1, 2)], true).await;
        let state = fake.state();
        let session = test_support::session();
        session
            .insert(session_keys::COUPON_CODE, "HARVEST10")
            .await
            .unwrap();
        let customer = test_support::customer();
        let mut stock = state.stock().subscribe();

        let order_id = CheckoutService::new(&state, &session, &customer)
            .place_order(form())
            .await
            .unwrap();
        assert_eq!(order_id, OrderId::new(ORDER_ID));

        let orders = fake.data().orders.clone();
        assert_eq!(orders.len(), 1);
        assert_eq!(
            orders[0]["p_items"],
            serde_json::json!([{ "product_id": 1, "quantity": 2 }])
        );
        assert_eq!(orders[0]["p_coupon_code"], "HARVEST10");
        assert!(orders[0]["p_notes"].is_null());

        // The coupon and badge are reset even though the backend refused the delete.
        assert!(
            session
                .get::<String>(session_keys::COUPON_CODE)
                .await
                .unwrap()
                .is_none()
        );
        assert_eq!(
            session.get::<u32>(session_keys::CART_COUNT).await.unwrap(),
            Some(0)
        );
        assert_eq!(
            stock.try_recv().unwrap(),
            StockChange {
                product_id: ProductId::new(1),
                stock: 5
            }
        );
    }

    #[tokio::test]
    async fn test_place_order_stops_when_cart_changed() {
        let fake = backend_with(vec![(1, 8)], false).await;
        let state = fake.state();
        let session = test_support::session();
        let customer = test_support::customer();

        let result = CheckoutService::new(&state, &session, &customer)
            .place_order(form())
            .await;
        assert!(matches!(result, Err(CheckoutError::CartChanged)));
        assert!(fake.data().orders.is_empty());
        assert_eq!(fake.data().saved_cart, vec![(1, 5)]);

        let flashes = Flash::take_all(&session).await.unwrap();
        assert_eq!(flashes.len(), 1);
    }

    #[tokio::test]
    async fn test_place_order_rejects_empty_cart_and_bad_address() {
        let fake = backend_with(vec![], false).await;
        let state = fake.state();
        let session = test_support::session();
        let customer = test_support::customer();
        let checkout = CheckoutService::new(&state, &session, &customer);

        assert!(matches!(
            checkout.place_order(form()).await,
            Err(CheckoutError::EmptyCart)
        ));

        let mut missing_city = form();
        missing_city.address.city = " ".into();
        match checkout.place_order(missing_city).await {
            Err(CheckoutError::InvalidAddress(field)) => assert_eq!(field, MissingField("City")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(fake.data().orders.is_empty());
    }
}
