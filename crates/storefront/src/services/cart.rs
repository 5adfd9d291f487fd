//! Cart storage and reconciliation.
//!
//! Guests keep their cart as `Vec<CartLine>` in the session. Signed-in
//! customers use the backend's `cart_items` table through their own access
//! token. Every read reconciles the cart against live stock, writes the
//! corrected lines back, and reports what changed so the page can say so.

use std::collections::HashMap;

use thiserror::Error;
use tower_sessions::Session;
use verdant_backend::{BackendClient, BackendError, NewCartItem, Product};
use verdant_core::cart::{
    self, CartAdjustment, CartError, CartLine, RemovalReason, StockChange, StockLevel,
};
use verdant_core::{Price, ProductId};

use crate::models::{CurrentCustomer, session_keys};

/// Errors from cart operations.
#[derive(Debug, Error)]
pub enum CartServiceError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),
    #[error(transparent)]
    Quantity(#[from] CartError),
}

type Result<T> = std::result::Result<T, CartServiceError>;

/// A cart line with its product, ready to render.
#[derive(Debug, Clone)]
pub struct CartItem {
    pub product: Product,
    pub quantity: u32,
    pub line_total: Price,
}

/// A reconciled cart.
#[derive(Debug, Clone, Default)]
pub struct CartSnapshot {
    pub items: Vec<CartItem>,
    pub subtotal: Price,
    pub item_count: u32,
    /// Human-readable notes about lines that were removed or reduced.
    pub notices: Vec<String>,
}

impl CartSnapshot {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Lines as sent to `place_order`.
    #[must_use]
    pub fn lines(&self) -> Vec<CartLine> {
        self.items
            .iter()
            .map(|item| CartLine::new(item.product.id, item.quantity))
            .collect()
    }
}

/// Cart operations for one request.
pub struct CartService<'a> {
    backend: &'a BackendClient,
    session: &'a Session,
    customer: Option<&'a CurrentCustomer>,
}

impl<'a> CartService<'a> {
    #[must_use]
    pub const fn new(
        backend: &'a BackendClient,
        session: &'a Session,
        customer: Option<&'a CurrentCustomer>,
    ) -> Self {
        Self {
            backend,
            session,
            customer,
        }
    }

    /// Raw lines, without reconciliation.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or backend cannot be read.
    pub async fn lines(&self) -> Result<Vec<CartLine>> {
        match self.customer {
            Some(customer) => Ok(self
                .backend
                .cart_items(customer.id, customer.token())
                .await?
                .iter()
                .map(verdant_backend::CartItemRow::line)
                .collect()),
            None => Ok(guest_lines(self.session).await?),
        }
    }

    /// Units in the cart for the header badge.
    ///
    /// Uses the count cached in the session and falls back to reading the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or backend cannot be read.
    pub async fn count(&self) -> Result<u32> {
        if let Some(count) = self.session.get::<u32>(session_keys::CART_COUNT).await? {
            return Ok(count);
        }
        let lines = self.lines().await?;
        self.remember_count(&lines).await?;
        Ok(cart::item_count(&lines))
    }

    /// The cart reconciled against live stock.
    ///
    /// Corrections are written back and described in `notices`, once. The
    /// next snapshot of the same cart is clean.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or backend cannot be read or written.
    pub async fn snapshot(&self) -> Result<CartSnapshot> {
        let lines = self.lines().await?;
        if lines.is_empty() {
            self.remember_count(&lines).await?;
            return Ok(CartSnapshot::default());
        }

        let ids: Vec<ProductId> = lines.iter().map(|l| l.product_id).collect();
        let products = self.backend.products_by_ids(&ids).await?;
        let levels: Vec<StockLevel> = products.iter().map(Product::stock_level).collect();
        let reconciliation = cart::reconcile(&lines, &levels);

        let names: HashMap<ProductId, &str> =
            products.iter().map(|p| (p.id, p.name.as_str())).collect();
        let notices: Vec<String> = reconciliation
            .adjustments
            .iter()
            .map(|a| describe_adjustment(a, names.get(&a.product_id()).copied()))
            .collect();

        if reconciliation.is_clean() {
            self.remember_count(&reconciliation.lines).await?;
        } else {
            tracing::info!(
                adjustments = reconciliation.adjustments.len(),
                "Cart reconciled against stock"
            );
            self.replace(&reconciliation.lines).await?;
        }

        let by_id: HashMap<ProductId, &Product> = products.iter().map(|p| (p.id, p)).collect();
        let items: Vec<CartItem> = reconciliation
            .lines
            .iter()
            .filter_map(|line| {
                by_id.get(&line.product_id).map(|product| CartItem {
                    product: (*product).clone(),
                    quantity: line.quantity,
                    line_total: product.price.times(line.quantity),
                })
            })
            .collect();

        Ok(CartSnapshot {
            subtotal: items.iter().map(|i| i.line_total).sum(),
            item_count: cart::item_count(&reconciliation.lines),
            items,
            notices,
        })
    }

    /// Add `quantity` units of a product, checked against live stock.
    ///
    /// Returns the new badge count.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Quantity`] if the cart would exceed stock.
    pub async fn add(&self, product_id: ProductId, quantity: u32) -> Result<u32> {
        let mut lines = self.lines().await?;
        let existing = lines
            .iter()
            .find(|l| l.product_id == product_id)
            .map_or(0, |l| l.quantity);
        if quantity == 0 {
            return Err(CartError::ZeroQuantity.into());
        }

        let available = self.available(product_id).await?;
        let wanted = check_add(existing, quantity, available)?;

        match lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = wanted,
            None => lines.push(CartLine::new(product_id, wanted)),
        }
        self.store_line(&lines, CartLine::new(product_id, wanted))
            .await?;
        Ok(cart::item_count(&lines))
    }

    /// Set a line's quantity; zero removes the line.
    ///
    /// # Errors
    ///
    /// Returns [`CartServiceError::Quantity`] if `quantity` exceeds stock.
    pub async fn set_quantity(&self, product_id: ProductId, quantity: u32) -> Result<()> {
        if quantity == 0 {
            return self.remove(product_id).await;
        }
        let available = self.available(product_id).await?;
        let quantity = cart::check_quantity(quantity, available)?;

        let mut lines = self.lines().await?;
        match lines.iter_mut().find(|l| l.product_id == product_id) {
            Some(line) => line.quantity = quantity,
            None => lines.push(CartLine::new(product_id, quantity)),
        }
        self.store_line(&lines, CartLine::new(product_id, quantity))
            .await
    }

    /// Remove a product from the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or backend cannot be written.
    pub async fn remove(&self, product_id: ProductId) -> Result<()> {
        let mut lines = self.lines().await?;
        lines.retain(|l| l.product_id != product_id);

        match self.customer {
            Some(customer) => {
                self.backend
                    .remove_cart_item(customer.id, product_id, customer.token())
                    .await?;
            }
            None => {
                self.session.insert(session_keys::GUEST_CART, &lines).await?;
            }
        }
        self.remember_count(&lines).await
    }

    /// Empty the cart (after an order is placed).
    ///
    /// # Errors
    ///
    /// Returns an error if the session or backend cannot be written.
    pub async fn clear(&self) -> Result<()> {
        self.session
            .remove::<Vec<CartLine>>(session_keys::GUEST_CART)
            .await?;
        self.remember_count(&[]).await?;
        if let Some(customer) = self.customer {
            self.backend
                .clear_cart(customer.id, customer.token())
                .await?;
        }
        Ok(())
    }

    /// Fold the session's guest cart into the signed-in customer's saved cart.
    ///
    /// The merged cart is reconciled against stock before it is saved.
    /// Returns notices for anything that had to change.
    ///
    /// # Errors
    ///
    /// Returns an error if the session or backend cannot be read or written.
    pub async fn merge_guest_cart(&self) -> Result<Vec<String>> {
        let Some(customer) = self.customer else {
            return Ok(Vec::new());
        };
        let guest = guest_lines(self.session).await?;
        if guest.is_empty() {
            self.session.remove::<u32>(session_keys::CART_COUNT).await?;
            return Ok(Vec::new());
        }

        let saved: Vec<CartLine> = self
            .backend
            .cart_items(customer.id, customer.token())
            .await?
            .iter()
            .map(verdant_backend::CartItemRow::line)
            .collect();
        let merged = cart::merge(&guest, &saved);

        let ids: Vec<ProductId> = merged.iter().map(|l| l.product_id).collect();
        let products = self.backend.products_by_ids(&ids).await?;
        let levels: Vec<StockLevel> = products.iter().map(Product::stock_level).collect();
        let reconciliation = cart::reconcile(&merged, &levels);

        self.backend
            .replace_cart(customer.id, &reconciliation.lines, customer.token())
            .await?;
        self.session
            .remove::<Vec<CartLine>>(session_keys::GUEST_CART)
            .await?;
        self.remember_count(&reconciliation.lines).await?;

        tracing::info!(
            user_id = %customer.id,
            guest_lines = guest.len(),
            saved_lines = saved.len(),
            merged_lines = reconciliation.lines.len(),
            "Merged guest cart"
        );

        let names: HashMap<ProductId, &str> =
            products.iter().map(|p| (p.id, p.name.as_str())).collect();
        Ok(reconciliation
            .adjustments
            .iter()
            .map(|a| describe_adjustment(a, names.get(&a.product_id()).copied()))
            .collect())
    }

    async fn available(&self, product_id: ProductId) -> Result<u32> {
        let levels = self.backend.stock_levels(Some(&[product_id])).await?;
        Ok(levels
            .first()
            .filter(|level| level.active)
            .map_or(0, |level| level.stock))
    }

    async fn store_line(&self, lines: &[CartLine], line: CartLine) -> Result<()> {
        match self.customer {
            Some(customer) => {
                self.backend
                    .upsert_cart_item(
                        NewCartItem {
                            user_id: customer.id,
                            product_id: line.product_id,
                            quantity: line.quantity,
                        },
                        customer.token(),
                    )
                    .await?;
            }
            None => {
                self.session.insert(session_keys::GUEST_CART, lines).await?;
            }
        }
        self.remember_count(lines).await
    }

    async fn replace(&self, lines: &[CartLine]) -> Result<()> {
        match self.customer {
            Some(customer) => {
                self.backend
                    .replace_cart(customer.id, lines, customer.token())
                    .await?;
            }
            None => {
                self.session.insert(session_keys::GUEST_CART, lines).await?;
            }
        }
        self.remember_count(lines).await
    }

    async fn remember_count(&self, lines: &[CartLine]) -> Result<()> {
        self.session
            .insert(session_keys::CART_COUNT, cart::item_count(lines))
            .await?;
        Ok(())
    }
}

async fn guest_lines(
    session: &Session,
) -> std::result::Result<Vec<CartLine>, tower_sessions::session::Error> {
    Ok(session
        .get::<Vec<CartLine>>(session_keys::GUEST_CART)
        .await?
        .unwrap_or_default())
}

/// Check an add-to-cart against stock, counting what is already in the cart.
///
/// # Errors
///
/// Returns [`CartError::ExceedsStock`] with the units still addable.
fn check_add(existing: u32, adding: u32, available: u32) -> std::result::Result<u32, CartError> {
    let wanted = existing.saturating_add(adding);
    match cart::check_quantity(wanted, available) {
        Err(CartError::ExceedsStock { available }) if existing > 0 => Err(CartError::ExceedsStock {
            available: available.saturating_sub(existing),
        }),
        other => other,
    }
}

/// Sentence shown to the customer for a cart adjustment.
#[must_use]
pub fn describe_adjustment(adjustment: &CartAdjustment, name: Option<&str>) -> String {
    let name = name.unwrap_or("An item");
    match adjustment {
        CartAdjustment::Removed { reason, .. } => {
            let why = match reason {
                RemovalReason::Unavailable | RemovalReason::Inactive => "is no longer available",
                RemovalReason::OutOfStock => "sold out",
            };
            format!("{name} {why} and was removed from your cart.")
        }
        CartAdjustment::Clamped { to, .. } => {
            format!("Only {to} of {name} left in stock; your cart was updated.")
        }
    }
}

/// Fold a stock change into a watched copy of the cart and report how it
/// affected the shopper's lines.
///
/// Used by the stock event stream to tell a shopper their open cart changed.
pub fn adjustments_for_change(lines: &mut Vec<CartLine>, change: StockChange) -> Vec<CartAdjustment> {
    let result = cart::apply_stock_change(lines, change);
    *lines = result.lines;
    result.adjustments
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;
    use crate::test_support::{self, BackendData, FakeBackend, product};

    fn id(n: i64) -> ProductId {
        ProductId::new(n)
    }

    #[test]
    fn test_check_add_reports_remaining_headroom() {
        assert_eq!(check_add(0, 2, 5), Ok(2));
        assert_eq!(check_add(3, 2, 5), Ok(5));
        assert_eq!(
            check_add(4, 2, 5),
            Err(CartError::ExceedsStock { available: 1 })
        );
        assert_eq!(
            check_add(0, 6, 5),
            Err(CartError::ExceedsStock { available: 5 })
        );
        assert_eq!(check_add(0, 1, 0), Err(CartError::Unavailable));
    }

    #[test]
    fn test_describe_adjustment() {
        let removed = CartAdjustment::Removed {
            product_id: id(1),
            reason: RemovalReason::OutOfStock,
        };
        assert_eq!(
            describe_adjustment(&removed, Some("Raw Honey")),
            "Raw Honey sold out and was removed from your cart."
        );

        let clamped = CartAdjustment::Clamped {
            product_id: id(2),
            from: 5,
            to: 2,
        };
        assert_eq!(
            describe_adjustment(&clamped, None),
            "Only 2 of An item left in stock; your cart was updated."
        );
    }

    #[test]
    fn test_adjustments_for_change_only_touches_matching_line() {
        let mut lines = vec![CartLine::new(id(1), 3), CartLine::new(id(2), 1)];
        let adjustments = adjustments_for_change(
            &mut lines,
            StockChange {
                product_id: id(1),
                stock: 2,
            },
        );
        assert_eq!(
            adjustments,
            vec![CartAdjustment::Clamped {
                product_id: id(1),
                from: 3,
                to: 2
            }]
        );
        assert_eq!(lines[0], CartLine::new(id(1), 2));
        assert!(
            adjustments_for_change(
                &mut lines,
                StockChange {
                    product_id: id(9),
                    stock: 0
                }
            )
            .is_empty()
        );
        assert_eq!(lines.len(), 2);
    }

    #[tokio::test]
    async fn test_guest_cart_lives_in_session() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        assert!(guest_lines(&session).await.unwrap().is_empty());

        session
            .insert(session_keys::GUEST_CART, vec![CartLine::new(id(4), 2)])
            .await
            .unwrap();
        assert_eq!(
            guest_lines(&session).await.unwrap(),
            vec![CartLine::new(id(4), 2)]
        );
    }

    #[test]
    fn test_snapshot_lines() {
        let snapshot = CartSnapshot::default();
        assert!(snapshot.is_empty());
        assert!(snapshot.lines().is_empty());
    }

    async fn backend_with(
        products: Vec<serde_json::Value>,
        saved_cart: Vec<(i64, u32)>,
    ) -> FakeBackend {
        FakeBackend::start(BackendData {
            products,
            saved_cart,
            ..BackendData::default()
        })
        .await
    }

    #[tokio::test]
    async fn test_guest_add_checks_live_stock() {
        let fake = backend_with(vec![product(1, "Raw Honey", 1250, 3)], vec![]).await;
        let state = fake.state();
        let session = test_support::session();
        let cart = CartService::new(state.backend(), &session, None);

        assert_eq!(cart.add(id(1), 2).await.unwrap(), 2);
        assert!(matches!(
            cart.add(id(1), 2).await,
            Err(CartServiceError::Quantity(CartError::ExceedsStock { available: 1 }))
        ));
        assert!(matches!(
            cart.add(id(1), 0).await,
            Err(CartServiceError::Quantity(CartError::ZeroQuantity))
        ));
        assert!(matches!(
            cart.add(id(9), 1).await,
            Err(CartServiceError::Quantity(CartError::Unavailable))
        ));

        assert_eq!(guest_lines(&session).await.unwrap(), vec![CartLine::new(id(1), 2)]);
        assert_eq!(cart.count().await.unwrap(), 2);
        assert!(fake.data().saved_cart.is_empty());
    }

    #[tokio::test]
    async fn test_customer_set_quantity_writes_saved_cart() {
        let fake = backend_with(vec![product(1, "Raw Honey", 1250, 3)], vec![(1, 1)]).await;
        let state = fake.state();
        let session = test_support::session();
        let customer = test_support::customer();
        let cart = CartService::new(state.backend(), &session, Some(&customer));

        assert!(matches!(
            cart.set_quantity(id(1), 4).await,
            Err(CartServiceError::Quantity(CartError::ExceedsStock { available: 3 }))
        ));
        assert_eq!(fake.data().saved_cart, vec![(1, 1)]);

        cart.set_quantity(id(1), 3).await.unwrap();
        assert_eq!(fake.data().saved_cart, vec![(1, 3)]);
        assert_eq!(cart.count().await.unwrap(), 3);

        cart.set_quantity(id(1), 0).await.unwrap();
        assert!(fake.data().saved_cart.is_empty());
        assert_eq!(cart.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_snapshot_reconciles_and_writes_back_once() {
        let fake = backend_with(
            vec![product(1, "Raw Honey", 1250, 2), product(2, "Oat Flakes", 399, 0)],
            vec![],
        )
        .await;
        let state = fake.state();
        let session = test_support::session();
        session
            .insert(
                session_keys::GUEST_CART,
                vec![CartLine::new(id(1), 5), CartLine::new(id(2), 1)],
            )
            .await
            .unwrap();
        let cart = CartService::new(state.backend(), &session, None);

        let snapshot = cart.snapshot().await.unwrap();
        assert_eq!(snapshot.lines(), vec![CartLine::new(id(1), 2)]);
        assert_eq!(snapshot.item_count, 2);
        assert_eq!(snapshot.subtotal, Price::from_cents(2500));
        assert_eq!(snapshot.notices.len(), 2);
        assert!(
            snapshot
                .notices
                .contains(&"Only 2 of Raw Honey left in stock; your cart was updated.".to_string())
        );
        assert!(
            snapshot
                .notices
                .contains(&"Oat Flakes sold out and was removed from your cart.".to_string())
        );
        assert_eq!(guest_lines(&session).await.unwrap(), vec![CartLine::new(id(1), 2)]);

        let again = cart.snapshot().await.unwrap();
        assert!(again.notices.is_empty());
        assert_eq!(again.item_count, 2);
    }

    #[tokio::test]
    async fn test_merge_guest_cart_on_sign_in() {
        let fake = backend_with(
            vec![product(1, "Raw Honey", 1250, 2), product(2, "Oat Flakes", 399, 5)],
            vec![(1, 1)],
        )
        .await;
        let state = fake.state();
        let session = test_support::session();
        session
            .insert(
                session_keys::GUEST_CART,
                vec![CartLine::new(id(1), 2), CartLine::new(id(2), 1)],
            )
            .await
            .unwrap();
        let customer = test_support::customer();
        let cart = CartService::new(state.backend(), &session, Some(&customer));

        let notices = cart.merge_guest_cart().await.unwrap();
        assert_eq!(
            notices,
            vec!["Only 2 of Raw Honey left in stock; your cart was updated.".to_string()]
        );
        assert_eq!(fake.data().saved_cart, vec![(1, 2), (2, 1)]);
        assert!(guest_lines(&session).await.unwrap().is_empty());
        assert_eq!(cart.count().await.unwrap(), 3);

        // Nothing left to merge the second time.
        assert!(cart.merge_guest_cart().await.unwrap().is_empty());
        assert_eq!(fake.data().saved_cart, vec![(1, 2), (2, 1)]);
    }

    #[tokio::test]
    async fn test_merge_is_a_no_op_for_guests() {
        let fake = backend_with(vec![], vec![]).await;
        let state = fake.state();
        let session = test_support::session();
        session
            .insert(session_keys::GUEST_CART, vec![CartLine::new(id(1), 1)])
            .await
            .unwrap();

        let cart = CartService::new(state.backend(), &session, None);
        assert!(cart.merge_guest_cart().await.unwrap().is_empty());
        assert_eq!(guest_lines(&session).await.unwrap().len(), 1);
    }
}
