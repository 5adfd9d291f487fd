//! Cart merging and reconciliation against live stock.
//!
//! The storefront keeps a guest cart in the session and a signed-in cart in
//! the hosted `cart_items` table. Both are reconciled against the latest stock
//! levels before they are shown or checked out, so a customer never sees a
//! quantity the warehouse cannot fill. The backend re-checks stock when an
//! order is placed; everything here is the optimistic, client-side half.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// One product and quantity in a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CartLine {
    #[must_use]
    pub const fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Live availability of a product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock: u32,
    pub active: bool,
}

/// A stock update observed from the backend or produced by a local write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub stock: u32,
}

/// Why a line was dropped from the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovalReason {
    /// The product no longer exists.
    Unavailable,
    /// The product was unpublished.
    Inactive,
    /// Stock reached zero.
    OutOfStock,
}

/// A change made to a cart during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartAdjustment {
    Removed {
        product_id: ProductId,
        reason: RemovalReason,
    },
    Clamped {
        product_id: ProductId,
        from: u32,
        to: u32,
    },
}

impl CartAdjustment {
    /// The product this adjustment concerns.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        match self {
            Self::Removed { product_id, .. } | Self::Clamped { product_id, .. } => *product_id,
        }
    }
}

/// The outcome of reconciling a cart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Lines that remain, with quantities no greater than available stock.
    pub lines: Vec<CartLine>,
    /// What changed, in cart order.
    pub adjustments: Vec<CartAdjustment>,
}

impl Reconciliation {
    /// Whether reconciliation changed anything.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.adjustments.is_empty()
    }
}

/// Errors from optimistic quantity checks.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartError {
    /// Requested quantity is zero.
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    /// Requested quantity exceeds what is in stock.
    #[error("only {available} left in stock")]
    ExceedsStock {
        /// Units currently available.
        available: u32,
    },
    /// The product cannot be bought right now.
    #[error("this product is currently unavailable")]
    Unavailable,
}

/// Combine two carts, summing quantities of the same product.
///
/// Order follows first appearance across `local` then `remote`. Used when a
/// guest signs in and their session cart meets their saved cart.
#[must_use]
pub fn merge(local: &[CartLine], remote: &[CartLine]) -> Vec<CartLine> {
    let mut merged: Vec<CartLine> = Vec::with_capacity(local.len() + remote.len());
    let mut index: HashMap<ProductId, usize> = HashMap::new();

    for line in local.iter().chain(remote) {
        if let Some(&pos) = index.get(&line.product_id) {
            if let Some(existing) = merged.get_mut(pos) {
                existing.quantity = existing.quantity.saturating_add(line.quantity);
            }
        } else {
            index.insert(line.product_id, merged.len());
            merged.push(*line);
        }
    }

    merged
}

/// Bring cart lines in line with current stock.
///
/// - Missing, inactive or sold-out products are removed.
/// - Quantities above stock are clamped down to stock.
/// - Zero-quantity lines are dropped silently.
///
/// Reconciling an already reconciled cart yields no adjustments.
#[must_use]
pub fn reconcile(lines: &[CartLine], stock: &[StockLevel]) -> Reconciliation {
    let levels: HashMap<ProductId, &StockLevel> =
        stock.iter().map(|level| (level.product_id, level)).collect();

    let mut result = Reconciliation::default();
    for line in lines {
        if line.quantity == 0 {
            continue;
        }

        let Some(level) = levels.get(&line.product_id) else {
            result.adjustments.push(CartAdjustment::Removed {
                product_id: line.product_id,
                reason: RemovalReason::Unavailable,
            });
            continue;
        };

        match reconcile_line(*line, level.stock, level.active) {
            (Some(kept), adjustment) => {
                result.lines.push(kept);
                result.adjustments.extend(adjustment);
            }
            (None, adjustment) => result.adjustments.extend(adjustment),
        }
    }

    result
}

/// Apply a single stock update to a cart.
///
/// Only the affected line is touched; every other line is returned as-is.
#[must_use]
pub fn apply_stock_change(lines: &[CartLine], change: StockChange) -> Reconciliation {
    let mut result = Reconciliation::default();
    for line in lines {
        if line.product_id != change.product_id {
            result.lines.push(*line);
            continue;
        }
        let (kept, adjustment) = reconcile_line(*line, change.stock, true);
        result.lines.extend(kept);
        result.adjustments.extend(adjustment);
    }
    result
}

/// Optimistic check before adding to or updating a cart.
///
/// # Errors
///
/// Returns a [`CartError`] if the quantity is zero or exceeds `available`.
pub const fn check_quantity(requested: u32, available: u32) -> Result<u32, CartError> {
    if requested == 0 {
        return Err(CartError::ZeroQuantity);
    }
    if available == 0 {
        return Err(CartError::Unavailable);
    }
    if requested > available {
        return Err(CartError::ExceedsStock { available });
    }
    Ok(requested)
}

/// Total number of units across lines.
#[must_use]
pub fn item_count(lines: &[CartLine]) -> u32 {
    lines
        .iter()
        .fold(0u32, |acc, line| acc.saturating_add(line.quantity))
}

fn reconcile_line(
    line: CartLine,
    stock: u32,
    active: bool,
) -> (Option<CartLine>, Option<CartAdjustment>) {
    if !active {
        return (
            None,
            Some(CartAdjustment::Removed {
                product_id: line.product_id,
                reason: RemovalReason::Inactive,
            }),
        );
    }
    if stock == 0 {
        return (
            None,
            Some(CartAdjustment::Removed {
                product_id: line.product_id,
                reason: RemovalReason::OutOfStock,
            }),
        );
    }
    if line.quantity > stock {
        return (
            Some(CartLine::new(line.product_id, stock)),
            Some(CartAdjustment::Clamped {
                product_id: line.product_id,
                from: line.quantity,
                to: stock,
            }),
        );
    }
    (Some(line), None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(id: i64, qty: u32) -> CartLine {
        CartLine::new(ProductId::new(id), qty)
    }

    fn level(id: i64, stock: u32) -> StockLevel {
        StockLevel {
            product_id: ProductId::new(id),
            stock,
            active: true,
        }
    }

    #[test]
    fn test_merge_sums_duplicates_and_keeps_order() {
        let local = [line(2, 1), line(1, 2)];
        let remote = [line(1, 3), line(5, 1)];
        assert_eq!(merge(&local, &remote), vec![line(2, 1), line(1, 5), line(5, 1)]);
    }

    #[test]
    fn test_merge_with_empty_sides() {
        assert_eq!(merge(&[], &[line(1, 1)]), vec![line(1, 1)]);
        assert_eq!(merge(&[line(1, 1)], &[]), vec![line(1, 1)]);
        assert!(merge(&[], &[]).is_empty());
    }

    #[test]
    fn test_reconcile_clamps_and_removes() {
        let lines = [line(1, 5), line(2, 1), line(3, 2), line(4, 0)];
        let stock = [
            level(1, 3),
            level(2, 0),
            StockLevel {
                product_id: ProductId::new(4),
                stock: 10,
                active: true,
            },
        ];

        let result = reconcile(&lines, &stock);

        assert_eq!(result.lines, vec![line(1, 3)]);
        assert_eq!(
            result.adjustments,
            vec![
                CartAdjustment::Clamped {
                    product_id: ProductId::new(1),
                    from: 5,
                    to: 3
                },
                CartAdjustment::Removed {
                    product_id: ProductId::new(2),
                    reason: RemovalReason::OutOfStock
                },
                CartAdjustment::Removed {
                    product_id: ProductId::new(3),
                    reason: RemovalReason::Unavailable
                },
            ]
        );
    }

    #[test]
    fn test_reconcile_inactive_product() {
        let stock = [StockLevel {
            product_id: ProductId::new(9),
            stock: 50,
            active: false,
        }];
        let result = reconcile(&[line(9, 1)], &stock);
        assert!(result.lines.is_empty());
        assert_eq!(
            result.adjustments,
            vec![CartAdjustment::Removed {
                product_id: ProductId::new(9),
                reason: RemovalReason::Inactive
            }]
        );
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let stock = [level(1, 2), level(2, 8)];
        let first = reconcile(&[line(1, 4), line(2, 3)], &stock);
        let second = reconcile(&first.lines, &stock);
        assert!(second.is_clean());
        assert_eq!(first.lines, second.lines);
    }

    #[test]
    fn test_apply_stock_change_touches_one_line() {
        let lines = [line(1, 4), line(2, 4)];
        let result = apply_stock_change(
            &lines,
            StockChange {
                product_id: ProductId::new(2),
                stock: 1,
            },
        );
        assert_eq!(result.lines, vec![line(1, 4), line(2, 1)]);
        assert_eq!(result.adjustments.len(), 1);

        let sold_out = apply_stock_change(
            &lines,
            StockChange {
                product_id: ProductId::new(1),
                stock: 0,
            },
        );
        assert_eq!(sold_out.lines, vec![line(2, 4)]);
    }

    #[test]
    fn test_check_quantity() {
        assert_eq!(check_quantity(2, 5), Ok(2));
        assert_eq!(check_quantity(5, 5), Ok(5));
        assert_eq!(check_quantity(0, 5), Err(CartError::ZeroQuantity));
        assert_eq!(check_quantity(1, 0), Err(CartError::Unavailable));
        assert_eq!(
            check_quantity(6, 5),
            Err(CartError::ExceedsStock { available: 5 })
        );
    }

    #[test]
    fn test_item_count() {
        assert_eq!(item_count(&[line(1, 2), line(2, 3)]), 5);
        assert_eq!(item_count(&[]), 0);
    }
}
