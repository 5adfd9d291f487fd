//! `cart_items` table: saved carts of signed-in customers.

use tracing::instrument;
use verdant_core::cart::CartLine;
use verdant_core::{ProductId, UserId};

use crate::rest::Query;
use crate::types::{CartItemRow, NewCartItem};
use crate::{BackendClient, Result};

const TABLE: &str = "cart_items";

impl BackendClient {
    /// A customer's saved cart, oldest line first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn cart_items(&self, user_id: UserId, token: Option<&str>) -> Result<Vec<CartItemRow>> {
        let query = Query::table(TABLE)
            .select("*")
            .eq("user_id", user_id)
            .order("created_at", true);
        self.select(&query, token).await
    }

    /// Set the quantity of one product in the saved cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn upsert_cart_item(&self, item: NewCartItem, token: Option<&str>) -> Result<()> {
        let _: Vec<CartItemRow> = self
            .upsert(TABLE, &item, "user_id,product_id", token)
            .await?;
        Ok(())
    }

    /// Remove one product from the saved cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn remove_cart_item(
        &self,
        user_id: UserId,
        product_id: ProductId,
        token: Option<&str>,
    ) -> Result<()> {
        let query = Query::table(TABLE)
            .eq("user_id", user_id)
            .eq("product_id", product_id);
        self.delete(&query, token).await
    }

    /// Empty the saved cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn clear_cart(&self, user_id: UserId, token: Option<&str>) -> Result<()> {
        self.delete(&Query::table(TABLE).eq("user_id", user_id), token)
            .await
    }

    /// Replace the saved cart with `lines`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails. The cart may be left empty.
    #[instrument(skip(self, lines, token), fields(lines = lines.len()))]
    pub async fn replace_cart(
        &self,
        user_id: UserId,
        lines: &[CartLine],
        token: Option<&str>,
    ) -> Result<()> {
        self.clear_cart(user_id, token).await?;
        let rows: Vec<NewCartItem> = lines
            .iter()
            .filter(|line| line.quantity > 0)
            .map(|line| NewCartItem {
                user_id,
                product_id: line.product_id,
                quantity: line.quantity,
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        let _: Vec<CartItemRow> = self.insert(TABLE, &rows, token).await?;
        Ok(())
    }
}
