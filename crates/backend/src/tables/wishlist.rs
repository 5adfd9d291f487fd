//! `wishlist_items` table.

use serde::Serialize;
use tracing::instrument;
use verdant_core::{ProductId, UserId};

use crate::rest::Query;
use crate::types::WishlistRow;
use crate::{BackendClient, Result};

const TABLE: &str = "wishlist_items";

#[derive(Serialize)]
struct NewWishlistItem {
    user_id: UserId,
    product_id: ProductId,
}

impl BackendClient {
    /// A customer's wishlist with products embedded, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn wishlist(&self, user_id: UserId, token: Option<&str>) -> Result<Vec<WishlistRow>> {
        let query = Query::table(TABLE)
            .select("*,product:products(*)")
            .eq("user_id", user_id)
            .order("created_at", false);
        self.select(&query, token).await
    }

    /// IDs of wishlisted products, for marking hearts on listings.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn wishlist_product_ids(
        &self,
        user_id: UserId,
        token: Option<&str>,
    ) -> Result<Vec<ProductId>> {
        #[derive(serde::Deserialize)]
        struct Row {
            product_id: ProductId,
        }

        let query = Query::table(TABLE)
            .select("product_id")
            .eq("user_id", user_id);
        let rows: Vec<Row> = self.select(&query, token).await?;
        Ok(rows.into_iter().map(|r| r.product_id).collect())
    }

    /// Add a product. Adding twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn add_to_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
        token: Option<&str>,
    ) -> Result<()> {
        let _: Vec<serde_json::Value> = self
            .upsert(
                TABLE,
                &NewWishlistItem {
                    user_id,
                    product_id,
                },
                "user_id,product_id",
                token,
            )
            .await?;
        Ok(())
    }

    /// Remove a product.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token))]
    pub async fn remove_from_wishlist(
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
}
