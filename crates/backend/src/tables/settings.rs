//! `store_settings` table (a single row).

use tracing::instrument;
use verdant_core::Price;

use crate::rest::Query;
use crate::tables::products::first;
use crate::types::StoreSettings;
use crate::{BackendClient, Result};

const TABLE: &str = "store_settings";

impl BackendClient {
    /// Current store settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the row is missing.
    #[instrument(skip(self))]
    pub async fn store_settings(&self) -> Result<StoreSettings> {
        let query = Query::table(TABLE).select("*").eq("id", 1);
        self.select_one(&query, None).await
    }

    /// Update the shipping policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn update_shipping(&self, flat_fee: Price, free_over: Price) -> Result<StoreSettings> {
        let rows: Vec<StoreSettings> = self
            .update(
                &Query::table(TABLE).eq("id", 1),
                &serde_json::json!({
                    "shipping_flat_fee": flat_fee,
                    "free_shipping_threshold": free_over,
                    "updated_at": chrono::Utc::now(),
                }),
                None,
            )
            .await?;
        first(rows, TABLE)
    }
}
