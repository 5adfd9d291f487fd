//! `coupons` table.

use tracing::instrument;
use verdant_core::CouponId;
use verdant_core::pricing::normalize_code;

use crate::rest::Query;
use crate::tables::products::first;
use crate::types::{Coupon, NewCoupon};
use crate::{BackendClient, Result};

const TABLE: &str = "coupons";

impl BackendClient {
    /// Look up a coupon by code (case-insensitive).
    ///
    /// Goes through the `coupon_by_code` function; customers cannot read the
    /// table itself. Inactive coupons are returned so callers can say why a
    /// code does not apply.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::NotFound`] for unknown codes.
    #[instrument(skip(self, token))]
    pub async fn coupon_by_code(&self, code: &str, token: Option<&str>) -> Result<Coupon> {
        let args = serde_json::json!({ "p_code": normalize_code(code) });
        let rows: Vec<Coupon> = self.rpc("coupon_by_code", &args, token).await?;
        first(rows, TABLE)
    }

    /// Every coupon, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let query = Query::table(TABLE)
            .select("*")
            .order("created_at", false);
        self.select(&query, None).await
    }

    /// Create a coupon.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::Conflict`] if the code exists.
    #[instrument(skip(self, coupon), fields(code = %coupon.code))]
    pub async fn create_coupon(&self, coupon: &NewCoupon) -> Result<Coupon> {
        let rows: Vec<Coupon> = self.insert(TABLE, coupon, None).await?;
        first(rows, TABLE)
    }

    /// Enable or disable a coupon.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::NotFound`] if the coupon does not exist.
    #[instrument(skip(self))]
    pub async fn set_coupon_active(&self, id: CouponId, active: bool) -> Result<Coupon> {
        let rows: Vec<Coupon> = self
            .update(
                &Query::table(TABLE).eq("id", id),
                &serde_json::json!({ "active": active }),
                None,
            )
            .await?;
        first(rows, TABLE)
    }

    /// Delete a coupon. Past orders keep the code as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, id: CouponId) -> Result<()> {
        self.delete(&Query::table(TABLE).eq("id", id), None).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::routing::post;
    use axum::{Json, Router};
    use secrecy::SecretString;
    use serde_json::{Value, json};

    use crate::{BackendConfig, BackendError};

    use super::*;

    async fn serve(app: Router) -> BackendClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        BackendClient::new(&BackendConfig {
            url: format!("http://{addr}"),
            api_key: SecretString::from("anon-key"),
        })
        .unwrap()
    }

    fn coupon_row(code: &str, active: bool) -> Value {
        json!({
            "id": 7,
            "code": code,
            "kind": "percentage",
            "value": "10.00",
            "min_order": null,
            "max_uses": null,
            "used_count": 0,
            "expires_at": null,
            "active": active,
            "created_at": "2026-03-01T00:00:00Z"
        })
    }

    #[tokio::test]
    async fn test_coupon_by_code_calls_lookup_function() {
        let app = Router::new().route(
            "/rest/v1/rpc/coupon_by_code",
            post(|Json(args): Json<Value>| async move {
                match args["p_code"].as_str() {
                    Some("HARVEST10") => Json(json!([coupon_row("HARVEST10", false)])),
                    _ => Json(json!([])),
                }
            }),
        );
        let client = serve(app).await;

        let coupon = client
            .coupon_by_code("  harvest10 ", Some("user-jwt"))
            .await
            .unwrap();
        assert_eq!(coupon.code, "HARVEST10");
        assert!(!coupon.active);

        let missing = client.coupon_by_code("NOPE", Some("user-jwt")).await;
        assert!(matches!(missing, Err(BackendError::NotFound(_))));
    }
}
