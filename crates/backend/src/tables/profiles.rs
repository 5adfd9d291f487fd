//! `profiles` table.

use serde::Serialize;
use tracing::instrument;
use verdant_core::{Email, UserId, UserRole};

use crate::rest::Query;
use crate::tables::products::first;
use crate::types::{Profile, ProfileUpdate};
use crate::{BackendClient, Result};

const TABLE: &str = "profiles";

#[derive(Serialize)]
struct ProfileUpsert<'a> {
    id: UserId,
    #[serde(flatten)]
    update: &'a ProfileUpdate,
}

impl BackendClient {
    /// A user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::NotFound`] if the profile is missing.
    #[instrument(skip(self, token))]
    pub async fn profile(&self, user_id: UserId, token: Option<&str>) -> Result<Profile> {
        let query = Query::table(TABLE).select("*").eq("id", user_id);
        self.select_one(&query, token).await
    }

    /// Create or update the caller's own profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, update, token))]
    pub async fn upsert_profile(
        &self,
        user_id: UserId,
        update: &ProfileUpdate,
        token: Option<&str>,
    ) -> Result<Profile> {
        let rows: Vec<Profile> = self
            .upsert(
                TABLE,
                &ProfileUpsert {
                    id: user_id,
                    update,
                },
                "id",
                token,
            )
            .await?;
        first(rows, TABLE)
    }

    /// Find a profile by email (service key only).
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::NotFound`] if no profile has the email.
    #[instrument(skip(self))]
    pub async fn profile_by_email(&self, email: &Email) -> Result<Profile> {
        let query = Query::table(TABLE).select("*").eq("email", email);
        self.select_one(&query, None).await
    }

    /// Change a user's role (service key only).
    ///
    /// # Errors
    ///
    /// Returns [`crate::BackendError::NotFound`] if the profile is missing.
    #[instrument(skip(self))]
    pub async fn set_role(&self, user_id: UserId, role: UserRole) -> Result<Profile> {
        let rows: Vec<Profile> = self
            .update(
                &Query::table(TABLE).eq("id", user_id),
                &serde_json::json!({ "role": role }),
                None,
            )
            .await?;
        first(rows, TABLE)
    }
}
