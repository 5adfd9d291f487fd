//! Object storage for product images.

use reqwest::header::CONTENT_TYPE;
use tracing::instrument;
use url::Url;

use crate::{BackendClient, Result};

/// Turn an uploaded file name into a safe object path segment.
#[must_use]
pub fn object_name(file_name: &str) -> String {
    let cleaned: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(['-', '.']);
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

impl BackendClient {
    /// Public URL of an object in a public bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the project URL cannot be joined.
    pub fn public_url(&self, bucket: &str, path: &str) -> Result<Url> {
        self.endpoint(&format!(
            "storage/v1/object/public/{bucket}/{}",
            path.trim_start_matches('/')
        ))
    }

    /// Upload (or replace) an object and return its public URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload is rejected.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<Url> {
        let path = path.trim_start_matches('/');
        let url = self.endpoint(&format!("storage/v1/object/{bucket}/{path}"))?;
        self.execute(
            self.http()
                .post(url)
                .bearer_auth(self.bearer(None))
                .header(CONTENT_TYPE, content_type)
                .header("x-upsert", "true")
                .body(bytes),
        )
        .await?;
        tracing::info!(bucket, path, "Uploaded object");
        self.public_url(bucket, path)
    }

    /// Delete objects from a bucket.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn remove(&self, bucket: &str, paths: &[String]) -> Result<()> {
        let url = self.endpoint(&format!("storage/v1/object/{bucket}"))?;
        self.execute(
            self.http()
                .delete(url)
                .bearer_auth(self.bearer(None))
                .json(&serde_json::json!({ "prefixes": paths })),
        )
        .await?;
        Ok(())
    }

    /// Object path inside `bucket` for a URL produced by [`Self::public_url`].
    #[must_use]
    pub fn object_path_from_url(&self, bucket: &str, url: &str) -> Option<String> {
        let prefix = self.public_url(bucket, "").ok()?;
        url.strip_prefix(prefix.as_str())
            .filter(|rest| !rest.is_empty())
            .map(ToString::to_string)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;
    use crate::BackendConfig;

    fn client() -> BackendClient {
        BackendClient::new(&BackendConfig {
            url: "https://project.example.co".to_string(),
            api_key: SecretString::from("service"),
        })
        .unwrap()
    }

    #[test]
    fn test_public_url() {
        let url = client().public_url("product-images", "12/honey.jpg").unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/storage/v1/object/public/product-images/12/honey.jpg"
        );
    }

    #[test]
    fn test_object_path_roundtrip() {
        let c = client();
        let url = c.public_url("product-images", "12/honey.jpg").unwrap();
        assert_eq!(
            c.object_path_from_url("product-images", url.as_str()).as_deref(),
            Some("12/honey.jpg")
        );
        assert_eq!(c.object_path_from_url("product-images", "https://cdn.other/x.jpg"), None);
    }

    #[test]
    fn test_object_name_sanitizes() {
        assert_eq!(object_name("C:\\Photos\\Raw Honey (1).JPG"), "raw-honey--1-.jpg");
        assert_eq!(object_name("../../etc/passwd"), "passwd");
        assert_eq!(object_name("..."), "upload");
    }
}
