//! Seed the catalog from a YAML file.
//!
//! Products are upserted by slug, so re-running a seed file updates prices
//! and stock instead of creating duplicates.
//!
//! # File Format
//!
//! ```yaml
//! products:
//!   - name: Cold-Pressed Olive Oil
//!     category: Pantry
//!     price: "12.50"
//!     stock: 40
//!     unit: 500 ml bottle
//!     featured: true
//! ```
//!
//! `slug` is optional and derived from the name when missing.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use verdant_backend::{BackendError, ProductDraft};
use verdant_core::{Price, Slug, SlugError};

use super::{BackendSetupError, service_client};

/// Errors that can occur while seeding.
#[derive(Debug, Error)]
pub enum SeedError {
    #[error(transparent)]
    Setup(#[from] BackendSetupError),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Could not read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid seed file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Product {index} ({name}): {reason}")]
    InvalidProduct {
        index: usize,
        name: String,
        reason: String,
    },

    #[error("{0} products failed to save")]
    Partial(usize),
}

/// Top level of a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedFile {
    pub products: Vec<SeedProduct>,
}

/// One product in a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedProduct {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub compare_at_price: Option<Price>,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default)]
    pub featured: bool,
}

const fn default_active() -> bool {
    true
}

impl SeedProduct {
    fn into_draft(self) -> Result<ProductDraft, SlugError> {
        let slug = match self.slug.as_deref() {
            Some(slug) => Slug::parse(slug)?,
            None => Slug::from_title(&self.name)?,
        };
        Ok(ProductDraft {
            name: self.name.trim().to_string(),
            slug: slug.as_str().to_string(),
            description: self.description,
            category: self.category,
            price: self.price,
            compare_at_price: self.compare_at_price,
            stock: self.stock,
            unit: self.unit,
            image_url: self.image_url,
            active: self.active,
            featured: self.featured,
        })
    }
}

/// Parse and validate a seed file's contents.
///
/// # Errors
///
/// Returns the first invalid product, or a YAML error.
pub fn parse(content: &str) -> Result<Vec<ProductDraft>, SeedError> {
    let file: SeedFile = serde_yaml::from_str(content)?;
    file.products
        .into_iter()
        .enumerate()
        .map(|(i, product)| {
            let index = i + 1;
            if product.name.trim().is_empty() {
                return Err(SeedError::InvalidProduct {
                    index,
                    name: String::new(),
                    reason: "name is required".to_string(),
                });
            }
            let name = product.name.clone();
            product
                .into_draft()
                .map_err(|e| SeedError::InvalidProduct {
                    index,
                    name,
                    reason: e.to_string(),
                })
        })
        .collect()
}

/// Upsert every product in `file_path`.
///
/// # Errors
///
/// Returns an error if the file is invalid, or if any product failed to save
/// (the others are still saved).
pub async fn products(file_path: &str) -> Result<(), SeedError> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(SeedError::FileNotFound(file_path.to_string()));
    }

    info!(path = %file_path, "Loading products from file");
    let content = tokio::fs::read_to_string(path).await?;
    let drafts = parse(&content)?;
    info!(products = drafts.len(), "Parsed seed file");

    let client = service_client()?;

    let mut failed: Vec<(String, BackendError)> = Vec::new();
    for draft in &drafts {
        match client.upsert_product(draft).await {
            Ok(product) => info!(id = %product.id, slug = %product.slug, "Saved"),
            Err(e) => failed.push((draft.slug.clone(), e)),
        }
    }

    info!("Seeding complete!");
    info!("  Products saved: {}", drafts.len() - failed.len());

    if failed.is_empty() {
        return Ok(());
    }
    error!("  Errors: {}", failed.len());
    for (slug, err) in &failed {
        error!("    - {slug}: {err}");
    }
    Err(SeedError::Partial(failed.len()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_derives_slugs_and_defaults() {
        let drafts = parse(
            r#"
products:
  - name: Cold-Pressed Olive Oil
    price: "12.50"
    stock: 40
  - name: Wildflower Honey
    slug: raw-honey
    price: 9
    active: false
"#,
        )
        .unwrap();

        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].slug, "cold-pressed-olive-oil");
        assert_eq!(drafts[0].price, Price::from_cents(1250));
        assert!(drafts[0].active);
        assert_eq!(drafts[1].slug, "raw-honey");
        assert_eq!(drafts[1].stock, 0);
        assert!(!drafts[1].active);
    }

    #[test]
    fn test_parse_reports_bad_product() {
        let err = parse(
            r#"
products:
  - name: Good
    price: 1
  - name: Bad Slug
    slug: Not A Slug
    price: 1
"#,
        )
        .unwrap_err();
        assert!(err.to_string().starts_with("Product 2 (Bad Slug)"));
    }

    #[test]
    fn test_parse_rejects_negative_price() {
        assert!(matches!(
            parse("products:\n  - name: Oops\n    price: \"-1\"\n"),
            Err(SeedError::Yaml(_))
        ));
    }

    #[test]
    fn test_bundled_seed_file_is_valid() {
        let content = include_str!("../../seed/products.yaml");
        let drafts = parse(content).unwrap();
        assert!(drafts.len() >= 10);
        assert!(drafts.iter().any(|d| d.featured));
    }
}
