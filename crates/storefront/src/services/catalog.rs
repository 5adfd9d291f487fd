//! Cached read access to the catalog.
//!
//! Products, listings and categories are cached using `moka` (5-minute TTL).
//! Searches are never cached. When the stock watcher sees a product's stock
//! move, every entry that could show that product is dropped.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::{debug, instrument};
use verdant_backend::{BackendClient, Page, Product, ProductFilter, StoreSettings};
use verdant_core::ProductId;

/// How many products the assistant sees in its catalog summary.
pub const SUMMARY_LIMIT: u32 = 50;
const RELATED_LIMIT: u32 = 4;

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Products(Page<Product>),
    List(Vec<Product>),
    Categories(Vec<String>),
    Settings(StoreSettings),
}

impl CacheValue {
    fn mentions(&self, id: ProductId) -> bool {
        match self {
            Self::Product(product) => product.id == id,
            Self::Products(page) => page.items.iter().any(|p| p.id == id),
            Self::List(products) => products.iter().any(|p| p.id == id),
            Self::Categories(_) | Self::Settings(_) => false,
        }
    }
}

/// Catalog reads with a shared cache.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    backend: BackendClient,
    cache: Cache<String, CacheValue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(backend: BackendClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .support_invalidation_closures()
            .build();

        Self {
            inner: Arc::new(CatalogInner { backend, cache }),
        }
    }

    /// A page of active products.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    #[instrument(skip(self))]
    pub async fn products(&self, filter: &ProductFilter) -> verdant_backend::Result<Page<Product>> {
        let searching = filter
            .search
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        let cache_key = listing_key(filter);

        if !searching
            && let Some(CacheValue::Products(page)) = self.inner.cache.get(&cache_key).await
        {
            debug!("Cache hit for products");
            return Ok(page);
        }

        let page = self.inner.backend.list_products(filter).await?;

        if !searching {
            self.inner
                .cache
                .insert(cache_key, CacheValue::Products(page.clone()))
                .await;
        }
        Ok(page)
    }

    /// Featured products for the home page.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn featured(&self, limit: u32) -> verdant_backend::Result<Vec<Product>> {
        let filter = ProductFilter {
            featured_only: true,
            per_page: limit,
            ..ProductFilter::default()
        };
        Ok(self.products(&filter).await?.items)
    }

    /// An active product by slug.
    ///
    /// # Errors
    ///
    /// Returns [`verdant_backend::BackendError::NotFound`] for unknown or
    /// unpublished products.
    #[instrument(skip(self))]
    pub async fn product(&self, slug: &str) -> verdant_backend::Result<Product> {
        let cache_key = format!("product:{slug}");

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product = self.inner.backend.product_by_slug(slug).await?;
        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }

    /// Products from the same category, for the detail page.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn related(&self, product: &Product) -> verdant_backend::Result<Vec<Product>> {
        let cache_key = format!("related:{}", product.id);
        if let Some(CacheValue::List(products)) = self.inner.cache.get(&cache_key).await {
            return Ok(products);
        }

        let products = self
            .inner
            .backend
            .related_products(product, RELATED_LIMIT)
            .await?;
        self.inner
            .cache
            .insert(cache_key, CacheValue::List(products.clone()))
            .await;
        Ok(products)
    }

    /// Active products for the assistant's catalog summary.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn summary_products(&self) -> verdant_backend::Result<Vec<Product>> {
        let filter = ProductFilter {
            per_page: SUMMARY_LIMIT,
            sort: verdant_backend::ProductSort::Name,
            ..ProductFilter::default()
        };
        Ok(self.products(&filter).await?.items)
    }

    /// Distinct categories of active products.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn categories(&self) -> verdant_backend::Result<Vec<String>> {
        if let Some(CacheValue::Categories(categories)) = self.inner.cache.get("categories").await {
            return Ok(categories);
        }

        let categories = self.inner.backend.categories().await?;
        self.inner
            .cache
            .insert(
                "categories".to_string(),
                CacheValue::Categories(categories.clone()),
            )
            .await;
        Ok(categories)
    }

    /// Shipping settings. Falls back to the defaults if the row is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend request fails.
    pub async fn settings(&self) -> verdant_backend::Result<StoreSettings> {
        if let Some(CacheValue::Settings(settings)) = self.inner.cache.get("settings").await {
            return Ok(settings);
        }

        let settings = match self.inner.backend.store_settings().await {
            Ok(settings) => settings,
            Err(verdant_backend::BackendError::NotFound(_)) => {
                tracing::warn!("store_settings row missing, using defaults");
                StoreSettings::default()
            }
            Err(e) => return Err(e),
        };
        self.inner
            .cache
            .insert("settings".to_string(), CacheValue::Settings(settings))
            .await;
        Ok(settings)
    }

    // =========================================================================
    // Cache Management
    // =========================================================================

    /// Drop every cached entry that shows `product_id`, plus all listings
    /// (a product coming back into stock can appear on any page).
    pub fn invalidate_product(&self, product_id: ProductId) {
        let result = self.inner.cache.invalidate_entries_if(move |key, value| {
            key.starts_with("products:") || value.mentions(product_id)
        });
        if let Err(e) = result {
            tracing::warn!(error = %e, "Falling back to full catalog cache flush");
            self.inner.cache.invalidate_all();
        }
    }

    /// Invalidate all cached data.
    pub async fn invalidate_all(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}

/// Cache key for a listing; search terms never reach the cache.
fn listing_key(filter: &ProductFilter) -> String {
    format!(
        "products:{}:{}:{}:{}:{}:{}",
        filter.category.as_deref().unwrap_or(""),
        filter.sort.as_str(),
        filter.page,
        filter.per_page,
        u8::from(filter.in_stock_only),
        u8::from(filter.featured_only),
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use verdant_core::Price;

    use super::*;

    fn product(id: i64) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            slug: format!("product-{id}"),
            description: None,
            category: Some("Pantry".into()),
            price: Price::from_cents(499),
            compare_at_price: None,
            stock: 3,
            unit: None,
            image_url: None,
            active: true,
            featured: false,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_listing_key_ignores_search() {
        let plain = ProductFilter::default();
        let searching = ProductFilter {
            search: Some("honey".into()),
            ..ProductFilter::default()
        };
        assert_eq!(listing_key(&plain), listing_key(&searching));
        assert!(listing_key(&plain).starts_with("products:"));
    }

    #[test]
    fn test_listing_key_distinguishes_pages() {
        let first = ProductFilter::default();
        let second = ProductFilter {
            page: 2,
            ..ProductFilter::default()
        };
        assert_ne!(listing_key(&first), listing_key(&second));
    }

    #[test]
    fn test_cache_value_mentions() {
        let id = ProductId::new(7);
        assert!(CacheValue::Product(Box::new(product(7))).mentions(id));
        assert!(!CacheValue::Product(Box::new(product(8))).mentions(id));
        assert!(CacheValue::List(vec![product(1), product(7)]).mentions(id));
        assert!(!CacheValue::Categories(vec!["Pantry".into()]).mentions(id));
    }
}
