//! `products` table.

use serde::{Deserialize, Serialize};
use tracing::instrument;
use verdant_core::ProductId;
use verdant_core::cart::StockLevel;

use crate::rest::{Page, Query, sanitize_search};
use crate::types::{Product, ProductDraft, StockRow};
use crate::{BackendClient, BackendError, Result};

const TABLE: &str = "products";

/// Catalog sort order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
}

impl ProductSort {
    pub const ALL: [Self; 4] = [Self::Newest, Self::PriceAsc, Self::PriceDesc, Self::Name];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Newest => "newest",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::Name => "name",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Newest => "Newest",
            Self::PriceAsc => "Price: low to high",
            Self::PriceDesc => "Price: high to low",
            Self::Name => "Name",
        }
    }

    /// Parse a query-string value, falling back to the default.
    #[must_use]
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|v| Self::ALL.into_iter().find(|s| s.as_str() == v))
            .unwrap_or_default()
    }

    const fn order(self) -> (&'static str, bool) {
        match self {
            Self::Newest => ("created_at", false),
            Self::PriceAsc => ("price", true),
            Self::PriceDesc => ("price", false),
            Self::Name => ("name", true),
        }
    }
}

/// What to list from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category: Option<String>,
    pub sort: ProductSort,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
    /// Admin listings include unpublished products.
    pub include_inactive: bool,
    pub in_stock_only: bool,
    pub featured_only: bool,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            search: None,
            category: None,
            sort: ProductSort::default(),
            page: 1,
            per_page: 12,
            include_inactive: false,
            in_stock_only: false,
            featured_only: false,
        }
    }
}

impl ProductFilter {
    fn query(&self) -> Query {
        let mut query = Query::table(TABLE).select("*");
        if !self.include_inactive {
            query = query.eq("active", true);
        }
        if self.in_stock_only {
            query = query.gt("stock", 0);
        }
        if self.featured_only {
            query = query.eq("featured", true);
        }
        if let Some(category) = self.category.as_deref().filter(|c| !c.trim().is_empty()) {
            query = query.eq("category", category.trim());
        }
        if let Some(term) = self.search.as_deref().map(sanitize_search)
            && !term.is_empty()
        {
            query = query.or(&format!(
                "name.ilike.*{term}*,description.ilike.*{term}*,category.ilike.*{term}*"
            ));
        }
        let (column, ascending) = self.sort.order();
        query.order(column, ascending).order("id", true)
    }
}

impl BackendClient {
    /// One page of the catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>> {
        self.select_page(&filter.query(), filter.page, filter.per_page, None)
            .await
    }

    /// A product by its URL slug. Inactive products are not returned.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if no active product has the slug.
    #[instrument(skip(self))]
    pub async fn product_by_slug(&self, slug: &str) -> Result<Product> {
        let query = Query::table(TABLE)
            .select("*")
            .eq("slug", slug)
            .eq("active", true);
        self.select_one(&query, None).await
    }

    /// A product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the product does not exist.
    #[instrument(skip(self))]
    pub async fn product_by_id(&self, id: ProductId) -> Result<Product> {
        self.select_one(&Query::table(TABLE).select("*").eq("id", id), None)
            .await
    }

    /// Products for a set of IDs, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::table(TABLE).select("*").in_("id", ids);
        self.select(&query, None).await
    }

    /// Other in-stock products from the same category.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn related_products(&self, product: &Product, limit: u32) -> Result<Vec<Product>> {
        let mut query = Query::table(TABLE)
            .select("*")
            .eq("active", true)
            .gt("stock", 0)
            .neq("id", product.id);
        if let Some(category) = &product.category {
            query = query.eq("category", category);
        }
        self.select(&query.order("featured", false).limit(limit), None)
            .await
    }

    /// Live stock for `ids`, or for every product when `ids` is `None`.
    ///
    /// Products that no longer exist are simply absent from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, ids))]
    pub async fn stock_levels(&self, ids: Option<&[ProductId]>) -> Result<Vec<StockLevel>> {
        let mut query = Query::table(TABLE).select("id,stock,active");
        if let Some(ids) = ids {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            query = query.in_("id", ids);
        }
        let rows: Vec<StockRow> = self.select(&query, None).await?;
        Ok(rows.into_iter().map(StockLevel::from).collect())
    }

    /// Distinct categories of active products, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn categories(&self) -> Result<Vec<String>> {
        #[derive(Deserialize)]
        struct Row {
            category: Option<String>,
        }

        let query = Query::table(TABLE)
            .select("category")
            .eq("active", true)
            .order("category", true);
        let rows: Vec<Row> = self.select(&query, None).await?;
        let mut categories: Vec<String> = rows
            .into_iter()
            .filter_map(|r| r.category)
            .filter(|c| !c.trim().is_empty())
            .collect();
        categories.dedup();
        Ok(categories)
    }

    /// Active products at or below `threshold` units, lowest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn low_stock(&self, threshold: u32) -> Result<Vec<Product>> {
        let query = Query::table(TABLE)
            .select("*")
            .eq("active", true)
            .lte("stock", threshold)
            .order("stock", true)
            .limit(50);
        self.select(&query, None).await
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Conflict`] if the slug is taken.
    #[instrument(skip(self, draft), fields(slug = %draft.slug))]
    pub async fn create_product(&self, draft: &ProductDraft) -> Result<Product> {
        let rows: Vec<Product> = self.insert(TABLE, draft, None).await?;
        first(rows, TABLE)
    }

    /// Create or update a product by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, draft), fields(slug = %draft.slug))]
    pub async fn upsert_product(&self, draft: &ProductDraft) -> Result<Product> {
        let rows: Vec<Product> = self.upsert(TABLE, draft, "slug", None).await?;
        first(rows, TABLE)
    }

    /// Replace a product's editable fields.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the product does not exist.
    #[instrument(skip(self, draft))]
    pub async fn update_product(&self, id: ProductId, draft: &ProductDraft) -> Result<Product> {
        let rows: Vec<Product> = self
            .update(&Query::table(TABLE).eq("id", id), draft, None)
            .await?;
        first(rows, TABLE)
    }

    /// Point a product at a new image.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the product does not exist.
    #[instrument(skip(self))]
    pub async fn set_product_image(&self, id: ProductId, image_url: &str) -> Result<Product> {
        let rows: Vec<Product> = self
            .update(
                &Query::table(TABLE).eq("id", id),
                &serde_json::json!({ "image_url": image_url }),
                None,
            )
            .await?;
        first(rows, TABLE)
    }

    /// Delete a product. Order lines keep their copied name and price.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: ProductId) -> Result<()> {
        self.delete(&Query::table(TABLE).eq("id", id), None).await
    }
}

pub(crate) fn first<T>(rows: Vec<T>, table: &str) -> Result<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| BackendError::NotFound(table.to_string()))
}
