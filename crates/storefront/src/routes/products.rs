//! Product route handlers.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::instrument;
use verdant_backend::{BackendError, ProductFilter, ProductSort};
use verdant_core::ProductId;

use crate::error::{AppError, Result};
use crate::filters;
use crate::middleware::OptionalAuth;
use crate::models::CurrentCustomer;
use crate::routes::layout::PageLayout;
use crate::routes::views::{Pagination, ProductView};
use crate::state::AppState;

/// Catalog query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogQuery {
    pub q: Option<String>,
    pub category: Option<String>,
    pub sort: Option<String>,
    pub page: Option<u32>,
}

impl CatalogQuery {
    fn filter(&self) -> ProductFilter {
        ProductFilter {
            search: self.q.clone().filter(|q| !q.trim().is_empty()),
            category: self.category.clone().filter(|c| !c.trim().is_empty()),
            sort: ProductSort::parse_or_default(self.sort.as_deref()),
            page: self.page.unwrap_or(1).max(1),
            ..ProductFilter::default()
        }
    }

    /// Query string without the page, for pagination links.
    fn base_query(&self, filter: &ProductFilter) -> String {
        let mut parts = Vec::new();
        if let Some(q) = &filter.search {
            parts.push(format!("q={}", urlencoding::encode(q)));
        }
        if let Some(category) = &filter.category {
            parts.push(format!("category={}", urlencoding::encode(category)));
        }
        if filter.sort != ProductSort::default() {
            parts.push(format!("sort={}", filter.sort.as_str()));
        }
        parts.join("&")
    }
}

/// A sort option for the dropdown.
#[derive(Debug, Clone)]
pub struct SortOption {
    pub value: &'static str,
    pub label: &'static str,
    pub selected: bool,
}

/// Product listing page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub layout: PageLayout,
    pub products: Vec<ProductView>,
    pub categories: Vec<String>,
    pub sort_options: Vec<SortOption>,
    pub search: String,
    pub category: String,
    pub pagination: Pagination,
}

/// Product detail page template.
#[derive(Template, WebTemplate)]
#[template(path = "products/show.html")]
pub struct ProductShowTemplate {
    pub layout: PageLayout,
    pub product: ProductView,
    pub related_products: Vec<ProductView>,
}

/// Quick view fragment template.
#[derive(Template, WebTemplate)]
#[template(path = "partials/quick_view.html")]
pub struct QuickViewTemplate {
    pub product: ProductView,
}

/// Wishlisted product IDs for the customer, or none for guests.
pub(crate) async fn wishlist_ids(
    state: &AppState,
    customer: Option<&CurrentCustomer>,
) -> Vec<ProductId> {
    let Some(customer) = customer else {
        return Vec::new();
    };
    state
        .backend()
        .wishlist_product_ids(customer.id, customer.token())
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load wishlist ids");
            Vec::new()
        })
}

fn not_found(err: BackendError, slug: &str) -> AppError {
    match err {
        BackendError::NotFound(_) => AppError::NotFound(format!("product {slug}")),
        other => AppError::Backend(other),
    }
}

/// Display the product listing page.
#[instrument(skip(state, layout, customer))]
pub async fn index(
    State(state): State<AppState>,
    layout: PageLayout,
    OptionalAuth(customer): OptionalAuth,
    Query(query): Query<CatalogQuery>,
) -> Result<impl IntoResponse> {
    let filter = query.filter();
    let (page, categories, wishlist) = tokio::join!(
        state.catalog().products(&filter),
        state.catalog().categories(),
        wishlist_ids(&state, customer.as_ref()),
    );
    let page = page?;
    let categories = categories.unwrap_or_default();

    let pagination = Pagination::from_page(&page, &query.base_query(&filter));
    let products = page
        .items
        .iter()
        .map(|p| ProductView::from(p).with_wishlist(&wishlist))
        .collect();

    Ok(ProductsIndexTemplate {
        layout,
        products,
        categories,
        sort_options: ProductSort::ALL
            .into_iter()
            .map(|sort| SortOption {
                value: sort.as_str(),
                label: sort.label(),
                selected: sort == filter.sort,
            })
            .collect(),
        search: filter.search.unwrap_or_default(),
        category: filter.category.unwrap_or_default(),
        pagination,
    })
}

/// Display the product detail page.
#[instrument(skip(state, layout, customer))]
pub async fn show(
    State(state): State<AppState>,
    layout: PageLayout,
    OptionalAuth(customer): OptionalAuth,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let product = state
        .catalog()
        .product(&slug)
        .await
        .map_err(|e| not_found(e, &slug))?;

    let (related, wishlist) = tokio::join!(
        state.catalog().related(&product),
        wishlist_ids(&state, customer.as_ref()),
    );
    let related = related.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load related products");
        Vec::new()
    });

    Ok(ProductShowTemplate {
        layout,
        product: ProductView::from(&product).with_wishlist(&wishlist),
        related_products: related.iter().map(ProductView::from).collect(),
    })
}

/// Quick view fragment (HTMX).
#[instrument(skip(state))]
pub async fn quick_view(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse> {
    let product = state
        .catalog()
        .product(&slug)
        .await
        .map_err(|e| not_found(e, &slug))?;

    Ok(QuickViewTemplate {
        product: ProductView::from(&product),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_query_to_filter() {
        let query = CatalogQuery {
            q: Some("  ".to_string()),
            category: Some("Honey".to_string()),
            sort: Some("price_desc".to_string()),
            page: Some(0),
        };
        let filter = query.filter();
        assert!(filter.search.is_none());
        assert_eq!(filter.category.as_deref(), Some("Honey"));
        assert_eq!(filter.sort, ProductSort::PriceDesc);
        assert_eq!(filter.page, 1);
        assert_eq!(query.base_query(&filter), "category=Honey&sort=price_desc");
    }

    #[test]
    fn test_base_query_encodes_search() {
        let query = CatalogQuery {
            q: Some("oat milk".to_string()),
            ..CatalogQuery::default()
        };
        let filter = query.filter();
        assert_eq!(query.base_query(&filter), "q=oat%20milk");
    }
}
