//! Home page route handler.

use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use tracing::instrument;

use crate::filters;
use crate::routes::layout::PageLayout;
use crate::routes::views::ProductView;
use crate::state::AppState;

/// Featured products shown on the home page.
const FEATURED_COUNT: u32 = 8;

/// Home page template.
#[derive(Template, WebTemplate)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub layout: PageLayout,
    pub featured: Vec<ProductView>,
    pub categories: Vec<String>,
    pub free_shipping_over: String,
}

/// Display the home page.
///
/// Catalog failures degrade to empty sections rather than an error page.
#[instrument(skip(state, layout))]
pub async fn home(State(state): State<AppState>, layout: PageLayout) -> impl IntoResponse {
    let catalog = state.catalog();
    let (featured, categories, settings) = tokio::join!(
        catalog.featured(FEATURED_COUNT),
        catalog.categories(),
        catalog.settings(),
    );

    let featured = featured.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load featured products");
        Vec::new()
    });
    let categories = categories.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load categories");
        Vec::new()
    });
    let settings = settings.unwrap_or_default();

    HomeTemplate {
        layout,
        featured: featured.iter().map(ProductView::from).collect(),
        categories,
        free_shipping_over: settings.free_shipping_threshold.to_string(),
    }
}
