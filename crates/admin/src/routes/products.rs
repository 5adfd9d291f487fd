//! Product management route handlers.

#![allow(clippy::used_underscore_binding)]

use std::str::FromStr;

use askama::Template;
use axum::{
    Form,
    extract::{Multipart, Path, Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use rust_decimal::Decimal;
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;
use verdant_backend::{BackendError, Product, ProductDraft, ProductFilter, storage};
use verdant_core::{Price, ProductId, Slug};

use crate::{
    error::Result,
    filters,
    middleware::auth::RequireAdminAuth,
    models::Flash,
    state::AppState,
};

use super::{MAX_IMAGE_BYTES, dashboard::AdminUserView, non_blank, render};

const PER_PAGE: u32 = 25;

/// Image types accepted for product photos.
const IMAGE_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Listing query parameters.
#[derive(Debug, Deserialize)]
pub struct ProductsQuery {
    pub q: Option<String>,
    pub page: Option<u32>,
}

/// Product row for the listing.
#[derive(Debug, Clone)]
pub struct ProductView {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub category: String,
    pub price: String,
    pub stock: u32,
    pub low_stock: bool,
    pub active: bool,
    pub featured: bool,
    pub image_url: Option<String>,
}

impl ProductView {
    fn new(product: &Product, threshold: u32) -> Self {
        Self {
            id: product.id.as_i64(),
            name: product.name.clone(),
            slug: product.slug.clone(),
            category: product.category.clone().unwrap_or_default(),
            price: product.price.to_string(),
            stock: product.available(),
            low_stock: product.available() <= threshold,
            active: product.active,
            featured: product.featured,
            image_url: product.image_url.clone(),
        }
    }
}

/// Products list page template.
#[derive(Template)]
#[template(path = "products/index.html")]
pub struct ProductsIndexTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flashes: Vec<Flash>,
    pub products: Vec<ProductView>,
    pub search_query: String,
    pub total: u64,
    pub page: u32,
    pub prev_page: Option<u32>,
    pub next_page: Option<u32>,
}

/// Product form values, as typed. Shared by the new and edit pages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductFormInput {
    pub name: String,
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    pub price: String,
    #[serde(default)]
    pub compare_at_price: String,
    pub stock: String,
    #[serde(default)]
    pub unit: String,
    /// Checkbox; present when ticked.
    pub active: Option<String>,
    /// Checkbox; present when ticked.
    pub featured: Option<String>,
}

impl From<&Product> for ProductFormInput {
    fn from(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            slug: product.slug.clone(),
            description: product.description.clone().unwrap_or_default(),
            category: product.category.clone().unwrap_or_default(),
            price: product.price.amount().to_string(),
            compare_at_price: product
                .compare_at_price
                .map(|p| p.amount().to_string())
                .unwrap_or_default(),
            stock: product.available().to_string(),
            unit: product.unit.clone().unwrap_or_default(),
            active: product.active.then(|| "on".to_string()),
            featured: product.featured.then(|| "on".to_string()),
        }
    }
}

impl ProductFormInput {
    /// Validate into a draft. The image is managed separately.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> std::result::Result<ProductDraft, String> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err("Name is required".to_string());
        }

        let slug = if self.slug.trim().is_empty() {
            Slug::from_title(name).map_err(|e| format!("Slug: {e}"))?
        } else {
            Slug::parse(self.slug.trim()).map_err(|e| format!("Slug: {e}"))?
        };

        let price = parse_price(&self.price, "Price")?;
        let compare_at_price = match non_blank(Some(&self.compare_at_price)) {
            Some(value) => Some(parse_price(&value, "Compare-at price")?),
            None => None,
        };

        let stock = self
            .stock
            .trim()
            .parse::<i64>()
            .map_err(|_| "Stock must be a whole number".to_string())?;
        let stock = u32::try_from(stock).map_err(|_| "Stock must be zero or more".to_string())?;

        Ok(ProductDraft {
            name: name.to_string(),
            slug: slug.as_str().to_string(),
            description: non_blank(Some(&self.description)),
            category: non_blank(Some(&self.category)),
            price,
            compare_at_price,
            stock,
            unit: non_blank(Some(&self.unit)),
            image_url: None,
            active: self.active.is_some(),
            featured: self.featured.is_some(),
        })
    }
}

fn parse_price(value: &str, label: &str) -> std::result::Result<Price, String> {
    let amount = Decimal::from_str(value.trim().trim_start_matches('$'))
        .map_err(|_| format!("{label} must be a number"))?;
    Price::new(amount).map_err(|_| format!("{label} must be zero or more"))
}

/// New/edit product form template.
#[derive(Template)]
#[template(path = "products/form.html")]
pub struct ProductFormTemplate {
    pub admin_user: AdminUserView,
    pub current_path: String,
    pub flashes: Vec<Flash>,
    /// `None` when creating.
    pub product_id: Option<i64>,
    pub image_url: Option<String>,
    pub form: ProductFormInput,
    pub error: Option<String>,
}

impl ProductFormTemplate {
    fn action(&self) -> String {
        self.product_id
            .map_or_else(|| "/products".to_string(), |id| format!("/products/{id}"))
    }
}

fn conflict_message(err: &BackendError) -> Option<String> {
    matches!(err, BackendError::Conflict(_))
        .then(|| "Another product already uses that slug".to_string())
}

/// Products list page handler.
#[instrument(skip(admin, state, session))]
pub async fn index(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Query(query): Query<ProductsQuery>,
) -> Html<String> {
    let search_query = non_blank(query.q.as_deref()).unwrap_or_default();
    let filter = ProductFilter {
        search: Some(search_query.clone()).filter(|q| !q.is_empty()),
        page: query.page.unwrap_or(1).max(1),
        per_page: PER_PAGE,
        include_inactive: true,
        ..ProductFilter::default()
    };

    let threshold = state.config().low_stock_threshold;
    let (products, total, page, prev_page, next_page) =
        match state.backend().list_products(&filter).await {
            Ok(page) => (
                page.items
                    .iter()
                    .map(|p| ProductView::new(p, threshold))
                    .collect(),
                page.total,
                page.page,
                page.has_prev().then(|| page.page - 1),
                page.has_next().then(|| page.page + 1),
            ),
            Err(e) => {
                tracing::error!("Failed to fetch products: {e}");
                (vec![], 0, filter.page, None, None)
            }
        };

    let template = ProductsIndexTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/products".to_string(),
        flashes: Flash::take_all(&session).await,
        products,
        search_query,
        total,
        page,
        prev_page,
        next_page,
    };

    render(&template)
}

/// New product form handler.
#[instrument(skip(admin, session))]
pub async fn new_product(
    RequireAdminAuth(admin): RequireAdminAuth,
    session: Session,
) -> Html<String> {
    let template = ProductFormTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/products".to_string(),
        flashes: Flash::take_all(&session).await,
        product_id: None,
        image_url: None,
        form: ProductFormInput {
            active: Some("on".to_string()),
            stock: "0".to_string(),
            ..ProductFormInput::default()
        },
        error: None,
    };

    render(&template)
}

/// Create product handler.
#[instrument(skip(admin, state, session, input), fields(name = %input.name))]
pub async fn create(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Form(input): Form<ProductFormInput>,
) -> Result<Response> {
    let rerender = |error: String, form: ProductFormInput| {
        render(&ProductFormTemplate {
            admin_user: AdminUserView::from(&admin),
            current_path: "/products".to_string(),
            flashes: Vec::new(),
            product_id: None,
            image_url: None,
            form,
            error: Some(error),
        })
        .into_response()
    };

    let draft = match input.validate() {
        Ok(draft) => draft,
        Err(message) => return Ok(rerender(message, input)),
    };

    match state.backend().create_product(&draft).await {
        Ok(product) => {
            tracing::info!(product_id = %product.id, slug = %product.slug, "Product created");
            Flash::success(format!("Created {}", product.name))
                .push(&session)
                .await;
            Ok(Redirect::to(&format!("/products/{}/edit", product.id)).into_response())
        }
        Err(e) => match conflict_message(&e) {
            Some(message) => Ok(rerender(message, input)),
            None => Err(e.into()),
        },
    }
}

/// Edit product form handler.
#[instrument(skip(admin, state, session))]
pub async fn edit(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Html<String>> {
    let product = state.backend().product_by_id(ProductId::new(id)).await?;

    let template = ProductFormTemplate {
        admin_user: AdminUserView::from(&admin),
        current_path: "/products".to_string(),
        flashes: Flash::take_all(&session).await,
        product_id: Some(id),
        image_url: product.image_url.clone(),
        form: ProductFormInput::from(&product),
        error: None,
    };

    Ok(render(&template))
}

/// Update product handler.
#[instrument(skip(admin, state, session, input))]
pub async fn update(
    RequireAdminAuth(admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    Form(input): Form<ProductFormInput>,
) -> Result<Response> {
    let product_id = ProductId::new(id);
    let draft = match input.validate() {
        Ok(draft) => draft,
        Err(message) => {
            let existing = state.backend().product_by_id(product_id).await?;
            return Ok(render(&ProductFormTemplate {
                admin_user: AdminUserView::from(&admin),
                current_path: "/products".to_string(),
                flashes: Vec::new(),
                product_id: Some(id),
                image_url: existing.image_url,
                form: input,
                error: Some(message),
            })
            .into_response());
        }
    };

    match state.backend().update_product(product_id, &draft).await {
        Ok(product) => {
            tracing::info!(product_id = %product.id, "Product updated");
            Flash::success(format!("Saved {}", product.name))
                .push(&session)
                .await;
            Ok(Redirect::to("/products").into_response())
        }
        Err(e) => match conflict_message(&e) {
            Some(message) => {
                Flash::error(message).push(&session).await;
                Ok(Redirect::to(&format!("/products/{id}/edit")).into_response())
            }
            None => Err(e.into()),
        },
    }
}

/// Delete product handler.
///
/// Removes the product's stored image too when it lives in our bucket.
#[instrument(skip(_admin, state, session))]
pub async fn delete(
    RequireAdminAuth(_admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
) -> Result<Redirect> {
    let product_id = ProductId::new(id);
    let product = state.backend().product_by_id(product_id).await?;
    state.backend().delete_product(product_id).await?;

    if let Some(path) = product.image_url.as_deref().and_then(|url| {
        state
            .backend()
            .object_path_from_url(&state.config().image_bucket, url)
    }) && let Err(e) = state
        .backend()
        .remove(&state.config().image_bucket, &[path])
        .await
    {
        tracing::warn!(product_id = %product_id, error = %e, "Failed to remove product image");
    }

    tracing::info!(product_id = %product_id, "Product deleted");
    Flash::success(format!("Deleted {}", product.name))
        .push(&session)
        .await;
    Ok(Redirect::to("/products"))
}

/// An uploaded image, checked and ready to store.
#[derive(Debug)]
struct ImageUpload {
    file_name: String,
    content_type: String,
    bytes: Vec<u8>,
}

fn check_image(
    file_name: Option<&str>,
    content_type: Option<&str>,
    bytes: Vec<u8>,
) -> std::result::Result<ImageUpload, String> {
    if bytes.is_empty() {
        return Err("Choose an image to upload".to_string());
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(format!(
            "Images must be {} MB or smaller",
            MAX_IMAGE_BYTES / (1024 * 1024)
        ));
    }
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if !IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err("Upload a JPEG, PNG, WebP or GIF image".to_string());
    }
    Ok(ImageUpload {
        file_name: storage::object_name(file_name.unwrap_or("image")),
        content_type,
        bytes,
    })
}

async fn read_image(multipart: &mut Multipart) -> std::result::Result<ImageUpload, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Upload failed: {e}"))?
    {
        if field.name() != Some("image") {
            continue;
        }
        let file_name = field.file_name().map(String::from);
        let content_type = field.content_type().map(String::from);
        let bytes = field
            .bytes()
            .await
            .map_err(|e| format!("Upload failed: {e}"))?;
        return check_image(file_name.as_deref(), content_type.as_deref(), bytes.to_vec());
    }
    Err("Choose an image to upload".to_string())
}

/// Product image upload handler.
///
/// Stores the file under `{product_id}/{timestamp}-{name}` so browsers never
/// serve a stale cached copy, then points the product at it. The previous
/// image is removed afterwards.
#[instrument(skip(_admin, state, session, multipart))]
pub async fn upload_image(
    RequireAdminAuth(_admin): RequireAdminAuth,
    State(state): State<AppState>,
    session: Session,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Redirect> {
    let product_id = ProductId::new(id);
    let edit_url = format!("/products/{id}/edit");

    let upload = match read_image(&mut multipart).await {
        Ok(upload) => upload,
        Err(message) => {
            Flash::error(message).push(&session).await;
            return Ok(Redirect::to(&edit_url));
        }
    };

    let product = state.backend().product_by_id(product_id).await?;
    let bucket = state.config().image_bucket.as_str();
    let path = format!(
        "{product_id}/{}-{}",
        chrono::Utc::now().timestamp(),
        upload.file_name
    );

    let url = state
        .backend()
        .upload(bucket, &path, upload.bytes, &upload.content_type)
        .await?;
    state
        .backend()
        .set_product_image(product_id, url.as_str())
        .await?;

    if let Some(old) = product
        .image_url
        .as_deref()
        .and_then(|old| state.backend().object_path_from_url(bucket, old))
        .filter(|old| *old != path)
        && let Err(e) = state.backend().remove(bucket, &[old]).await
    {
        tracing::warn!(product_id = %product_id, error = %e, "Failed to remove previous image");
    }

    tracing::info!(product_id = %product_id, path = %path, "Product image uploaded");
    Flash::success("Image updated").push(&session).await;
    Ok(Redirect::to(&edit_url))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form() -> ProductFormInput {
        ProductFormInput {
            name: "Cold-Pressed Olive Oil".to_string(),
            price: "12.50".to_string(),
            stock: "40".to_string(),
            active: Some("on".to_string()),
            ..ProductFormInput::default()
        }
    }

    #[test]
    fn test_validate_derives_slug() {
        let draft = form().validate().unwrap();
        assert_eq!(draft.slug, "cold-pressed-olive-oil");
        assert_eq!(draft.price, Price::from_cents(1250));
        assert_eq!(draft.stock, 40);
        assert!(draft.active);
        assert!(!draft.featured);
        assert_eq!(draft.description, None);
    }

    #[test]
    fn test_validate_checks_given_slug() {
        let mut input = form();
        input.slug = "Olive Oil".to_string();
        assert!(input.validate().unwrap_err().starts_with("Slug"));

        input.slug = "olive-oil-1l".to_string();
        assert_eq!(input.validate().unwrap().slug, "olive-oil-1l");
    }

    #[test]
    fn test_validate_rejects_bad_numbers() {
        let mut input = form();
        input.name = "  ".to_string();
        assert_eq!(input.validate().unwrap_err(), "Name is required");

        let mut input = form();
        input.price = "-1".to_string();
        assert_eq!(input.validate().unwrap_err(), "Price must be zero or more");

        let mut input = form();
        input.price = "cheap".to_string();
        assert_eq!(input.validate().unwrap_err(), "Price must be a number");

        let mut input = form();
        input.stock = "-3".to_string();
        assert_eq!(input.validate().unwrap_err(), "Stock must be zero or more");

        let mut input = form();
        input.stock = "2.5".to_string();
        assert_eq!(input.validate().unwrap_err(), "Stock must be a whole number");
    }

    #[test]
    fn test_validate_accepts_zero_and_compare_at() {
        let mut input = form();
        input.price = "0".to_string();
        input.stock = "0".to_string();
        input.compare_at_price = "$15".to_string();
        let draft = input.validate().unwrap();
        assert!(draft.price.is_zero());
        assert_eq!(draft.compare_at_price, Some(Price::from_cents(1500)));
    }

    #[test]
    fn test_check_image() {
        assert!(check_image(Some("a.png"), Some("image/png"), vec![]).is_err());
        assert_eq!(
            check_image(Some("a.svg"), Some("image/svg+xml"), vec![1]).unwrap_err(),
            "Upload a JPEG, PNG, WebP or GIF image"
        );
        assert!(check_image(None, Some("image/png"), vec![0; MAX_IMAGE_BYTES + 1]).is_err());

        let upload = check_image(Some("My Photo.JPG"), Some("IMAGE/JPEG"), vec![1, 2]).unwrap();
        assert_eq!(upload.file_name, "my-photo.jpg");
        assert_eq!(upload.content_type, "image/jpeg");
    }

    #[test]
    fn test_form_action() {
        let template = ProductFormTemplate {
            admin_user: AdminUserView {
                name: "Ops".to_string(),
                email: "ops@verdant.test".to_string(),
            },
            current_path: "/products".to_string(),
            flashes: Vec::new(),
            product_id: Some(7),
            image_url: None,
            form: form(),
            error: None,
        };
        assert_eq!(template.action(), "/products/7");
    }
}
