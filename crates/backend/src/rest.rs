//! PostgREST-style data API: query building and the generic table calls.
//!
//! Filters are encoded the way the REST API expects them
//! (`?stock=gt.0&order=created_at.desc`). Every call takes an optional bearer
//! token so row-level security sees the signed-in customer; without one the
//! client's API key is used.

use std::fmt::Display;

use reqwest::header::{CONTENT_RANGE, RETRY_AFTER};
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use crate::error::classify;
use crate::{BackendClient, BackendError, Result};

/// A query against one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    table: String,
    params: Vec<(String, String)>,
}

impl Query {
    /// Start a query on `table`.
    #[must_use]
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            params: Vec::new(),
        }
    }

    /// The table this query targets.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Columns (and embedded resources) to return.
    #[must_use]
    pub fn select(self, columns: &str) -> Self {
        self.param("select", columns.to_string())
    }

    #[must_use]
    pub fn eq(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("eq.{value}"))
    }

    #[must_use]
    pub fn neq(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("neq.{value}"))
    }

    #[must_use]
    pub fn gt(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("gt.{value}"))
    }

    #[must_use]
    pub fn gte(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("gte.{value}"))
    }

    #[must_use]
    pub fn lte(self, column: &str, value: impl Display) -> Self {
        self.param(column, format!("lte.{value}"))
    }

    /// Case-insensitive pattern match. `*` is the wildcard.
    #[must_use]
    pub fn ilike(self, column: &str, pattern: &str) -> Self {
        self.param(column, format!("ilike.{pattern}"))
    }

    /// Column value is one of `values`.
    #[must_use]
    pub fn in_<I, V>(self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Display,
    {
        let list = values
            .into_iter()
            .map(|v| quote_list_value(&v.to_string()))
            .collect::<Vec<_>>()
            .join(",");
        self.param(column, format!("in.({list})"))
    }

    /// Raw disjunction, e.g. `name.ilike.*honey*,category.ilike.*honey*`.
    #[must_use]
    pub fn or(self, conditions: &str) -> Self {
        self.param("or", format!("({conditions})"))
    }

    #[must_use]
    pub fn order(self, column: &str, ascending: bool) -> Self {
        let dir = if ascending { "asc" } else { "desc" };
        self.param("order", format!("{column}.{dir}"))
    }

    #[must_use]
    pub fn limit(self, limit: u32) -> Self {
        self.param("limit", limit.to_string())
    }

    #[must_use]
    pub fn offset(self, offset: u32) -> Self {
        self.param("offset", offset.to_string())
    }

    /// Inclusive row range, as `offset`/`limit`.
    #[must_use]
    pub fn range(self, from: u32, to: u32) -> Self {
        let count = to.saturating_sub(from).saturating_add(1);
        self.offset(from).limit(count)
    }

    fn param(mut self, key: &str, value: String) -> Self {
        self.params.push((key.to_string(), value));
        self
    }

    /// Build the full request URL for this query.
    fn url(&self, client: &BackendClient) -> Result<Url> {
        let mut url = client.endpoint(&format!("rest/v1/{}", self.table))?;
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Strip characters that carry meaning inside `or=(...)` and `ilike` patterns.
#[must_use]
pub fn sanitize_search(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, ',' | '(' | ')' | '*' | '"' | '\\' | ':'))
        .collect::<String>()
        .trim()
        .to_string()
}

fn quote_list_value(value: &str) -> String {
    if value.contains([',', '(', ')', '"', ' ']) {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// One page of results with the total row count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Number of pages needed for `total` rows.
    #[must_use]
    pub fn total_pages(&self) -> u32 {
        if self.per_page == 0 {
            return 0;
        }
        let pages = self.total.div_ceil(u64::from(self.per_page));
        u32::try_from(pages).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }

    #[must_use]
    pub const fn has_prev(&self) -> bool {
        self.page > 1
    }

    /// Transform the items, keeping the paging info.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            per_page: self.per_page,
        }
    }
}

/// Parse the total from a `Content-Range` header (`0-24/137`, `*/0`).
#[must_use]
pub fn parse_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

impl BackendClient {
    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        self.http()
            .request(method, url)
            .bearer_auth(self.bearer(token))
    }

    /// Send a request and turn non-success statuses into errors.
    pub(crate) async fn execute(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        let body = response.text().await.unwrap_or_default();
        let err = classify(status, retry_after, &body);
        tracing::debug!(status = %status, error = %err, "Backend request failed");
        Err(err)
    }

    async fn json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = self.execute(request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Fetch all rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or rows cannot be decoded.
    #[instrument(skip(self, token), fields(table = %query.table))]
    pub async fn select<T: DeserializeOwned>(
        &self,
        query: &Query,
        token: Option<&str>,
    ) -> Result<Vec<T>> {
        let url = query.url(self)?;
        self.json(self.request(Method::GET, url, token)).await
    }

    /// Fetch exactly one row.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] when no row matches.
    pub async fn select_one<T: DeserializeOwned>(
        &self,
        query: &Query,
        token: Option<&str>,
    ) -> Result<T> {
        let rows: Vec<T> = self.select(&query.clone().limit(1), token).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound(query.table.clone()))
    }

    /// Fetch one page of rows along with the exact total.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or rows cannot be decoded.
    #[instrument(skip(self, token), fields(table = %query.table))]
    pub async fn select_page<T: DeserializeOwned>(
        &self,
        query: &Query,
        page: u32,
        per_page: u32,
        token: Option<&str>,
    ) -> Result<Page<T>> {
        let page = page.max(1);
        let from = (page - 1).saturating_mul(per_page);
        let url = query.clone().range(from, from + per_page.saturating_sub(1)).url(self)?;

        let response = self
            .execute(
                self.request(Method::GET, url, token)
                    .header("Prefer", "count=exact"),
            )
            .await?;
        let total = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let bytes = response.bytes().await?;
        let items: Vec<T> = serde_json::from_slice(&bytes)?;

        Ok(Page {
            total: total.unwrap_or(items.len() as u64),
            items,
            page,
            per_page,
        })
    }

    /// Count rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token), fields(table = %query.table))]
    pub async fn count(&self, query: &Query, token: Option<&str>) -> Result<u64> {
        let url = query.url(self)?;
        let response = self
            .execute(
                self.request(Method::HEAD, url, token)
                    .header("Prefer", "count=exact"),
            )
            .await?;
        Ok(response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range)
            .unwrap_or(0))
    }

    /// Insert rows and return them as stored.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Conflict`] on unique violations.
    #[instrument(skip(self, body, token))]
    pub async fn insert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        token: Option<&str>,
    ) -> Result<Vec<T>> {
        let url = Query::table(table).url(self)?;
        self.json(
            self.request(Method::POST, url, token)
                .header("Prefer", "return=representation")
                .json(body),
        )
        .await
    }

    /// Insert rows, merging into existing ones on `on_conflict`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, body, token))]
    pub async fn upsert<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        table: &str,
        body: &B,
        on_conflict: &str,
        token: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut url = Query::table(table).url(self)?;
        url.query_pairs_mut().append_pair("on_conflict", on_conflict);
        self.json(
            self.request(Method::POST, url, token)
                .header("Prefer", "resolution=merge-duplicates,return=representation")
                .json(body),
        )
        .await
    }

    /// Patch rows matching `query` and return them.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, body, token), fields(table = %query.table))]
    pub async fn update<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        query: &Query,
        body: &B,
        token: Option<&str>,
    ) -> Result<Vec<T>> {
        let url = query.url(self)?;
        self.json(
            self.request(Method::PATCH, url, token)
                .header("Prefer", "return=representation")
                .json(body),
        )
        .await
    }

    /// Delete rows matching `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self, token), fields(table = %query.table))]
    pub async fn delete(&self, query: &Query, token: Option<&str>) -> Result<()> {
        let url = query.url(self)?;
        self.execute(self.request(Method::DELETE, url, token)).await?;
        Ok(())
    }

    /// Call a database function.
    ///
    /// # Errors
    ///
    /// Errors raised inside the function surface as [`BackendError::Api`]
    /// with code `P0001`; see [`BackendError::raised_message`].
    #[instrument(skip(self, args, token))]
    pub async fn rpc<A: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        function: &str,
        args: &A,
        token: Option<&str>,
    ) -> Result<T> {
        let url = self.endpoint(&format!("rest/v1/rpc/{function}"))?;
        self.json(self.request(Method::POST, url, token).json(args))
            .await
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
            api_key: SecretString::from("anon"),
        })
        .unwrap()
    }

    #[test]
    fn test_query_url_encoding() {
        let query = Query::table("products")
            .select("*")
            .eq("active", true)
            .gt("stock", 0)
            .order("created_at", false)
            .limit(12);
        let url = query.url(&client()).unwrap();
        assert_eq!(
            url.as_str(),
            "https://project.example.co/rest/v1/products?select=*&active=eq.true&stock=gt.0&order=created_at.desc&limit=12"
        );
    }

    #[test]
    fn test_in_filter_quotes_when_needed() {
        let query = Query::table("products").in_("id", [1, 2, 3]);
        assert_eq!(query.params[0].1, "in.(1,2,3)");

        let query = Query::table("products").in_("category", ["Honey", "Dried fruit"]);
        assert_eq!(query.params[0].1, "in.(Honey,\"Dried fruit\")");
    }

    #[test]
    fn test_range_to_offset_limit() {
        let query = Query::table("orders").range(20, 39);
        assert_eq!(
            query.params,
            vec![
                ("offset".to_string(), "20".to_string()),
                ("limit".to_string(), "20".to_string())
            ]
        );
    }

    #[test]
    fn test_sanitize_search() {
        assert_eq!(sanitize_search(" honey,(raw)* "), "honeyraw");
        assert_eq!(sanitize_search("green tea"), "green tea");
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-24/137"), Some(137));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("*/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_page_math() {
        let page = Page {
            items: vec![1, 2],
            total: 25,
            page: 2,
            per_page: 12,
        };
        assert_eq!(page.total_pages(), 3);
        assert!(page.has_next());
        assert!(page.has_prev());

        let empty: Page<i32> = Page {
            items: vec![],
            total: 0,
            page: 1,
            per_page: 12,
        };
        assert_eq!(empty.total_pages(), 0);
        assert!(!empty.has_next());
    }
}
