//! Custom Askama template filters.

#![allow(clippy::unnecessary_wraps)]

use std::fmt::Display;

/// Returns the current year.
///
/// Usage in templates: `{{ ""|current_year }}`
#[askama::filter_fn]
pub fn current_year(_value: impl Display, _env: &dyn askama::Values) -> askama::Result<i32> {
    use chrono::Datelike;
    Ok(chrono::Utc::now().year())
}

/// Stock count as shown to staff: "Sold out" or "N left".
///
/// Usage in templates: `{{ product.stock|stock_label }}`
#[askama::filter_fn]
pub fn stock_label(stock: impl Display, _env: &dyn askama::Values) -> askama::Result<String> {
    let stock = stock.to_string();
    Ok(if stock == "0" {
        "Sold out".to_string()
    } else {
        format!("{stock} left")
    })
}
