//! URL slugs for products.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Slug`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SlugError {
    /// Empty input, or input with no usable characters.
    #[error("slug cannot be empty")]
    Empty,
    /// Longer than [`Slug::MAX_LENGTH`].
    #[error("slug must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// Contains something other than `a-z`, `0-9` and single inner hyphens.
    #[error("slug may only contain lowercase letters, digits and single hyphens")]
    InvalidCharacters,
}

/// A product URL slug such as `cold-pressed-olive-oil`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Slug(String);

impl Slug {
    /// Maximum slug length.
    pub const MAX_LENGTH: usize = 96;

    /// Validate an existing slug.
    ///
    /// # Errors
    ///
    /// Returns a [`SlugError`] if the input is not already a canonical slug.
    pub fn parse(s: &str) -> Result<Self, SlugError> {
        if s.is_empty() {
            return Err(SlugError::Empty);
        }
        if s.len() > Self::MAX_LENGTH {
            return Err(SlugError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }
        let chars_ok = s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
        if !chars_ok || s.starts_with('-') || s.ends_with('-') || s.contains("--") {
            return Err(SlugError::InvalidCharacters);
        }
        Ok(Self(s.to_owned()))
    }

    /// Derive a slug from a product title.
    ///
    /// Runs of non-alphanumeric characters collapse into one hyphen and the
    /// result is truncated on a hyphen boundary when it would exceed the limit.
    ///
    /// # Errors
    ///
    /// Returns [`SlugError::Empty`] if the title has no ASCII alphanumerics.
    pub fn from_title(title: &str) -> Result<Self, SlugError> {
        let mut out = String::with_capacity(title.len());
        let mut pending_hyphen = false;
        for c in title.chars() {
            if c.is_ascii_alphanumeric() {
                if pending_hyphen && !out.is_empty() {
                    out.push('-');
                }
                pending_hyphen = false;
                out.push(c.to_ascii_lowercase());
            } else {
                pending_hyphen = true;
            }
        }

        if out.len() > Self::MAX_LENGTH {
            out.truncate(Self::MAX_LENGTH);
            while out.ends_with('-') {
                out.pop();
            }
        }

        if out.is_empty() {
            return Err(SlugError::Empty);
        }
        Ok(Self(out))
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Slug {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Slug> for String {
    fn from(slug: Slug) -> Self {
        slug.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_title() {
        assert_eq!(
            Slug::from_title("Cold-Pressed Olive Oil (500ml)").unwrap().as_str(),
            "cold-pressed-olive-oil-500ml"
        );
        assert_eq!(Slug::from_title("  Açaí  Bowl!! ").unwrap().as_str(), "a-a-bowl");
        assert_eq!(Slug::from_title("¡¿!?"), Err(SlugError::Empty));
    }

    #[test]
    fn test_from_title_truncates_cleanly() {
        let title = format!("{} {}", "a".repeat(95), "bbbb");
        let slug = Slug::from_title(&title).unwrap();
        assert_eq!(slug.as_str(), "a".repeat(95));
    }

    #[test]
    fn test_parse() {
        assert!(Slug::parse("raw-honey").is_ok());
        assert_eq!(Slug::parse(""), Err(SlugError::Empty));
        assert_eq!(Slug::parse("Raw-Honey"), Err(SlugError::InvalidCharacters));
        assert_eq!(Slug::parse("raw--honey"), Err(SlugError::InvalidCharacters));
        assert_eq!(Slug::parse("-honey"), Err(SlugError::InvalidCharacters));
    }
}
