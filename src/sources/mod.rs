//! Paginated article search sources.
//!
//! The fetcher talks to a source through [`SearchSource`]: one call per page,
//! newest first. [`guardian`] is the only production source; tests plug in
//! scripted sources.
//!
//! # Wire Shape
//!
//! | Request | Meaning |
//! |---------|---------|
//! | `q` | free-text query |
//! | `page-size` | items per page |
//! | `show-fields` | comma-separated field list |
//! | `page` | 1-based page number |
//! | `order-by` | always `newest` |

pub mod guardian;

use crate::models::ArticleFields;
use itertools::Itertools;

/// Fixed sort order sent with every request.
pub const ORDER_BY_NEWEST: &str = "newest";

/// One page request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub page_size: usize,
    pub fields: &'a [String],
    pub page: u32,
}

impl SearchRequest<'_> {
    /// Field list as sent on the wire.
    pub fn fields_param(&self) -> String {
        self.fields.iter().map(|f| f.trim()).join(",")
    }
}

/// One raw result item, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchItem {
    pub identifier: String,
    pub title: String,
    pub url: String,
    pub fields: ArticleFields,
}

/// A successfully fetched page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub items: Vec<SearchItem>,
    /// Total page count reported by the source, when it reports one.
    pub total_pages: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Source returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("Source reported status {status:?}: {message}")]
    NotOk { status: String, message: String },
    #[error("Malformed response: {0}")]
    Json(#[from] serde_json::Error),
}

/// A paginated search endpoint.
pub trait SearchSource {
    /// Fetch a single page. Any `Err` ends the caller's scan.
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage, SourceError>;
}

impl<T: SearchSource> SearchSource for &T {
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage, SourceError> {
        (**self).search(request).await
    }
}
