//! Data models for fetched articles and the daily summary files.
//!
//! - [`Article`]: one accepted search result, as handed to the summarizer
//! - [`ArticleFields`]: the typed `show-fields` payload of a search result
//! - [`SummaryEntry`]: one line of `daily_summary_{date}.json`
//!
//! Field names in [`ArticleFields`] use the source's camelCase spelling so the
//! full-article backup keeps the raw mapping as it was received.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// The optional fields requested through `show-fields`.
///
/// Known fields get named accessors. Anything else the caller asked for
/// (`byline`, `wordcount`, ...) lands in `extra` untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trail_text: Option<String>,
    /// Requested fields without a named accessor.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ArticleFields {
    /// Plain-text article body, if present and non-blank.
    pub fn body_text(&self) -> Option<&str> {
        non_blank(self.body_text.as_deref())
    }

    /// Standfirst / trail text, if present and non-blank.
    pub fn trail_text(&self) -> Option<&str> {
        non_blank(self.trail_text.as_deref())
    }

    pub fn headline(&self) -> Option<&str> {
        non_blank(self.headline.as_deref())
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// An article accepted by the fetcher.
///
/// Within one fetch, no two articles share the same `(title, url)` pair.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Article {
    pub title: String,
    pub url: String,
    /// Source-provided id, e.g. `technology/live/2025/aug/07/...`.
    pub identifier: String,
    /// Body text, falling back to trail text, falling back to empty.
    pub content: String,
    pub fields: ArticleFields,
}

impl Article {
    pub fn new(identifier: String, title: String, url: String, fields: ArticleFields) -> Self {
        let content = fields
            .body_text()
            .or_else(|| fields.trail_text())
            .unwrap_or_default()
            .to_string();
        Self {
            title,
            url,
            identifier,
            content,
            fields,
        }
    }

    /// The dedup key used across pages.
    pub fn dedup_key(&self) -> (String, String) {
        (self.title.clone(), self.url.clone())
    }
}

/// One summarized article in the daily summary file.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SummaryEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub summary: String,
    /// Public MP3 URL, set once by the attach step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,
}
