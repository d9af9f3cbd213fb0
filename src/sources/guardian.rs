//! Guardian content API search client.
//!
//! Queries `https://content.guardianapis.com/search` one page at a time.
//! A non-2xx HTTP status, or an envelope whose `status` is not `"ok"`, is a
//! [`SourceError`]; the fetcher treats either as the end of the scan.

use super::{ORDER_BY_NEWEST, SearchItem, SearchPage, SearchRequest, SearchSource, SourceError};
use crate::models::ArticleFields;
use crate::utils::truncate_for_log;
use reqwest::Client;
use serde::Deserialize;
use tracing::{error, info, instrument};

const DEFAULT_BASE_URL: &str = "https://content.guardianapis.com";

#[derive(Debug, Clone)]
pub struct GuardianClient {
    client: Client,
    api_key: String,
    base_url: String,
    debug: bool,
}

impl GuardianClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.into(),
            debug: false,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Log the status code and a response preview for every page.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    response: ResponseBody,
}

#[derive(Debug, Deserialize)]
struct ResponseBody {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    pages: Option<u32>,
    #[serde(default)]
    results: Vec<GuardianResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuardianResult {
    id: String,
    #[serde(default)]
    web_title: String,
    web_url: String,
    #[serde(default)]
    fields: ArticleFields,
}

/// Parse a `/search` response body into a page.
pub fn parse_page(body: &str) -> Result<SearchPage, SourceError> {
    let envelope: Envelope = serde_json::from_str(body)?;
    let response = envelope.response;

    if response.status != "ok" {
        return Err(SourceError::NotOk {
            status: response.status,
            message: response.message.unwrap_or_default(),
        });
    }

    let items = response
        .results
        .into_iter()
        .map(|r| {
            // Some results come back without a webTitle; fall back to the requested headline.
            let title = if r.web_title.trim().is_empty() {
                r.fields.headline().unwrap_or_default().to_string()
            } else {
                r.web_title
            };
            SearchItem {
                identifier: r.id,
                title,
                url: r.web_url,
                fields: r.fields,
            }
        })
        .collect();

    Ok(SearchPage {
        items,
        total_pages: response.pages,
    })
}

impl SearchSource for GuardianClient {
    #[instrument(level = "info", skip_all, fields(query = %request.query, page = request.page))]
    async fn search(&self, request: &SearchRequest<'_>) -> Result<SearchPage, SourceError> {
        let page_size = request.page_size.to_string();
        let page = request.page.to_string();
        let fields = request.fields_param();

        let resp = self
            .client
            .get(format!("{}/search", self.base_url.trim_end_matches('/')))
            .query(&[
                ("api-key", self.api_key.as_str()),
                ("q", request.query),
                ("page-size", page_size.as_str()),
                ("show-fields", fields.as_str()),
                ("page", page.as_str()),
                ("order-by", ORDER_BY_NEWEST),
            ])
            .send()
            .await
            .inspect_err(|e| error!(error = %e, "Failed to make http request"))?;

        let status = resp.status();
        let body = resp.text().await?;

        if self.debug {
            info!(
                status = status.as_u16(),
                preview = %truncate_for_log(&body, 200),
                "Guardian response"
            );
        }

        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                message: truncate_for_log(&body, 300),
            });
        }

        parse_page(&body)
    }
}
