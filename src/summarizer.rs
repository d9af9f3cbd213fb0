//! Plain-English article summaries through an OpenAI-compatible API.
//!
//! # Architecture
//!
//! - [`Summarizer`]: trait the pipeline drives
//! - [`OpenAiSummarizer`]: `POST {base_url}/chat/completions`
//! - [`DummySummarizer`]: fixed placeholder, no network and no budget use
//!
//! A summarizer reports what a call is expected to cost through
//! [`Summarizer::estimated_cost_usd`]; the pipeline charges that to the
//! usage budget before calling [`Summarizer::summarize`]. `None` means the
//! implementation is not metered.

use reqwest::Client;
use serde::Deserialize;
use std::time::Instant;
use tracing::{error, info, instrument};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DUMMY_SUMMARY: &str = "(Dummy summary: LLM call disabled)";

pub trait Summarizer {
    /// Summarize `text`; returns the summary body.
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError>;

    /// Expected cost of summarizing `text`, or `None` when unmetered.
    fn estimated_cost_usd(&self, text: &str) -> Option<f64>;
}

#[derive(Debug, thiserror::Error)]
pub enum SummarizeError {
    #[error("HTTP error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Completion had no content")]
    EmptyResponse,
}

/// Learner-oriented prompt wrapped around the article body.
pub fn build_prompt(article_text: &str) -> String {
    format!(
        r#"
You are an assistant that simplifies news articles for English learners.

Summarize the following article in simple English suitable for learners at CEFR B1 level.
Limit to around 100 words.
Avoid difficult vocabulary.
Include 3 useful English vocabulary words from the article, each with a short definition in simple English.

Article:
"""
{article_text}
"""
"#
    )
}

/// Rough token count, ~4 characters per token.
pub fn approx_tokens(s: &str) -> usize {
    (s.chars().count() + 3) / 4
}

/// Per-1K-token prices used for the pre-call estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pricing {
    pub input_per_1k_usd: f64,
    pub output_per_1k_usd: f64,
    /// Completion tokens assumed per summary.
    pub output_tokens: usize,
}

impl Default for Pricing {
    fn default() -> Self {
        // gpt-3.5-turbo list prices
        Self {
            input_per_1k_usd: 0.0005,
            output_per_1k_usd: 0.0015,
            output_tokens: 250,
        }
    }
}

impl Pricing {
    pub fn estimate(&self, prompt: &str) -> f64 {
        let input = approx_tokens(prompt) as f64 / 1000.0 * self.input_per_1k_usd;
        let output = self.output_tokens as f64 / 1000.0 * self.output_per_1k_usd;
        input + output
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiSummarizer {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    pricing: Pricing,
}

impl OpenAiSummarizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".into(),
            model: DEFAULT_OPENAI_MODEL.into(),
            temperature: 0.7,
            pricing: Pricing::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    async fn send_completion_request(
        &self,
        user_content: String,
    ) -> Result<CompletionResponse, SummarizeError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": self.temperature,
            "messages": [
                {
                    "role": "user",
                    "content": user_content
                }
            ]
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .inspect_err(|e| error!(error = %e, "Failed to make http request"))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(SummarizeError::Api { status, message });
        }

        Ok(resp.json::<CompletionResponse>().await?)
    }
}

#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
pub struct CompletionMessage {
    pub content: Option<String>,
}

impl CompletionResponse {
    /// Trimmed content of the first choice, if any.
    pub fn first_content(&self) -> Option<String> {
        self.choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }
}

impl Summarizer for OpenAiSummarizer {
    #[instrument(level = "info", skip_all, fields(model = %self.model, chars = text.len()))]
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        let t0 = Instant::now();
        let response = self.send_completion_request(build_prompt(text)).await?;
        let summary = response.first_content().ok_or(SummarizeError::EmptyResponse)?;
        info!(elapsed_ms = t0.elapsed().as_millis() as u64, "Summary received");
        Ok(summary)
    }

    fn estimated_cost_usd(&self, text: &str) -> Option<f64> {
        Some(self.pricing.estimate(&build_prompt(text)))
    }
}

/// Returns [`DUMMY_SUMMARY`] for every input.
#[derive(Debug, Clone, Default)]
pub struct DummySummarizer;

impl Summarizer for DummySummarizer {
    async fn summarize(&self, _text: &str) -> Result<String, SummarizeError> {
        Ok(DUMMY_SUMMARY.to_string())
    }

    fn estimated_cost_usd(&self, _text: &str) -> Option<f64> {
        None
    }
}

/// Either backend, picked at startup from configuration.
#[derive(Debug, Clone)]
pub enum AnySummarizer {
    OpenAi(OpenAiSummarizer),
    Dummy(DummySummarizer),
}

impl Summarizer for AnySummarizer {
    async fn summarize(&self, text: &str) -> Result<String, SummarizeError> {
        match self {
            AnySummarizer::OpenAi(s) => s.summarize(text).await,
            AnySummarizer::Dummy(s) => s.summarize(text).await,
        }
    }

    fn estimated_cost_usd(&self, text: &str) -> Option<f64> {
        match self {
            AnySummarizer::OpenAi(s) => s.estimated_cost_usd(text),
            AnySummarizer::Dummy(s) => s.estimated_cost_usd(text),
        }
    }
}
