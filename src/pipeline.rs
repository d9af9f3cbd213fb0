//! The daily summary job.
//!
//! For each topic: fetch articles, then summarize every article that has a
//! body. A summary is only requested after its estimated cost has been
//! charged to the OpenAI budget. Any per-article problem (budget, API
//! failure) skips that article and the run carries on.

use crate::fetcher::{FetchOptions, fetch_articles};
use crate::models::{Article, SummaryEntry};
use crate::outputs::json::{DataPaths, write_full_articles, write_summaries};
use crate::sources::SearchSource;
use crate::summarizer::Summarizer;
use crate::usage::{BudgetTracker, UsageStore};
use std::error::Error;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_TOPICS: [&str; 3] = ["technology", "climate", "education"];

/// Everything one run produced.
#[derive(Debug, Default)]
pub struct DailyOutcome {
    pub summaries: Vec<SummaryEntry>,
    /// Every fetched article, summarized or not.
    pub articles: Vec<Article>,
    pub skipped: usize,
    pub failed: usize,
}

async fn summarize_article<Sum, St>(
    summarizer: &Sum,
    tracker: &BudgetTracker<St>,
    article: &Article,
    body: &str,
) -> Option<String>
where
    Sum: Summarizer,
    St: UsageStore,
{
    if let Some(cost) = summarizer.estimated_cost_usd(body) {
        if let Err(e) = tracker.check_and_log_openai(cost).await {
            if e.is_budget_exceeded() {
                warn!(title = %article.title, error = %e, "Skipping article: OpenAI budget exhausted");
            } else {
                error!(title = %article.title, error = %e, "Usage tracking failed; skipping article");
            }
            return None;
        }
    }

    match summarizer.summarize(body).await {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!(title = %article.title, url = %article.url, error = %e, "Summarization failed; skipping article");
            None
        }
    }
}

/// Fetch and summarize every topic. Never fails as a whole.
#[instrument(level = "info", skip_all, fields(topics = topics.len()))]
pub async fn summarize_topics<Src, Sum, St>(
    source: &Src,
    summarizer: &Sum,
    tracker: &BudgetTracker<St>,
    topics: &[String],
    options: &FetchOptions,
) -> DailyOutcome
where
    Src: SearchSource,
    Sum: Summarizer,
    St: UsageStore,
{
    let mut outcome = DailyOutcome::default();

    for topic in topics {
        let articles = fetch_articles(source, topic, options).await;
        info!(%topic, count = articles.len(), "Topic fetched");

        for article in &articles {
            let Some(body) = article.fields.body_text() else {
                warn!(title = %article.title, "No body text; skipping article");
                outcome.skipped += 1;
                continue;
            };

            match summarize_article(summarizer, tracker, article, body).await {
                Some(summary) => outcome.summaries.push(SummaryEntry {
                    title: article.title.clone(),
                    url: article.url.clone(),
                    topic: topic.clone(),
                    summary,
                    audio: None,
                }),
                None => outcome.failed += 1,
            }
        }

        outcome.articles.extend(articles);
    }

    info!(
        fetched = outcome.articles.len(),
        summarized = outcome.summaries.len(),
        skipped = outcome.skipped,
        failed = outcome.failed,
        "Completed topic processing"
    );
    outcome
}

/// Run the job for `date` and write both output files.
///
/// Returns `Ok(None)` without doing anything if the summary for `date`
/// already exists.
#[instrument(level = "info", skip_all, fields(%date))]
pub async fn run_daily<Src, Sum, St>(
    source: &Src,
    summarizer: &Sum,
    tracker: &BudgetTracker<St>,
    topics: &[String],
    options: &FetchOptions,
    paths: &DataPaths,
    date: &str,
) -> Result<Option<DailyOutcome>, Box<dyn Error>>
where
    Src: SearchSource,
    Sum: Summarizer,
    St: UsageStore,
{
    let summary_path = paths.summary(date);
    if tokio::fs::try_exists(&summary_path).await? {
        info!(path = %summary_path.display(), "Summary already exists; nothing to do");
        return Ok(None);
    }

    let outcome = summarize_topics(source, summarizer, tracker, topics, options).await;

    write_full_articles(&paths.full_articles(date), &outcome.articles).await?;
    write_summaries(&summary_path, &outcome.summaries).await?;
    info!(path = %summary_path.display(), "Saved daily summary");

    Ok(Some(outcome))
}
