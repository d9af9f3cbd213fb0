//! # NewsLite
//!
//! A daily news pipeline for English learners: fetch recent Guardian
//! articles per topic, summarize them in simple English, voice the
//! summaries with Amazon Polly, and publish the day's JSON to a KV store.
//!
//! ## Usage
//!
//! ```sh
//! newslite daily
//! newslite speak
//! newslite publish --prod
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetching**: page through the search API until each topic has enough
//!    unique, non-excluded articles ([`fetcher`])
//! 2. **Summarizing**: one model call per article, charged to a monthly
//!    budget first ([`pipeline`], [`usage`])
//! 3. **Speech**: one MP3 per summary, also budgeted ([`speech`])
//! 4. **Publishing**: attach audio URLs and upload with wrangler ([`publish`])

use clap::Parser;
use std::error::Error;
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod fetcher;
mod models;
mod outputs;
mod pipeline;
mod publish;
mod sources;
mod speech;
mod summarizer;
mod usage;
mod utils;

use cli::{Cli, Command, FetchArgs, SummarizerArgs, resolve_topics};
use config::JobConfig;
use outputs::json::{DataPaths, attach_audio_urls};
use publish::{PublishOptions, TokioRunner, expand_home};
use sources::guardian::GuardianClient;
use speech::{PollySynthesizer, VoiceSettings, summary_file_to_mp3};
use summarizer::{AnySummarizer, DummySummarizer, OpenAiSummarizer};
use usage::{BudgetTracker, JsonFileStore};
use utils::{ensure_writable_dir, today};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();

    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("newslite starting up");

    let args = Cli::parse();
    debug!(data_dir = %args.data_dir.display(), "Parsed CLI arguments");

    let usage_path = args
        .usage_file
        .clone()
        .unwrap_or_else(|| args.data_dir.join(usage::USAGE_FILE_NAME));
    let tracker = BudgetTracker::new(JsonFileStore::new(usage_path), args.budget.limits())
        .with_period_format(args.budget.usage_period_format.clone());
    let paths = DataPaths::new(&args.data_dir);

    match args.command {
        Command::Fetch { query, debug, fetch } => {
            let job = load_job(&fetch).await?;
            let options = fetch.resolve(&job, debug);
            let source = GuardianClient::new(&fetch.guardian_api_key).with_debug(debug);
            let articles = fetcher::fetch_articles(&source, &query, &options).await;
            info!(%query, count = articles.len(), "Fetch complete");
            println!("{}", serde_json::to_string_pretty(&articles)?);
        }
        Command::Daily {
            topics,
            date,
            fetch,
            summarizer,
        } => {
            let job = load_job(&fetch).await?;
            let options = fetch.resolve(&job, false);
            let topics = resolve_topics(&topics, &job);
            let date = date.unwrap_or_else(today);
            ensure_writable_dir(paths.data_dir()).await?;

            let source = GuardianClient::new(&fetch.guardian_api_key);
            let summarizer = build_summarizer(&summarizer)?;
            match pipeline::run_daily(&source, &summarizer, &tracker, &topics, &options, &paths, &date).await? {
                Some(outcome) => info!(
                    %date,
                    summaries = outcome.summaries.len(),
                    articles = outcome.articles.len(),
                    skipped = outcome.skipped,
                    failed = outcome.failed,
                    "Daily job finished"
                ),
                None => info!(%date, "Daily summary already present; skipped"),
            }
        }
        Command::Speak {
            date,
            json,
            output_dir,
            voice,
            engine,
            aws_region,
        } => {
            let date = date.unwrap_or_else(today);
            let json_path = json.unwrap_or_else(|| paths.summary(&date));
            let output_dir = output_dir.join(&date);
            ensure_writable_dir(&output_dir).await?;

            let synthesizer = PollySynthesizer::from_env(aws_region).await;
            let voice = VoiceSettings { voice_id: voice, engine };
            let report = summary_file_to_mp3(&synthesizer, &tracker, &json_path, &output_dir, &voice).await?;
            info!(
                written = report.written.len(),
                skipped = report.skipped,
                failed = report.failed,
                "Speech batch finished"
            );
        }
        Command::AttachAudio { date, r2_base_url } => {
            let date = date.unwrap_or_else(today);
            let written = attach_audio_urls(&paths, &date, &r2_base_url).await?;
            info!(path = %written.display(), "Attach complete");
        }
        Command::Publish {
            prod,
            date,
            newslite_dir,
            ui_dir,
            binding,
            no_attach,
            no_copy,
            r2_base_url,
        } => {
            let options = PublishOptions {
                date: date.unwrap_or_else(today),
                prod,
                newslite_dir: expand_home(&newslite_dir),
                ui_dir: expand_home(&ui_dir),
                binding,
                attach: !no_attach,
                copy: !no_copy,
                audio_base_url: r2_base_url,
            };
            let key = publish::publish(&TokioRunner, &options).await?;
            info!(%key, "Publish complete");
        }
        Command::Usage => {
            let record = tracker.snapshot().await?;
            let limits = tracker.limits();
            info!(
                file = %tracker.store().path().display(),
                period = %record.last_reset,
                openai_usd = record.openai_total_usd,
                openai_limit_usd = limits.openai_monthly_limit_usd,
                polly_chars = record.polly_total_chars,
                polly_limit_chars = limits.polly_monthly_limit_chars,
                "Current usage"
            );
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

async fn load_job(fetch: &FetchArgs) -> Result<JobConfig, Box<dyn Error>> {
    match &fetch.config {
        Some(path) => Ok(JobConfig::load(path).await?),
        None => Ok(JobConfig::default()),
    }
}

fn build_summarizer(args: &SummarizerArgs) -> Result<AnySummarizer, Box<dyn Error>> {
    if args.dummy_summary {
        warn!("Dummy summary mode: no model calls, no OpenAI budget used");
        return Ok(AnySummarizer::Dummy(DummySummarizer));
    }
    let key = args
        .openai_api_key
        .as_deref()
        .filter(|k| !k.trim().is_empty())
        .ok_or("OPENAI_API_KEY is not set (use --dummy-summary to run without it)")?;
    Ok(AnySummarizer::OpenAi(
        OpenAiSummarizer::new(key)
            .with_base_url(args.openai_base_url.as_str())
            .with_model(args.openai_model.as_str())
            .with_pricing(args.pricing()),
    ))
}
