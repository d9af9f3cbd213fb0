//! Command-line interface definitions for NewsLite.
//!
//! Every option can also come from the environment (a `.env` file in the
//! working directory is loaded first).
//!
//! # Examples
//!
//! ```sh
//! # Daily cron: fetch + summarize, then voice, then publish to preview KV
//! newslite daily
//! newslite speak
//! newslite publish
//!
//! # Try the fetcher on its own
//! newslite fetch --query technology --count 5 --debug
//!
//! # Summaries without spending OpenAI budget
//! newslite daily --dummy-summary
//! ```

use crate::config::JobConfig;
use crate::fetcher::{ExclusionRule, FetchOptions, default_exclusions, default_fields};
use crate::pipeline::DEFAULT_TOPICS;
use crate::publish::{DEFAULT_BINDING, DEFAULT_NEWSLITE_DIR, DEFAULT_UI_DIR};
use crate::speech::{DEFAULT_ENGINE, DEFAULT_VOICE_ID};
use crate::summarizer::{DEFAULT_OPENAI_MODEL, Pricing};
use crate::usage::{
    BudgetLimits, DEFAULT_OPENAI_MONTHLY_LIMIT_USD, DEFAULT_PERIOD_FORMAT,
    DEFAULT_POLLY_MONTHLY_LIMIT_CHARS,
};
use chrono::NaiveDate;
use clap::builder::BoolishValueParser;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory holding the daily JSON files and the usage file
    #[arg(long, env = "NEWSLITE_DATA_DIR", default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Usage file (defaults to `<data-dir>/usage_tracker.json`)
    #[arg(long, env = "USAGE_FILE", global = true)]
    pub usage_file: Option<PathBuf>,

    #[command(flatten)]
    pub budget: BudgetArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch articles for one query and print them as JSON
    Fetch {
        #[arg(short, long, default_value = "technology")]
        query: String,

        /// Log HTTP status, response previews and every accepted article
        #[arg(long)]
        debug: bool,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Fetch and summarize every topic into `daily_summary_<date>.json`
    Daily {
        /// Topic to query (repeatable)
        #[arg(short, long = "topic")]
        topics: Vec<String>,

        #[arg(long, value_parser = parse_date)]
        date: Option<String>,

        #[command(flatten)]
        fetch: FetchArgs,

        #[command(flatten)]
        summarizer: SummarizerArgs,
    },
    /// Convert a daily summary file to MP3 files with Amazon Polly
    Speak {
        #[arg(long, value_parser = parse_date)]
        date: Option<String>,

        /// Summary JSON (defaults to `<data-dir>/daily_summary_<date>.json`)
        #[arg(long)]
        json: Option<PathBuf>,

        /// Audio root; files go to `<output-dir>/<date>/`
        #[arg(long, default_value = "output/audio")]
        output_dir: PathBuf,

        #[arg(long, default_value = DEFAULT_VOICE_ID)]
        voice: String,

        /// `neural` or `standard`
        #[arg(long, default_value = DEFAULT_ENGINE)]
        engine: String,

        #[arg(long, env = "AWS_DEFAULT_REGION")]
        aws_region: Option<String>,
    },
    /// Write `daily_summary_<date>_with_audio.json` with public audio URLs
    AttachAudio {
        #[arg(long, value_parser = parse_date)]
        date: Option<String>,

        /// e.g. https://audio.example.com/audio
        #[arg(long, env = "R2_BASE_URL")]
        r2_base_url: String,
    },
    /// Stage the with-audio JSON in the UI repo and put it to KV
    Publish {
        /// Publish to production KV (default: preview)
        #[arg(long)]
        prod: bool,

        #[arg(long, value_parser = parse_date)]
        date: Option<String>,

        /// Backend repo root
        #[arg(long, env = "NEWSLITE_DIR", default_value = DEFAULT_NEWSLITE_DIR)]
        newslite_dir: String,

        /// UI repo root (wrangler runs here)
        #[arg(long, env = "NEWSLITE_UI_DIR", default_value = DEFAULT_UI_DIR)]
        ui_dir: String,

        /// Wrangler KV binding name
        #[arg(long, env = "KV_BINDING", default_value = DEFAULT_BINDING)]
        binding: String,

        /// Skip the attach step (expects the with-audio JSON to exist)
        #[arg(long)]
        no_attach: bool,

        /// Do not copy the JSON into the UI repo's data directory
        #[arg(long)]
        no_copy: bool,

        #[arg(long, env = "R2_BASE_URL")]
        r2_base_url: Option<String>,
    },
    /// Show this period's usage against the monthly limits
    Usage,
}

#[derive(Args, Debug, Clone)]
pub struct BudgetArgs {
    #[arg(long, env = "OPENAI_MONTHLY_LIMIT_USD", default_value_t = DEFAULT_OPENAI_MONTHLY_LIMIT_USD, global = true)]
    pub openai_monthly_limit_usd: f64,

    #[arg(long, env = "POLLY_MONTHLY_LIMIT_CHARS", default_value_t = DEFAULT_POLLY_MONTHLY_LIMIT_CHARS, global = true)]
    pub polly_monthly_limit_chars: u64,

    /// strftime pattern naming a budget period
    #[arg(long, env = "USAGE_PERIOD_FORMAT", default_value = DEFAULT_PERIOD_FORMAT, global = true)]
    pub usage_period_format: String,
}

impl BudgetArgs {
    pub fn limits(&self) -> BudgetLimits {
        BudgetLimits {
            openai_monthly_limit_usd: self.openai_monthly_limit_usd,
            polly_monthly_limit_chars: self.polly_monthly_limit_chars,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FetchArgs {
    #[arg(long, env = "GUARDIAN_API_KEY", hide_env_values = true)]
    pub guardian_api_key: String,

    /// Optional YAML job file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Articles wanted per query (also the page size)
    #[arg(short = 'n', long)]
    pub count: Option<usize>,

    /// Maximum pages scanned per query
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Comma-separated `show-fields` list
    #[arg(long, value_delimiter = ',')]
    pub fields: Vec<String>,

    /// Exclusion rule, `identifier:live` or `title~regex` (repeatable; replaces the defaults)
    #[arg(long = "exclude")]
    pub exclusions: Vec<ExclusionRule>,
}

impl FetchArgs {
    /// Flags first, then the job file, then defaults.
    pub fn resolve(&self, job: &JobConfig, debug: bool) -> FetchOptions {
        let defaults = FetchOptions::default();
        FetchOptions {
            desired_count: self
                .count
                .or(job.articles_per_topic)
                .unwrap_or(defaults.desired_count),
            fields: first_non_empty(&self.fields, &job.fields).unwrap_or_else(default_fields),
            max_pages: self.max_pages.or(job.max_pages).unwrap_or(defaults.max_pages),
            debug,
            exclusions: if !self.exclusions.is_empty() {
                self.exclusions.clone()
            } else {
                job.exclusions.clone().unwrap_or_else(default_exclusions)
            },
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct SummarizerArgs {
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_OPENAI_MODEL)]
    pub openai_model: String,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub openai_base_url: String,

    /// USD per 1K prompt tokens, for the pre-call cost estimate
    #[arg(long, env = "OPENAI_INPUT_PRICE_PER_1K", default_value_t = Pricing::default().input_per_1k_usd)]
    pub input_price_per_1k: f64,

    /// USD per 1K completion tokens, for the pre-call cost estimate
    #[arg(long, env = "OPENAI_OUTPUT_PRICE_PER_1K", default_value_t = Pricing::default().output_per_1k_usd)]
    pub output_price_per_1k: f64,

    /// Return a placeholder instead of calling the model (no budget used)
    #[arg(long, env = "SUMMARY_DUMMY_MODE", value_parser = BoolishValueParser::new())]
    pub dummy_summary: bool,
}

impl SummarizerArgs {
    pub fn pricing(&self) -> Pricing {
        Pricing {
            input_per_1k_usd: self.input_price_per_1k,
            output_per_1k_usd: self.output_price_per_1k,
            ..Pricing::default()
        }
    }
}

/// Topics from flags, else the job file, else the built-in three.
pub fn resolve_topics(cli: &[String], job: &JobConfig) -> Vec<String> {
    first_non_empty(cli, &job.topics)
        .unwrap_or_else(|| DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect())
}

fn first_non_empty(a: &[String], b: &[String]) -> Option<Vec<String>> {
    [a, b].into_iter().find(|v| !v.is_empty()).map(<[String]>::to_vec)
}

fn parse_date(s: &str) -> Result<String, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}
