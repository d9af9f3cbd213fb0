//! Text-to-speech for the daily summaries.
//!
//! [`summaries_to_mp3`] walks a summary list and writes one
//! `article_{NN}.mp3` per entry. `NN` is the 1-based position in the list,
//! so skipped entries leave a gap rather than shifting later files (the
//! audio URLs attached later rely on that numbering).
//!
//! Per entry:
//! 1. empty summary: skipped silently
//! 2. longer than [`MAX_POLLY_CHARS`]: skipped with a warning, never truncated
//! 3. character count charged to the Polly budget; skipped if over budget
//! 4. SSML-escaped, wrapped in `<speak>`, synthesized, written to disk
//!
//! Any failure in steps 3–4 affects only that entry.

use crate::models::SummaryEntry;
use crate::outputs::json::{OutputError, read_summaries};
use crate::usage::{BudgetTracker, UsageStore};
use aws_sdk_polly::error::DisplayErrorContext;
use aws_sdk_polly::types::{Engine, OutputFormat, TextType, VoiceId};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

/// Polly's request limit for billed characters.
pub const MAX_POLLY_CHARS: usize = 3000;
pub const DEFAULT_VOICE_ID: &str = "Ruth";
pub const DEFAULT_ENGINE: &str = "neural";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSettings {
    pub voice_id: String,
    /// `neural` or `standard`.
    pub engine: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID.into(),
            engine: DEFAULT_ENGINE.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("Speech provider error: {0}")]
    Provider(String),
    #[error("Audio stream error: {0}")]
    Stream(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot load summaries: {0}")]
    Summaries(#[from] OutputError),
}

pub trait SpeechSynthesizer {
    /// Render SSML to MP3 bytes.
    async fn synthesize(&self, ssml: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SpeechError>;
}

/// Escape `text` and wrap it in a `<speak>` element.
pub fn to_ssml(text: &str) -> String {
    format!("<speak>{}</speak>", quick_xml::escape::escape(text))
}

/// Amazon Polly backend.
#[derive(Debug, Clone)]
pub struct PollySynthesizer {
    client: aws_sdk_polly::Client,
}

impl PollySynthesizer {
    /// Credentials come from the default AWS provider chain
    /// (`AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`, profiles, ...).
    pub async fn from_env(region: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_config::Region::new(region));
        }
        let config = loader.load().await;
        Self {
            client: aws_sdk_polly::Client::new(&config),
        }
    }
}

impl SpeechSynthesizer for PollySynthesizer {
    #[instrument(level = "info", skip_all, fields(voice = %voice.voice_id, engine = %voice.engine))]
    async fn synthesize(&self, ssml: &str, voice: &VoiceSettings) -> Result<Vec<u8>, SpeechError> {
        let output = self
            .client
            .synthesize_speech()
            .text(ssml)
            .text_type(TextType::Ssml)
            .output_format(OutputFormat::Mp3)
            .voice_id(VoiceId::from(voice.voice_id.as_str()))
            .engine(Engine::from(voice.engine.as_str()))
            .send()
            .await
            .map_err(|e| SpeechError::Provider(DisplayErrorContext(e).to_string()))?;

        let audio = output
            .audio_stream
            .collect()
            .await
            .map_err(|e| SpeechError::Stream(e.to_string()))?;
        Ok(audio.into_bytes().to_vec())
    }
}

/// Outcome of one batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SpeechReport {
    pub written: Vec<PathBuf>,
    pub skipped: usize,
    pub failed: usize,
}

pub fn audio_file_name(position: usize) -> String {
    format!("article_{position:02}.mp3")
}

/// Synthesize every summary in `entries` into `output_dir`.
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir.display(), count = entries.len()))]
pub async fn summaries_to_mp3<T, S>(
    synthesizer: &T,
    tracker: &BudgetTracker<S>,
    entries: &[SummaryEntry],
    output_dir: &Path,
    voice: &VoiceSettings,
) -> Result<SpeechReport, SpeechError>
where
    T: SpeechSynthesizer,
    S: UsageStore,
{
    fs::create_dir_all(output_dir).await?;
    let mut report = SpeechReport::default();

    for (i, entry) in entries.iter().enumerate() {
        let position = i + 1;
        let summary = entry.summary.trim();
        if summary.is_empty() {
            report.skipped += 1;
            continue;
        }

        let chars = summary.chars().count();
        if chars > MAX_POLLY_CHARS {
            warn!(article = position, chars, max = MAX_POLLY_CHARS, "Skipping article: text too long");
            report.skipped += 1;
            continue;
        }

        if let Err(e) = tracker.check_and_log_polly(chars as u64).await {
            if e.is_budget_exceeded() {
                warn!(article = position, error = %e, "Skipping article: Polly budget exhausted");
                report.skipped += 1;
            } else {
                error!(article = position, error = %e, "Usage tracking failed; skipping article");
                report.failed += 1;
            }
            continue;
        }

        info!(article = position, chars, "Generating audio");
        let path = output_dir.join(audio_file_name(position));
        let result = match synthesizer.synthesize(&to_ssml(summary), voice).await {
            Ok(bytes) => fs::write(&path, bytes).await.map_err(SpeechError::from),
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => report.written.push(path),
            Err(e) => {
                error!(article = position, error = %e, "Failed to generate audio");
                report.failed += 1;
            }
        }
    }

    info!(
        written = report.written.len(),
        skipped = report.skipped,
        failed = report.failed,
        "All summaries converted to audio"
    );
    Ok(report)
}

/// Load a daily summary file and voice it.
pub async fn summary_file_to_mp3<T, S>(
    synthesizer: &T,
    tracker: &BudgetTracker<S>,
    json_path: &Path,
    output_dir: &Path,
    voice: &VoiceSettings,
) -> Result<SpeechReport, SpeechError>
where
    T: SpeechSynthesizer,
    S: UsageStore,
{
    let entries = read_summaries(json_path).await?;
    summaries_to_mp3(synthesizer, tracker, &entries, output_dir, voice).await
}
