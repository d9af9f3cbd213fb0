//! JSON output for the daily job and the audio URL attach step.
//!
//! File names are keyed by the run date (`YYYY-MM-DD`); see
//! [`DataPaths`].
//!
//! # Attach Safety
//!
//! [`attach_audio_urls`] writes a new `_with_audio` file and never touches
//! the source. It refuses to run when the destination already exists or when
//! the source already carries `audio` fields, so a second invocation is a
//! no-op with an error instead of a double augmentation.

use crate::models::{Article, SummaryEntry};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Source JSON not found: {}", .0.display())]
    SourceMissing(PathBuf),
    #[error("{} already exists; audio URLs are already attached", .0.display())]
    AlreadyAttached(PathBuf),
    #[error("{} already contains 'audio' fields", .0.display())]
    SourceHasAudio(PathBuf),
    #[error("Invalid audio base URL {url:?}: {source}")]
    BaseUrl {
        url: String,
        source: url::ParseError,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Well-known file locations under one data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    data_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn summary(&self, date: &str) -> PathBuf {
        self.data_dir.join(format!("daily_summary_{date}.json"))
    }

    pub fn summary_with_audio(&self, date: &str) -> PathBuf {
        self.data_dir.join(format!("daily_summary_{date}_with_audio.json"))
    }

    pub fn full_articles(&self, date: &str) -> PathBuf {
        self.data_dir.join(format!("daily_full_article_{date}.json"))
    }
}

/// Public URL of the `position`-th (1-based) audio file for `date`.
pub fn audio_url(base_url: &str, date: &str, position: usize) -> String {
    format!(
        "{}/{}/article_{:02}.mp3",
        base_url.trim_end_matches('/'),
        date,
        position
    )
}

async fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), OutputError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, serde_json::to_string_pretty(value)?).await?;
    Ok(())
}

#[instrument(level = "info", skip_all, fields(path = %path.display(), count = entries.len()))]
pub async fn write_summaries(path: &Path, entries: &[SummaryEntry]) -> Result<(), OutputError> {
    write_pretty(path, entries).await?;
    info!("Wrote daily summary");
    Ok(())
}

/// Backup of everything fetched, raw fields included.
#[instrument(level = "info", skip_all, fields(path = %path.display(), count = articles.len()))]
pub async fn write_full_articles(path: &Path, articles: &[Article]) -> Result<(), OutputError> {
    write_pretty(path, articles).await?;
    info!("Wrote full article backup");
    Ok(())
}

pub async fn read_summaries(path: &Path) -> Result<Vec<SummaryEntry>, OutputError> {
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(OutputError::SourceMissing(path.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&raw)?)
}

/// Create `daily_summary_{date}_with_audio.json` from `daily_summary_{date}.json`.
///
/// Every entry keeps its fields and gains
/// `audio = {base_url}/{date}/article_{NN}.mp3`. Returns the written path.
#[instrument(level = "info", skip_all, fields(data_dir = %paths.data_dir().display(), %date))]
pub async fn attach_audio_urls(
    paths: &DataPaths,
    date: &str,
    base_url: &str,
) -> Result<PathBuf, OutputError> {
    Url::parse(base_url).map_err(|source| OutputError::BaseUrl {
        url: base_url.to_string(),
        source,
    })?;

    let src_path = paths.summary(date);
    let dst_path = paths.summary_with_audio(date);

    if !fs::try_exists(&src_path).await? {
        return Err(OutputError::SourceMissing(src_path));
    }
    if fs::try_exists(&dst_path).await? {
        return Err(OutputError::AlreadyAttached(dst_path));
    }

    let raw = fs::read_to_string(&src_path).await?;
    let entries: Vec<Map<String, Value>> = serde_json::from_str(&raw)?;

    if entries.iter().any(|e| e.contains_key("audio")) {
        return Err(OutputError::SourceHasAudio(src_path));
    }

    let processed: Vec<Map<String, Value>> = entries
        .into_iter()
        .enumerate()
        .map(|(idx, mut entry)| {
            entry.insert(
                "audio".to_string(),
                Value::String(audio_url(base_url, date, idx + 1)),
            );
            entry
        })
        .collect();

    write_pretty(&dst_path, &processed).await?;

    let first = processed
        .first()
        .and_then(|e| e.get("audio"))
        .and_then(Value::as_str)
        .unwrap_or("-");
    info!(output = %dst_path.display(), count = processed.len(), first_audio = %first, "Audio URLs attached");
    Ok(dst_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://audio.example.com/audio/";

    fn entry(title: &str) -> SummaryEntry {
        SummaryEntry {
            title: title.into(),
            url: format!("https://g/{title}"),
            topic: "climate".into(),
            summary: format!("Summary of {title} – naïve café"),
            audio: None,
        }
    }

    #[test]
    fn test_paths() {
        let paths = DataPaths::new("data");
        assert_eq!(paths.summary("2025-08-07"), PathBuf::from("data/daily_summary_2025-08-07.json"));
        assert_eq!(
            paths.summary_with_audio("2025-08-07"),
            PathBuf::from("data/daily_summary_2025-08-07_with_audio.json")
        );
        assert_eq!(
            paths.full_articles("2025-08-07"),
            PathBuf::from("data/daily_full_article_2025-08-07.json")
        );
    }

    #[test]
    fn test_audio_url_trims_slash_and_pads() {
        assert_eq!(
            audio_url(BASE, "2025-08-07", 3),
            "https://audio.example.com/audio/2025-08-07/article_03.mp3"
        );
    }

    #[tokio::test]
    async fn test_attach_audio_urls_writes_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        write_summaries(&paths.summary("2025-08-07"), &[entry("a"), entry("b")])
            .await
            .unwrap();

        let out = attach_audio_urls(&paths, "2025-08-07", BASE).await.unwrap();

        assert_eq!(out, paths.summary_with_audio("2025-08-07"));
        let raw = std::fs::read_to_string(&out).unwrap();
        assert!(raw.contains("naïve café"), "non-ASCII must be kept verbatim");

        let with_audio = read_summaries(&out).await.unwrap();
        assert_eq!(with_audio.len(), 2);
        assert_eq!(
            with_audio[1].audio.as_deref(),
            Some("https://audio.example.com/audio/2025-08-07/article_02.mp3")
        );
        assert_eq!(with_audio[1].title, "b");

        let source = read_summaries(&paths.summary("2025-08-07")).await.unwrap();
        assert!(source.iter().all(|e| e.audio.is_none()));
    }

    #[tokio::test]
    async fn test_attach_refuses_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        write_summaries(&paths.summary("2025-08-07"), &[entry("a")])
            .await
            .unwrap();

        attach_audio_urls(&paths, "2025-08-07", BASE).await.unwrap();
        let before = std::fs::read_to_string(paths.summary_with_audio("2025-08-07")).unwrap();

        let err = attach_audio_urls(&paths, "2025-08-07", "https://other.example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, OutputError::AlreadyAttached(_)));

        let after = std::fs::read_to_string(paths.summary_with_audio("2025-08-07")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_attach_refuses_source_with_audio() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());
        let mut e = entry("a");
        e.audio = Some("https://already/there.mp3".into());
        write_summaries(&paths.summary("2025-08-07"), &[entry("b"), e])
            .await
            .unwrap();

        let err = attach_audio_urls(&paths, "2025-08-07", BASE).await.unwrap_err();

        assert!(matches!(err, OutputError::SourceHasAudio(_)));
        assert!(!paths.summary_with_audio("2025-08-07").exists());
    }

    #[tokio::test]
    async fn test_attach_missing_source_and_bad_base() {
        let dir = tempfile::tempdir().unwrap();
        let paths = DataPaths::new(dir.path());

        let err = attach_audio_urls(&paths, "2025-08-07", BASE).await.unwrap_err();
        assert!(matches!(err, OutputError::SourceMissing(_)));

        let err = attach_audio_urls(&paths, "2025-08-07", "not a url").await.unwrap_err();
        assert!(matches!(err, OutputError::BaseUrl { .. }));
    }
}
