//! Optional YAML job file.
//!
//! Lets a deployment change topics, page ceiling, requested fields or the
//! exclusion list without touching code or cron lines. Every key is
//! optional; command-line flags win over the file, the file wins over the
//! built-in defaults.
//!
//! ```yaml
//! topics: [technology, climate, education]
//! articles_per_topic: 3
//! max_pages: 5
//! fields: [headline, bodyText, trailText]
//! exclusions:
//!   - identifier:live
//!   - identifier:quiz
//!   - title:obituary
//!   - title~(?i)^crossword
//! ```

use crate::fetcher::ExclusionRule;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobConfig {
    pub topics: Vec<String>,
    pub articles_per_topic: Option<usize>,
    pub max_pages: Option<u32>,
    pub fields: Vec<String>,
    pub exclusions: Option<Vec<ExclusionRule>>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid job file {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

impl JobConfig {
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config: JobConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        info!(topics = config.topics.len(), "Loaded job file");
        Ok(config)
    }
}
