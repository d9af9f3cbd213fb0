//! Cross-repository publish step.
//!
//! Stages the day's `_with_audio` JSON into the front-end repository and
//! uploads it to the front end's Cloudflare KV namespace:
//!
//! 1. attach audio URLs in the backend repo (unless `attach` is off)
//! 2. copy `daily_summary_{date}_with_audio.json` into `{ui_dir}/data/`
//!    (unless `copy` is off)
//! 3. `npx wrangler kv key put articles/{date} <payload> --binding <b> --remote`
//!    with `--preview` or `--preview=false`, run from the UI repo
//!
//! The backend repo's file is the source of truth for the payload; the staged
//! copy only exists for traceability in the UI repo.

use crate::outputs::json::{DataPaths, OutputError, attach_audio_urls};
use crate::utils::truncate_for_log;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument, warn};

pub const DEFAULT_BINDING: &str = "newslite_kv";
pub const DEFAULT_NEWSLITE_DIR: &str = "~/dev/newslite";
pub const DEFAULT_UI_DIR: &str = "~/dev/newslite-ui";

#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub date: String,
    /// Production namespace instead of preview.
    pub prod: bool,
    /// Backend repository root (holds `data/`).
    pub newslite_dir: PathBuf,
    /// Front-end repository root (wrangler runs here).
    pub ui_dir: PathBuf,
    pub binding: String,
    pub attach: bool,
    pub copy: bool,
    /// Needed only when `attach` is on.
    pub audio_base_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("{label} not found: {}", .path.display())]
    DirMissing { label: &'static str, path: PathBuf },
    #[error("with_audio JSON not found: {}", .0.display())]
    MissingJson(PathBuf),
    #[error("JSON is empty: {}", .0.display())]
    EmptyPayload(PathBuf),
    #[error("R2_BASE_URL is not set; cannot attach audio URLs")]
    MissingBaseUrl,
    #[error("Attach step failed: {0}")]
    Attach(#[from] OutputError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("KV upload failed ({mode}), exit code {code:?}: {stderr}")]
    UploadFailed {
        mode: &'static str,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs an external program to completion.
pub trait CommandRunner {
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<CommandOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct TokioRunner;

impl CommandRunner for TokioRunner {
    async fn run(&self, program: &str, args: &[String], cwd: &Path) -> std::io::Result<CommandOutput> {
        info!(cwd = %cwd.display(), "[EXEC] {} {}", program, truncate_for_log(&args.join(" "), 200));
        let output = tokio::process::Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .await?;
        Ok(CommandOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Expand a leading `~` using `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix('~'), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest.trim_start_matches('/')),
        _ => PathBuf::from(path),
    }
}

pub fn kv_key(date: &str) -> String {
    format!("articles/{date}")
}

/// Arguments for `npx`.
pub fn wrangler_args(key: &str, payload: &str, binding: &str, prod: bool) -> Vec<String> {
    let mut args: Vec<String> = ["wrangler", "kv", "key", "put", key, payload, "--binding", binding, "--remote"]
        .into_iter()
        .map(String::from)
        .collect();
    args.push(if prod { "--preview=false" } else { "--preview" }.to_string());
    args
}

async fn read_payload(path: &Path) -> Result<String, PublishError> {
    let payload = fs::read_to_string(path).await?.trim().to_string();
    if payload.is_empty() {
        return Err(PublishError::EmptyPayload(path.to_path_buf()));
    }
    Ok(payload)
}

/// Run the whole publish flow. Returns the KV key written.
#[instrument(level = "info", skip_all, fields(date = %options.date, prod = options.prod))]
pub async fn publish<R: CommandRunner>(runner: &R, options: &PublishOptions) -> Result<String, PublishError> {
    for (label, path) in [("newslite-dir", &options.newslite_dir), ("ui-dir", &options.ui_dir)] {
        if !fs::try_exists(path).await? {
            return Err(PublishError::DirMissing {
                label,
                path: path.clone(),
            });
        }
    }

    let paths = DataPaths::new(options.newslite_dir.join("data"));
    let src_json = paths.summary_with_audio(&options.date);

    if options.attach {
        let base_url = options
            .audio_base_url
            .as_deref()
            .ok_or(PublishError::MissingBaseUrl)?;
        match attach_audio_urls(&paths, &options.date, base_url).await {
            Ok(path) => info!(path = %path.display(), "Attached audio URLs"),
            Err(OutputError::AlreadyAttached(path)) => {
                warn!(path = %path.display(), "with_audio JSON already exists; not overwriting")
            }
            Err(e) => return Err(e.into()),
        }
    }

    if !fs::try_exists(&src_json).await? {
        return Err(PublishError::MissingJson(src_json));
    }

    if options.copy {
        let ui_data_dir = options.ui_dir.join("data");
        fs::create_dir_all(&ui_data_dir).await?;
        let file_name = src_json
            .file_name()
            .ok_or_else(|| PublishError::MissingJson(src_json.clone()))?;
        let dst_json = ui_data_dir.join(file_name);
        fs::copy(&src_json, &dst_json).await?;
        info!(path = %dst_json.display(), "Copied to UI repo");
    }

    let key = kv_key(&options.date);
    let payload = read_payload(&src_json).await?;
    let args = wrangler_args(&key, &payload, &options.binding, options.prod);
    let mode = if options.prod { "PROD" } else { "PREVIEW" };

    let output = runner.run("npx", &args, &options.ui_dir).await?;
    if !output.success {
        error!(
            mode,
            code = ?output.code,
            stdout = %truncate_for_log(&output.stdout, 500),
            stderr = %truncate_for_log(&output.stderr, 500),
            "KV upload failed"
        );
        return Err(PublishError::UploadFailed {
            mode,
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        });
    }

    info!(mode, %key, stdout = %output.stdout.trim(), "KV upload success");
    if options.prod {
        info!("Verify (prod): https://newslite.tarclog.com/?date={}", options.date);
    } else {
        info!("Verify (preview via localhost): http://localhost:8787/?date={}", options.date);
    }
    Ok(key)
}
