//! Monthly usage budget for the two metered services.
//!
//! One [`UsageRecord`] holds the OpenAI cost and the Polly character count for
//! the current period. [`BudgetTracker::check_and_log`] loads it, adds the new
//! amount, and either persists the new total or fails with
//! [`UsageError::BudgetExceeded`] leaving the stored record untouched.
//!
//! # Period Rollover
//!
//! The stored `last_reset` stamp names the period being tracked (`YYYY-MM`
//! by default). It is compared against the current period on every load; on
//! mismatch both totals restart at zero under the new stamp.
//!
//! # Concurrency
//!
//! None. Two processes sharing a usage file can lose updates. The batch job
//! runs once a day from a single cron entry.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, instrument, warn};

/// Usage file name inside the data directory.
pub const USAGE_FILE_NAME: &str = "usage_tracker.json";
pub const DEFAULT_PERIOD_FORMAT: &str = "%Y-%m";
pub const DEFAULT_OPENAI_MONTHLY_LIMIT_USD: f64 = 3.0;
/// Polly's first-year free tier.
pub const DEFAULT_POLLY_MONTHLY_LIMIT_CHARS: u64 = 1_000_000;

/// Persisted accumulators for the current period.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UsageRecord {
    pub openai_total_usd: f64,
    pub polly_total_chars: u64,
    /// The period these totals belong to.
    pub last_reset: String,
}

impl UsageRecord {
    pub fn zeroed(period: impl Into<String>) -> Self {
        Self {
            openai_total_usd: 0.0,
            polly_total_chars: 0,
            last_reset: period.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteredService {
    OpenAi,
    Polly,
}

impl fmt::Display for MeteredService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeteredService::OpenAi => f.write_str("openai"),
            MeteredService::Polly => f.write_str("polly"),
        }
    }
}

/// An amount about to be spent on a metered service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeteredUsage {
    OpenAiCost(f64),
    PollyChars(u64),
}

impl MeteredUsage {
    pub fn service(&self) -> MeteredService {
        match self {
            MeteredUsage::OpenAiCost(_) => MeteredService::OpenAi,
            MeteredUsage::PollyChars(_) => MeteredService::Polly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetLimits {
    pub openai_monthly_limit_usd: f64,
    pub polly_monthly_limit_chars: u64,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            openai_monthly_limit_usd: DEFAULT_OPENAI_MONTHLY_LIMIT_USD,
            polly_monthly_limit_chars: DEFAULT_POLLY_MONTHLY_LIMIT_CHARS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("Monthly {service} budget exceeded: {attempted_total} > {limit}")]
    BudgetExceeded {
        service: MeteredService,
        attempted_total: f64,
        limit: f64,
    },
    #[error("Usage file IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Usage file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl UsageError {
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self, UsageError::BudgetExceeded { .. })
    }
}

/// Load/save port for the usage record.
pub trait UsageStore {
    /// `Ok(None)` when nothing has been persisted yet.
    async fn load(&self) -> Result<Option<UsageRecord>, UsageError>;
    async fn save(&self, record: &UsageRecord) -> Result<(), UsageError>;
}

impl<T: UsageStore> UsageStore for &T {
    async fn load(&self) -> Result<Option<UsageRecord>, UsageError> {
        (**self).load().await
    }

    async fn save(&self, record: &UsageRecord) -> Result<(), UsageError> {
        (**self).save(record).await
    }
}

/// Single JSON file, rewritten whole on every save.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl UsageStore for JsonFileStore {
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Option<UsageRecord>, UsageError> {
        match fs::read_to_string(&self.path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    async fn save(&self, record: &UsageRecord) -> Result<(), UsageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, serde_json::to_string(record)?).await?;
        Ok(())
    }
}

/// In-process store.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: std::sync::Mutex<Option<UsageRecord>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn with_record(record: UsageRecord) -> Self {
        Self {
            record: std::sync::Mutex::new(Some(record)),
        }
    }

    pub fn current(&self) -> Option<UsageRecord> {
        self.record.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[cfg(test)]
impl UsageStore for MemoryStore {
    async fn load(&self) -> Result<Option<UsageRecord>, UsageError> {
        Ok(self.current())
    }

    async fn save(&self, record: &UsageRecord) -> Result<(), UsageError> {
        *self.record.lock().unwrap_or_else(|e| e.into_inner()) = Some(record.clone());
        Ok(())
    }
}

/// Gatekeeper for metered calls. Owns every read and write of the record.
#[derive(Debug)]
pub struct BudgetTracker<S: UsageStore> {
    store: S,
    limits: BudgetLimits,
    period_format: String,
}

impl<S: UsageStore> BudgetTracker<S> {
    pub fn new(store: S, limits: BudgetLimits) -> Self {
        Self {
            store,
            limits,
            period_format: DEFAULT_PERIOD_FORMAT.to_string(),
        }
    }

    /// strftime pattern naming a period, e.g. `%Y-%m`.
    pub fn with_period_format(mut self, format: impl Into<String>) -> Self {
        self.period_format = format.into();
        self
    }

    pub fn limits(&self) -> BudgetLimits {
        self.limits
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn period_at(&self, now: DateTime<Local>) -> String {
        now.format(&self.period_format).to_string()
    }

    pub fn current_period(&self) -> String {
        self.period_at(Local::now())
    }

    /// Record for `period`, creating or rolling it over as needed.
    async fn load_for(&self, period: &str) -> Result<UsageRecord, UsageError> {
        match self.store.load().await? {
            Some(record) if record.last_reset == period => Ok(record),
            Some(stale) => {
                info!(
                    previous = %stale.last_reset,
                    current = %period,
                    openai_total_usd = stale.openai_total_usd,
                    polly_total_chars = stale.polly_total_chars,
                    "New usage period; resetting totals"
                );
                let record = UsageRecord::zeroed(period);
                self.store.save(&record).await?;
                Ok(record)
            }
            None => {
                info!(%period, "No usage record; starting from zero");
                let record = UsageRecord::zeroed(period);
                self.store.save(&record).await?;
                Ok(record)
            }
        }
    }

    /// Current totals for reporting. Read-only: a missing or stale record
    /// reads as zero and nothing is written.
    pub async fn snapshot(&self) -> Result<UsageRecord, UsageError> {
        self.snapshot_in(&self.current_period()).await
    }

    pub async fn snapshot_in(&self, period: &str) -> Result<UsageRecord, UsageError> {
        Ok(match self.store.load().await? {
            Some(record) if record.last_reset == period => record,
            _ => UsageRecord::zeroed(period),
        })
    }

    /// Account for `usage` if it fits under the monthly ceiling.
    ///
    /// Call this before the metered request. On `BudgetExceeded` nothing is
    /// persisted and the request must not be made.
    pub async fn check_and_log(&self, usage: MeteredUsage) -> Result<(), UsageError> {
        self.check_and_log_in(usage, &self.current_period()).await
    }

    #[instrument(level = "info", skip(self), fields(service = %usage.service()))]
    pub async fn check_and_log_in(
        &self,
        usage: MeteredUsage,
        period: &str,
    ) -> Result<(), UsageError> {
        let mut record = self.load_for(period).await?;

        match usage {
            MeteredUsage::OpenAiCost(cost) => {
                let new_total = record.openai_total_usd + cost;
                let limit = self.limits.openai_monthly_limit_usd;
                if new_total > limit {
                    warn!(new_total, limit, "OpenAI monthly budget exceeded");
                    return Err(UsageError::BudgetExceeded {
                        service: MeteredService::OpenAi,
                        attempted_total: new_total,
                        limit,
                    });
                }
                record.openai_total_usd = new_total;
            }
            MeteredUsage::PollyChars(chars) => {
                let new_total = record.polly_total_chars.saturating_add(chars);
                let limit = self.limits.polly_monthly_limit_chars;
                if new_total > limit {
                    warn!(new_total, limit, "Polly monthly character limit exceeded");
                    return Err(UsageError::BudgetExceeded {
                        service: MeteredService::Polly,
                        attempted_total: new_total as f64,
                        limit: limit as f64,
                    });
                }
                record.polly_total_chars = new_total;
            }
        }

        self.store.save(&record).await?;
        debug!(
            openai_total_usd = record.openai_total_usd,
            polly_total_chars = record.polly_total_chars,
            "Usage logged"
        );
        Ok(())
    }

    pub async fn check_and_log_openai(&self, estimated_cost_usd: f64) -> Result<(), UsageError> {
        self.check_and_log(MeteredUsage::OpenAiCost(estimated_cost_usd))
            .await
    }

    pub async fn check_and_log_polly(&self, chars: u64) -> Result<(), UsageError> {
        self.check_and_log(MeteredUsage::PollyChars(chars)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tracker(store: MemoryStore) -> BudgetTracker<MemoryStore> {
        BudgetTracker::new(
            store,
            BudgetLimits {
                openai_monthly_limit_usd: 3.0,
                polly_monthly_limit_chars: 1_000,
            },
        )
    }

    fn record(usd: f64, chars: u64, period: &str) -> UsageRecord {
        UsageRecord {
            openai_total_usd: usd,
            polly_total_chars: chars,
            last_reset: period.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fresh_store_starts_at_zero() {
        let t = tracker(MemoryStore::default());

        t.check_and_log_in(MeteredUsage::OpenAiCost(0.25), "2025-08")
            .await
            .unwrap();

        assert_eq!(t.store().current(), Some(record(0.25, 0, "2025-08")));
    }

    #[tokio::test]
    async fn test_reaching_limit_exactly_succeeds() {
        let t = tracker(MemoryStore::with_record(record(2.5, 0, "2025-08")));

        t.check_and_log_in(MeteredUsage::OpenAiCost(0.5), "2025-08")
            .await
            .unwrap();

        assert_eq!(t.store().current().unwrap().openai_total_usd, 3.0);
    }

    #[tokio::test]
    async fn test_exceeding_limit_fails_and_keeps_total() {
        let t = tracker(MemoryStore::with_record(record(2.5, 0, "2025-08")));

        let err = t
            .check_and_log_in(MeteredUsage::OpenAiCost(0.5 + f64::EPSILON * 4.0), "2025-08")
            .await
            .unwrap_err();

        assert!(err.is_budget_exceeded());
        assert_eq!(t.store().current(), Some(record(2.5, 0, "2025-08")));
    }

    #[tokio::test]
    async fn test_polly_limit_is_independent() {
        let t = tracker(MemoryStore::with_record(record(2.9, 990, "2025-08")));

        t.check_and_log_in(MeteredUsage::PollyChars(10), "2025-08")
            .await
            .unwrap();
        let err = t
            .check_and_log_in(MeteredUsage::PollyChars(1), "2025-08")
            .await
            .unwrap_err();

        match err {
            UsageError::BudgetExceeded { service, .. } => assert_eq!(service, MeteredService::Polly),
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(t.store().current(), Some(record(2.9, 1_000, "2025-08")));
    }

    #[tokio::test]
    async fn test_new_period_resets_totals() {
        let t = tracker(MemoryStore::with_record(record(2.9, 999, "2025-07")));

        t.check_and_log_in(MeteredUsage::OpenAiCost(1.0), "2025-08")
            .await
            .unwrap();

        assert_eq!(t.store().current(), Some(record(1.0, 0, "2025-08")));
    }

    #[tokio::test]
    async fn test_rejected_call_still_persists_rollover() {
        let t = tracker(MemoryStore::with_record(record(1.0, 0, "2025-07")));

        assert!(t
            .check_and_log_in(MeteredUsage::OpenAiCost(5.0), "2025-08")
            .await
            .is_err());

        assert_eq!(t.store().current(), Some(record(0.0, 0, "2025-08")));
    }

    #[tokio::test]
    async fn test_snapshot_never_writes() {
        let empty = tracker(MemoryStore::default());
        assert_eq!(empty.snapshot_in("2025-08").await.unwrap(), record(0.0, 0, "2025-08"));
        assert!(empty.store().current().is_none());

        let stale = tracker(MemoryStore::with_record(record(2.0, 50, "2025-07")));
        assert_eq!(stale.snapshot_in("2025-08").await.unwrap(), record(0.0, 0, "2025-08"));
        assert_eq!(stale.store().current(), Some(record(2.0, 50, "2025-07")));

        let live = tracker(MemoryStore::with_record(record(1.5, 7, "2025-08")));
        assert_eq!(live.snapshot_in("2025-08").await.unwrap(), record(1.5, 7, "2025-08"));
    }

    #[test]
    fn test_period_format() {
        let t = tracker(MemoryStore::default());
        let now = Local.with_ymd_and_hms(2025, 8, 7, 12, 0, 0).unwrap();
        assert_eq!(t.period_at(now), "2025-08");

        let t = t.with_period_format("%Y");
        assert_eq!(t.period_at(now), "2025");
    }

    #[tokio::test]
    async fn test_json_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/usage_tracker.json");
        let store = JsonFileStore::new(&path);

        assert!(store.load().await.unwrap().is_none());

        let t = BudgetTracker::new(&store, BudgetLimits::default());
        t.check_and_log_in(MeteredUsage::PollyChars(500), "2025-08")
            .await
            .unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["polly_total_chars"], 500);
        assert_eq!(value["openai_total_usd"], 0.0);
        assert_eq!(value["last_reset"], "2025-08");
    }

    #[tokio::test]
    async fn test_json_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("usage_tracker.json");
        std::fs::write(&path, "not json").unwrap();

        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, UsageError::Json(_)));
    }
}
