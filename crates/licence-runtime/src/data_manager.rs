//! Record loading for the analysis runtime.
//!
//! [`DataManager::load`] reads the licence dataset and the optional telemetry
//! concurrently on tokio's blocking pool. The licence load is retried with a
//! short back-off; when every attempt fails the last good dataset is reused
//! so a watch loop survives an extract that is mid-rewrite. Telemetry never
//! fails a load: an unreadable telemetry set is logged and treated as absent.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use licence_analytics::reader::{load_dataset, load_telemetry};
use licence_core::error::{LicenceError, Result};
use licence_core::models::{LicenceDataset, UsageTelemetry};
use tokio::task;

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Maximum number of licence-load attempts before falling back.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Back-off step between attempts: 0 ms, 100 ms, 200 ms.
const RETRY_STEP_MS: u64 = 100;

// ── LoadedData ────────────────────────────────────────────────────────────────

/// One cycle's worth of input records.
#[derive(Debug, Clone)]
pub struct LoadedData {
    pub dataset: LicenceDataset,
    pub telemetry: Option<UsageTelemetry>,
    /// `true` when the dataset is the previous good load rather than a fresh read.
    pub stale: bool,
}

// ── DataManager ───────────────────────────────────────────────────────────────

/// Loads record files from one data directory and remembers the last good
/// licence dataset.
///
/// # Example
/// ```no_run
/// use licence_runtime::data_manager::DataManager;
///
/// # async fn run() -> licence_core::error::Result<()> {
/// let mut mgr = DataManager::new("/var/lib/licence-intel", true);
/// let loaded = mgr.load().await?;
/// println!("users: {}", loaded.dataset.users.len());
/// # Ok(())
/// # }
/// ```
pub struct DataManager {
    data_path: PathBuf,
    with_telemetry: bool,
    last_good: Option<LicenceDataset>,
    last_error: Option<String>,
    last_successful_load: Option<Instant>,
}

impl DataManager {
    /// Create a manager for `data_path`. With `with_telemetry` off the
    /// telemetry files are never read.
    pub fn new(data_path: impl Into<PathBuf>, with_telemetry: bool) -> Self {
        Self {
            data_path: data_path.into(),
            with_telemetry,
            last_good: None,
            last_error: None,
            last_successful_load: None,
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    // ── Public API ────────────────────────────────────────────────────────

    /// Load the dataset and telemetry for one cycle.
    ///
    /// Errors only when every licence-load attempt failed and no previous
    /// good load exists.
    pub async fn load(&mut self) -> Result<LoadedData> {
        let (licence, telemetry) = tokio::join!(
            load_dataset_with_retry(self.data_path.clone()),
            load_telemetry_lenient(self.data_path.clone(), self.with_telemetry),
        );

        match licence {
            Ok(dataset) => {
                tracing::debug!(
                    users = dataset.users.len(),
                    skus = dataset.skus.len(),
                    telemetry = telemetry.is_some(),
                    "licence data loaded"
                );
                self.last_good = Some(dataset.clone());
                self.last_error = None;
                self.last_successful_load = Some(Instant::now());
                Ok(LoadedData {
                    dataset,
                    telemetry,
                    stale: false,
                })
            }
            Err(e) => {
                self.last_error = Some(e.to_string());
                match &self.last_good {
                    Some(previous) => {
                        tracing::warn!(error = %e, "licence load failed; reusing last good load");
                        Ok(LoadedData {
                            dataset: previous.clone(),
                            telemetry,
                            stale: true,
                        })
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Forget the last good load so the next failure surfaces as an error.
    pub fn invalidate(&mut self) {
        self.last_good = None;
        self.last_successful_load = None;
        tracing::debug!("last good load discarded");
    }

    /// Time since the last fresh licence load, or `None` if none succeeded.
    pub fn last_load_age(&self) -> Option<Duration> {
        self.last_successful_load.map(|ts| ts.elapsed())
    }

    /// Description of the most recent load failure, cleared on success.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

async fn load_dataset_with_retry(data_path: PathBuf) -> Result<LicenceDataset> {
    let mut last_err = None;

    for attempt in 0..MAX_RETRY_ATTEMPTS {
        if attempt > 0 {
            let sleep_ms = u64::from(attempt) * RETRY_STEP_MS;
            tracing::debug!(attempt, sleep_ms, "retrying licence load after back-off");
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }

        let path = data_path.clone();
        let result = task::spawn_blocking(move || load_dataset(&path))
            .await
            .map_err(|e| LicenceError::Other(e.into()))
            .and_then(|r| r);

        match result {
            Ok(dataset) => return Ok(dataset),
            Err(e) => {
                tracing::warn!(attempt, error = %e, "licence load attempt failed");
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| LicenceError::NoDataFiles(data_path)))
}

async fn load_telemetry_lenient(data_path: PathBuf, enabled: bool) -> Option<UsageTelemetry> {
    if !enabled {
        return None;
    }
    match task::spawn_blocking(move || load_telemetry(&data_path)).await {
        Ok(Ok(Some(telemetry))) => Some(telemetry),
        Ok(Ok(None)) => {
            tracing::debug!("no telemetry files present");
            None
        }
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "telemetry unreadable; continuing without it");
            None
        }
        Err(e) => {
            tracing::warn!(error = %e, "telemetry load task failed");
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
