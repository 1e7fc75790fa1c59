//! Async analysis orchestrator.
//!
//! Pairs a [`DataManager`] with an [`AnalysisEngine`]. [`run_once`] performs a
//! single explicit refresh; [`start`] moves the orchestrator into a tokio task
//! that reloads on every tick and sends each fresh [`AnalysisReport`] through
//! an `mpsc` channel, so the presentation layer consumes reports without any
//! shared mutable state.
//!
//! [`run_once`]: AnalysisOrchestrator::run_once
//! [`start`]: AnalysisOrchestrator::start

use std::time::Duration;

use licence_analytics::analysis::{AnalysisEngine, AnalysisReport};
use licence_core::error::Result;
pub use licence_core::time_utils::ReferenceDate;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};

use crate::data_manager::DataManager;

// ── AnalysisOrchestrator ──────────────────────────────────────────────────────

pub struct AnalysisOrchestrator {
    engine: AnalysisEngine,
    data_manager: DataManager,
    reference_date: ReferenceDate,
}

impl AnalysisOrchestrator {
    pub fn new(
        engine: AnalysisEngine,
        data_manager: DataManager,
        reference_date: ReferenceDate,
    ) -> Self {
        Self {
            engine,
            data_manager,
            reference_date,
        }
    }

    /// Load the current records and run one analysis cycle over them.
    pub async fn run_once(&mut self) -> Result<AnalysisReport> {
        let loaded = self.data_manager.load().await?;
        if loaded.stale {
            tracing::warn!(
                path = %self.data_manager.data_path().display(),
                "analysing previous load; latest records unreadable"
            );
        }
        let as_of = self.reference_date.resolve();
        Ok(self
            .engine
            .analyze(&loaded.dataset, loaded.telemetry.as_ref(), as_of))
    }

    /// Start the reload loop.
    ///
    /// The first report is produced immediately, then one per `interval`.
    /// The loop exits when the receiver is dropped; the returned
    /// [`OrchestratorHandle`] stops it early.
    pub fn start(self, interval: Duration) -> (mpsc::Receiver<AnalysisReport>, OrchestratorHandle) {
        // A few reports of slack so a slow consumer does not stall the loop.
        let (tx, rx) = mpsc::channel(4);

        let handle = tokio::spawn(async move {
            self.reload_loop(interval, tx).await;
        });

        (rx, OrchestratorHandle { handle })
    }

    // ── Private implementation ────────────────────────────────────────────

    async fn reload_loop(mut self, interval: Duration, tx: mpsc::Sender<AnalysisReport>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if tx.is_closed() {
                tracing::debug!("report channel closed; exiting reload loop");
                break;
            }

            match self.run_once().await {
                Ok(report) => {
                    if tx.send(report).await.is_err() {
                        tracing::debug!("report receiver dropped; exiting reload loop");
                        break;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "analysis cycle failed; will retry next tick"),
            }
        }
    }
}

// ── OrchestratorHandle ────────────────────────────────────────────────────────

/// Handle to the background reload task.
pub struct OrchestratorHandle {
    handle: tokio::task::JoinHandle<()>,
}

impl OrchestratorHandle {
    /// Stop the reload loop immediately.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use licence_analytics::config::EngineConfig;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn seeded_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let users = serde_json::json!([
            {"id": "u1", "displayName": "Ann", "licences": "Microsoft 365 E5",
             "daysSinceSignIn": 45, "issueType": "None"},
            {"id": "u2", "displayName": "Bob", "licences": "Microsoft 365 E3",
             "accountEnabled": false, "issueType": "Disabled"}
        ]);
        fs::write(dir.path().join("users.json"), users.to_string()).unwrap();
        fs::write(
            dir.path().join("skus.json"),
            r#"[{"skuPartNumber": "SPE_E5", "title": "Microsoft 365 E5", "purchased": 5, "assigned": 1}]"#,
        )
        .unwrap();
        dir
    }

    fn orchestrator(path: &Path) -> AnalysisOrchestrator {
        let engine = AnalysisEngine::new(EngineConfig::default()).unwrap();
        let as_of = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        AnalysisOrchestrator::new(
            engine,
            DataManager::new(path, true),
            ReferenceDate::Fixed(as_of),
        )
    }

    // ── run_once ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_run_once_produces_report() {
        let dir = seeded_dir();
        let mut orch = orchestrator(dir.path());

        let report = orch.run_once().await.unwrap();
        assert_eq!(report.metadata.users_processed, 2);
        assert_eq!(report.metadata.as_of, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(report.kpis.disabled_with_licences, 1);
        assert_eq!(report.downgrades.recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_run_once_missing_directory_errors() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(&dir.path().join("absent"));
        assert!(orch.run_once().await.is_err());
    }

    // ── reload loop ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_start_sends_initial_report() {
        let dir = seeded_dir();
        let (mut rx, handle) = orchestrator(dir.path()).start(Duration::from_secs(60));

        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for report")
            .expect("channel closed before receiving report");
        assert_eq!(report.metadata.users_processed, 2);

        handle.abort();
    }

    #[tokio::test]
    async fn test_start_reloads_on_each_tick() {
        let dir = seeded_dir();
        let (mut rx, handle) = orchestrator(dir.path()).start(Duration::from_millis(20));

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.metadata.users_processed, 2);

        fs::write(dir.path().join("users.json"), "[]").unwrap();
        let mut latest = first;
        for _ in 0..50 {
            latest = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .unwrap()
                .unwrap();
            if latest.metadata.users_processed == 0 {
                break;
            }
        }
        assert_eq!(latest.metadata.users_processed, 0);

        handle.abort();
    }

    #[tokio::test]
    async fn test_loop_exits_when_receiver_dropped() {
        let dir = seeded_dir();
        let (rx, handle) = orchestrator(dir.path()).start(Duration::from_millis(10));
        drop(rx);

        for _ in 0..100 {
            if handle.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(handle.is_finished());
    }
}
