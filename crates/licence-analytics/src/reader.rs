//! Record file discovery and loading.
//!
//! A data directory holds one or more files per record kind. A file belongs to
//! a kind when its stem is the kind's stem, optionally followed by `-` or `_`
//! and a suffix (`users.json`, `users-2024-02.jsonl`, `pricing_uk.json`).
//! `.json` files hold a JSON array; `.jsonl` files hold one record per line.

use std::io::BufRead;
use std::path::{Path, PathBuf};

use licence_core::error::{LicenceError, Result};
use licence_core::models::{LicenceDataset, UsageTelemetry};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

// ── Record kinds ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Users,
    Skus,
    Pricing,
    Snapshots,
    UsageReports,
    AppUsage,
}

impl RecordKind {
    pub const LICENCE: [RecordKind; 4] = [
        RecordKind::Users,
        RecordKind::Skus,
        RecordKind::Pricing,
        RecordKind::Snapshots,
    ];

    pub const TELEMETRY: [RecordKind; 2] = [RecordKind::UsageReports, RecordKind::AppUsage];

    pub fn stem(&self) -> &'static str {
        match self {
            RecordKind::Users => "users",
            RecordKind::Skus => "skus",
            RecordKind::Pricing => "pricing",
            RecordKind::Snapshots => "snapshots",
            RecordKind::UsageReports => "usage_reports",
            RecordKind::AppUsage => "app_usage",
        }
    }

    /// Whether `path` is a record file of this kind.
    pub fn matches(&self, path: &Path) -> bool {
        let ext_ok = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json") | Some("jsonl")
        );
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            return false;
        };
        let stem = stem.to_lowercase();
        let kind = self.stem();
        ext_ok
            && (stem == kind
                || stem
                    .strip_prefix(kind)
                    .is_some_and(|rest| rest.starts_with('-') || rest.starts_with('_')))
    }
}

// ── Discovery ─────────────────────────────────────────────────────────────────

/// All files of `kind` under `data_path`, recursively, sorted by path.
pub fn find_record_files(data_path: &Path, kind: RecordKind) -> Vec<PathBuf> {
    if !data_path.exists() {
        warn!("Data path does not exist: {}", data_path.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(data_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && kind.matches(entry.path()))
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Load and concatenate every file of `kind`.
///
/// Malformed JSONL lines are skipped with a warning; a malformed `.json`
/// array fails the whole load.
pub fn load_records<T: DeserializeOwned>(data_path: &Path, kind: RecordKind) -> Result<Vec<T>> {
    let files = find_record_files(data_path, kind);
    let mut records = Vec::new();
    for file in &files {
        let is_lines = file.extension().and_then(|e| e.to_str()) == Some("jsonl");
        if is_lines {
            records.extend(read_jsonl::<T>(file)?);
        } else {
            records.extend(read_json_array::<T>(file)?);
        }
    }
    debug!(
        kind = kind.stem(),
        files = files.len(),
        records = records.len(),
        "loaded record files"
    );
    Ok(records)
}

/// Load the licence dataset from `data_path`.
///
/// Fails when the directory is missing or contains no licence record files
/// at all. Individual missing kinds load as empty with a warning.
pub fn load_dataset(data_path: &Path) -> Result<LicenceDataset> {
    if !data_path.is_dir() {
        return Err(LicenceError::DataPathNotFound(data_path.to_path_buf()));
    }
    let present: Vec<RecordKind> = RecordKind::LICENCE
        .into_iter()
        .filter(|k| !find_record_files(data_path, *k).is_empty())
        .collect();
    if present.is_empty() {
        return Err(LicenceError::NoDataFiles(data_path.to_path_buf()));
    }
    for kind in RecordKind::LICENCE.iter().filter(|k| !present.contains(k)) {
        warn!(kind = kind.stem(), "no record files found; treating as empty");
    }

    Ok(LicenceDataset {
        users: load_records(data_path, RecordKind::Users)?,
        skus: load_records(data_path, RecordKind::Skus)?,
        pricing: load_records(data_path, RecordKind::Pricing)?,
        snapshots: load_records(data_path, RecordKind::Snapshots)?,
    })
}

/// Load optional telemetry. `Ok(None)` when neither telemetry kind exists.
pub fn load_telemetry(data_path: &Path) -> Result<Option<UsageTelemetry>> {
    if !data_path.is_dir() {
        return Err(LicenceError::DataPathNotFound(data_path.to_path_buf()));
    }
    let any = RecordKind::TELEMETRY
        .iter()
        .any(|k| !find_record_files(data_path, *k).is_empty());
    if !any {
        return Ok(None);
    }
    Ok(Some(UsageTelemetry {
        reports: load_records(data_path, RecordKind::UsageReports)?,
        app_usage: load_records(data_path, RecordKind::AppUsage)?,
    }))
}

// ── Internal helpers ──────────────────────────────────────────────────────────

fn read_json_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let text = std::fs::read_to_string(path).map_err(|source| LicenceError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text).map_err(|source| LicenceError::RecordParse {
        path: path.to_path_buf(),
        source,
    })
}

fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|source| LicenceError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = std::io::BufReader::new(file);
    let mut records = Vec::new();
    let mut skipped = 0usize;

    for (idx, line_result) in reader.lines().enumerate() {
        let line = line_result.map_err(|source| LicenceError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => {
                skipped += 1;
                warn!(
                    "Skipping malformed record at {}:{}: {}",
                    path.display(),
                    idx + 1,
                    e
                );
            }
        }
    }

    if skipped > 0 {
        debug!(file = %path.display(), skipped, "malformed lines skipped");
    }
    Ok(records)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
