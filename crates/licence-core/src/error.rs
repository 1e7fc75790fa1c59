use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the licence intelligence crates.
///
/// The analytics components themselves are infallible; these variants come
/// from loading records, reading configuration and resolving settings.
#[derive(Error, Debug)]
pub enum LicenceError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// A JSON record file could not be parsed.
    #[error("Failed to parse records in {path}: {source}")]
    RecordParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A date string was not in `YYYY-MM-DD` form.
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// A timezone name is not a recognised IANA zone.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// The expected data directory does not exist.
    #[error("Data path not found: {0}")]
    DataPathNotFound(PathBuf),

    /// No licence record files were found under the given directory.
    #[error("No licence record files found in {0}")]
    NoDataFiles(PathBuf),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Catch-all for errors from third-party crates via `anyhow`.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias used throughout the licence crates.
pub type Result<T> = std::result::Result<T, LicenceError>;
