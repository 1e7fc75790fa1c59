use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ── Logging bootstrap ──────────────────────────────────────────────────────────

/// Map a `--log-level` name onto a tracing filter directive.
///
/// `CRITICAL` has no tracing counterpart and maps to `error`; anything
/// unrecognised maps to `info`.
pub fn filter_directive(log_level: &str) -> &'static str {
    match log_level.to_uppercase().as_str() {
        "DEBUG" => "debug",
        "INFO" => "info",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

/// Initialise the global `tracing` subscriber.
///
/// Everything goes to stderr so stdout carries only the report.
pub fn setup_logging(log_level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter_directive(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;

    Ok(())
}

// ── Data-path discovery ────────────────────────────────────────────────────────

/// `~/.licence-intel/data`, or `./.licence-intel/data` when no home
/// directory can be determined.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".licence-intel")
        .join("data")
}

/// The explicit `--data-dir` when given, otherwise [`default_data_dir`].
pub fn resolve_data_dir(explicit: Option<&PathBuf>) -> PathBuf {
    explicit.cloned().unwrap_or_else(default_data_dir)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
