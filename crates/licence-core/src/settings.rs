use clap::Parser;
use std::path::PathBuf;

use crate::error::Result;
use crate::time_utils::{parse_date, resolve_timezone, ReferenceDate, DEFAULT_TIMEZONE};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Licence utilisation, hygiene and right-sizing intelligence
#[derive(Parser, Debug, Clone)]
#[command(
    name = "licence-intel",
    about = "Licence utilisation, hygiene and right-sizing intelligence",
    version
)]
pub struct Settings {
    /// Directory containing the licence record files
    #[arg(long, env = "LICENCE_INTEL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Engine configuration file (JSON); built-in tables when absent
    #[arg(long, env = "LICENCE_INTEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Reference date for renewal windows (YYYY-MM-DD); defaults to today
    #[arg(long)]
    pub as_of: Option<String>,

    /// Reporting timezone ("auto" detects the system timezone)
    #[arg(long, default_value = DEFAULT_TIMEZONE)]
    pub timezone: String,

    /// Output format
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Reload and re-analyse every N seconds (1-3600)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=3600))]
    pub watch: Option<u64>,

    /// Skip loading app-usage telemetry
    #[arg(long)]
    pub no_telemetry: bool,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Settings {
    /// Parse the process arguments.
    pub fn load() -> Self {
        Self::parse()
    }

    /// Parse an explicit argument list (first element is the program name).
    pub fn load_from_args<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Self::parse_from(args)
    }

    /// `--debug` overrides `--log-level`.
    pub fn effective_log_level(&self) -> &str {
        if self.debug {
            "DEBUG"
        } else {
            &self.log_level
        }
    }

    pub fn wants_json(&self) -> bool {
        self.format == "json"
    }

    /// The "as of" date: `--as-of` when given, otherwise today in the
    /// configured timezone, re-read on every resolve.
    pub fn reference_date(&self) -> Result<ReferenceDate> {
        match &self.as_of {
            Some(s) => Ok(ReferenceDate::Fixed(parse_date(s)?)),
            None => Ok(ReferenceDate::Today(resolve_timezone(&self.timezone)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::error::LicenceError;

    fn parse(args: &[&str]) -> Settings {
        let mut full = vec!["licence-intel"];
        full.extend_from_slice(args);
        Settings::load_from_args(full)
    }

    #[test]
    fn test_defaults() {
        let s = parse(&[]);
        assert_eq!(s.timezone, "Europe/London");
        assert_eq!(s.format, "text");
        assert_eq!(s.log_level, "INFO");
        assert!(s.watch.is_none());
        assert!(!s.no_telemetry);
        assert!(!s.wants_json());
    }

    #[test]
    fn test_explicit_values() {
        let s = parse(&[
            "--data-dir",
            "/tmp/extract",
            "--format",
            "json",
            "--as-of",
            "2024-03-01",
            "--watch",
            "60",
            "--no-telemetry",
        ]);
        assert_eq!(s.data_dir, Some(PathBuf::from("/tmp/extract")));
        assert!(s.wants_json());
        assert_eq!(s.watch, Some(60));
        assert!(s.no_telemetry);
        assert_eq!(
            s.reference_date().unwrap(),
            ReferenceDate::Fixed(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
    }

    #[test]
    fn test_invalid_format_rejected() {
        let result = Settings::try_parse_from(["licence-intel", "--format", "xml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_watch_out_of_range_rejected() {
        let result = Settings::try_parse_from(["licence-intel", "--watch", "0"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_debug_overrides_log_level() {
        let s = parse(&["--log-level", "ERROR", "--debug"]);
        assert_eq!(s.effective_log_level(), "DEBUG");
    }

    #[test]
    fn test_reference_date_defaults_to_today_in_timezone() {
        let s = parse(&["--timezone", "Asia/Tokyo"]);
        assert_eq!(
            s.reference_date().unwrap(),
            ReferenceDate::Today(chrono_tz::Asia::Tokyo)
        );
    }

    #[test]
    fn test_invalid_as_of() {
        let s = parse(&["--as-of", "yesterday"]);
        assert!(matches!(s.reference_date(), Err(LicenceError::InvalidDate(_))));
    }

    #[test]
    fn test_invalid_timezone_surfaces_error() {
        let s = parse(&["--timezone", "Nowhere/Special"]);
        assert!(matches!(
            s.reference_date(),
            Err(LicenceError::InvalidTimezone(_))
        ));
    }
}
