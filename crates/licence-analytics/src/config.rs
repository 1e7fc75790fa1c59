//! Engine configuration: the lookup tables and thresholds every component is
//! constructed from. Every field defaults to the built-in tables, so a config
//! file only needs to carry what it overrides.

use std::path::Path;

use licence_core::error::{LicenceError, Result};
use licence_core::pricing::{default_standard_pricing, StandardPrice};
use licence_core::sku::SkuCatalog;
use serde::{Deserialize, Serialize};

use crate::alerts::AlertThresholds;
use crate::downgrade::DowngradeRules;
use crate::usage_profile::UsageRules;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub catalog: SkuCatalog,
    /// Fallback list prices, most specific keyword first.
    pub standard_pricing: Vec<StandardPrice>,
    pub alerts: AlertThresholds,
    pub downgrade: DowngradeRules,
    pub usage: UsageRules,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            catalog: SkuCatalog::builtin(),
            standard_pricing: default_standard_pricing(),
            alerts: AlertThresholds::default(),
            downgrade: DowngradeRules::default(),
            usage: UsageRules::default(),
        }
    }
}

impl EngineConfig {
    /// Read a JSON config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| LicenceError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = serde_json::from_str(&text)
            .map_err(|e| LicenceError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// The file at `path` when given, otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(p),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        let d = &self.downgrade;
        if d.e5_min_inactive_days > d.e5_max_inactive_days {
            return Err(LicenceError::Config(format!(
                "downgrade.e5MinInactiveDays ({}) exceeds e5MaxInactiveDays ({})",
                d.e5_min_inactive_days, d.e5_max_inactive_days
            )));
        }
        let a = &self.alerts;
        if a.savings_warning_annual > a.savings_critical_annual {
            return Err(LicenceError::Config(
                "alerts.savingsWarningAnnual exceeds savingsCriticalAnnual".to_string(),
            ));
        }
        if a.renewal_critical_days > a.renewal_warning_days {
            return Err(LicenceError::Config(
                "alerts.renewalCriticalDays exceeds renewalWarningDays".to_string(),
            ));
        }
        if let Some(p) = self.standard_pricing.iter().find(|p| p.monthly_cost < 0.0) {
            return Err(LicenceError::Config(format!(
                "standardPricing entry \"{}\" has a negative cost",
                p.keyword
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use licence_core::sku::SkuTier;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("engine.json");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_default_uses_builtin_tables() {
        let c = EngineConfig::default();
        assert_eq!(c.catalog.friendly_name("SPE_E5"), "Microsoft 365 E5");
        assert!(!c.standard_pricing.is_empty());
        assert_eq!(c.downgrade.e5_min_inactive_days, 30);
    }

    #[test]
    fn test_load_or_default_without_path() {
        let c = EngineConfig::load_or_default(None).unwrap();
        assert_eq!(c.usage.underutilised_pct, 30);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"{
                "alerts": { "savingsCriticalAnnual": 80000 },
                "downgrade": { "frontlineKeywords": ["depot"] },
                "catalog": { "viralSeatThreshold": 5000 }
            }"#,
        );
        let c = EngineConfig::load_from(&path).unwrap();
        assert_eq!(c.alerts.savings_critical_annual, 80_000.0);
        assert_eq!(c.alerts.savings_warning_annual, 10_000.0);
        assert_eq!(c.downgrade.frontline_keywords, vec!["depot".to_string()]);
        assert_eq!(c.downgrade.e5_max_inactive_days, 89);
        assert_eq!(c.catalog.classify("SPE_E3", Some(5_000)).tier, SkuTier::Viral);
        assert!(!c.standard_pricing.is_empty());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "{ not json");
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(LicenceError::Config(_))
        ));
    }

    #[test]
    fn test_inverted_window_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"{ "downgrade": { "e5MinInactiveDays": 60, "e5MaxInactiveDays": 40 } }"#,
        );
        assert!(matches!(
            EngineConfig::load_from(&path),
            Err(LicenceError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_file_read_error() {
        let err = EngineConfig::load_from(Path::new("/nonexistent/engine.json")).unwrap_err();
        assert!(matches!(err, LicenceError::FileRead { .. }));
    }
}
