//! SKU classification.
//!
//! Maps a vendor SKU identifier to a [`SkuTier`] and a friendly name. The
//! tier decides whether a SKU takes part in seat and spend aggregates; every
//! component must ask the same [`SkuCatalog`] so that decision stays
//! consistent across the engine.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Seat count at or above which a SKU is treated as an unlimited/trial SKU.
pub const DEFAULT_VIRAL_SEAT_THRESHOLD: u64 = 100_000;

/// Classification bucket for a SKU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkuTier {
    CorePaid,
    AddOn,
    Free,
    Viral,
}

impl SkuTier {
    /// Free and viral SKUs never enter seat or spend aggregates.
    pub fn is_excluded_from_aggregates(&self) -> bool {
        matches!(self, SkuTier::Free | SkuTier::Viral)
    }
}

/// Result of [`SkuCatalog::classify`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuClassification {
    pub tier: SkuTier,
    pub friendly_name: String,
    pub is_excluded_from_aggregates: bool,
}

/// A keyword that, when found in a SKU identifier, forces a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkuPattern {
    pub keyword: String,
    pub tier: SkuTier,
}

impl SkuPattern {
    fn new(keyword: &str, tier: SkuTier) -> Self {
        Self {
            keyword: keyword.to_uppercase(),
            tier,
        }
    }
}

/// Suite level of a licence, as far as right-sizing is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuiteLevel {
    E5,
    E3,
    F3,
}

/// Name fragments identifying each suite level.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteMarkers {
    pub e5: Vec<String>,
    pub e3: Vec<String>,
    pub f3: Vec<String>,
}

impl Default for SuiteMarkers {
    fn default() -> Self {
        let up = |xs: &[&str]| xs.iter().map(|s| s.to_uppercase()).collect();
        Self {
            e5: up(&[
                "Microsoft 365 E5",
                "Office 365 E5",
                "M365 E5",
                "O365 E5",
                "SPE_E5",
                "ENTERPRISEPREMIUM",
            ]),
            e3: up(&[
                "Microsoft 365 E3",
                "Office 365 E3",
                "M365 E3",
                "O365 E3",
                "SPE_E3",
                "ENTERPRISEPACK",
            ]),
            f3: up(&[
                "Microsoft 365 F3",
                "Office 365 F3",
                "M365 F3",
                "SPE_F1",
                "DESKLESSPACK",
            ]),
        }
    }
}

/// Static classification tables, constructed once and passed to every
/// component that needs them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SkuCatalog {
    /// SKU identifier → friendly name.
    pub friendly_names: HashMap<String, String>,
    /// Viral/free patterns, checked first.
    pub excluded_patterns: Vec<SkuPattern>,
    /// Add-on patterns, checked after the excluded list.
    pub addon_keywords: Vec<String>,
    pub viral_seat_threshold: u64,
    pub suite_markers: SuiteMarkers,
}

impl Default for SkuCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

const FRIENDLY_NAMES: &[(&str, &str)] = &[
    ("SPE_E5", "Microsoft 365 E5"),
    ("SPE_E3", "Microsoft 365 E3"),
    ("SPE_F1", "Microsoft 365 F3"),
    ("ENTERPRISEPREMIUM", "Office 365 E5"),
    ("ENTERPRISEPACK", "Office 365 E3"),
    ("STANDARDPACK", "Office 365 E1"),
    ("DESKLESSPACK", "Office 365 F3"),
    ("SPB", "Microsoft 365 Business Premium"),
    ("O365_BUSINESS_PREMIUM", "Microsoft 365 Business Standard"),
    ("O365_BUSINESS_ESSENTIALS", "Microsoft 365 Business Basic"),
    ("EMS", "Enterprise Mobility + Security E3"),
    ("EMSPREMIUM", "Enterprise Mobility + Security E5"),
    ("AAD_PREMIUM", "Microsoft Entra ID P1"),
    ("AAD_PREMIUM_P2", "Microsoft Entra ID P2"),
    ("ATP_ENTERPRISE", "Microsoft Defender for Office 365 (Plan 1)"),
    ("POWER_BI_PRO", "Power BI Pro"),
    ("POWER_BI_STANDARD", "Power BI (free)"),
    ("MCOMEETADV", "Microsoft 365 Audio Conferencing"),
    ("MCOEV", "Microsoft Teams Phone Standard"),
    ("MCOPSTNC", "Communications Credits"),
    ("VISIOCLIENT", "Visio Plan 2"),
    ("PROJECTPREMIUM", "Project Plan 5"),
    ("PROJECTPROFESSIONAL", "Project Plan 3"),
    ("FLOW_FREE", "Power Automate Free"),
    ("POWERAPPS_VIRAL", "Power Apps Plan 2 Trial"),
    ("TEAMS_EXPLORATORY", "Microsoft Teams Exploratory"),
    ("STREAM", "Microsoft Stream Trial"),
    ("WINDOWS_STORE", "Windows Store for Business"),
    ("CCIBOTS_PRIVPREV_VIRAL", "Power Virtual Agents Viral Trial"),
    ("RIGHTSMANAGEMENT_ADHOC", "Rights Management Adhoc"),
];

const EXCLUDED_PATTERNS: &[(&str, SkuTier)] = &[
    ("VIRAL", SkuTier::Viral),
    ("TRIAL", SkuTier::Viral),
    ("EXPLORATORY", SkuTier::Viral),
    ("FREE", SkuTier::Free),
    ("POWER_BI_STANDARD", SkuTier::Free),
    ("STREAM", SkuTier::Free),
    ("WINDOWS_STORE", SkuTier::Free),
    ("RIGHTSMANAGEMENT_ADHOC", SkuTier::Free),
    ("MCOPSTNC", SkuTier::Free),
];

const ADDON_KEYWORDS: &[&str] = &[
    "MCOMEETADV",
    "MCOEV",
    "ATP_",
    "POWER_BI_PRO",
    "VISIO",
    "PROJECT",
    "EMS",
    "AAD_PREMIUM",
    "INTUNE",
    "DEFENDER",
    "TEAMS_PREMIUM",
];

impl SkuCatalog {
    /// The built-in Microsoft 365 tables.
    pub fn builtin() -> Self {
        Self {
            friendly_names: FRIENDLY_NAMES
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            excluded_patterns: EXCLUDED_PATTERNS
                .iter()
                .map(|(k, t)| SkuPattern::new(k, *t))
                .collect(),
            addon_keywords: ADDON_KEYWORDS.iter().map(|k| k.to_uppercase()).collect(),
            viral_seat_threshold: DEFAULT_VIRAL_SEAT_THRESHOLD,
            suite_markers: SuiteMarkers::default(),
        }
    }

    /// Classify a SKU identifier.
    ///
    /// Viral/free patterns win over add-on patterns; anything unmatched is
    /// core-paid. A `purchased` count at or above the viral threshold turns a
    /// paid classification into [`SkuTier::Viral`].
    pub fn classify(&self, sku_id: &str, purchased: Option<u64>) -> SkuClassification {
        let upper = sku_id.to_uppercase();

        let mut tier = self
            .excluded_patterns
            .iter()
            .find(|p| upper.contains(&p.keyword.to_uppercase()))
            .map(|p| p.tier)
            .unwrap_or_else(|| {
                if self
                    .addon_keywords
                    .iter()
                    .any(|k| starts_token(&upper, &k.to_uppercase()))
                {
                    SkuTier::AddOn
                } else {
                    SkuTier::CorePaid
                }
            });

        if !tier.is_excluded_from_aggregates()
            && purchased.is_some_and(|p| p >= self.viral_seat_threshold)
        {
            tier = SkuTier::Viral;
        }

        SkuClassification {
            tier,
            friendly_name: self.friendly_name(sku_id),
            is_excluded_from_aggregates: tier.is_excluded_from_aggregates(),
        }
    }

    /// `true` when `licence` is an add-on SKU identifier, or the friendly
    /// name of one.
    pub fn is_addon(&self, licence: &str) -> bool {
        let licence = licence.trim();
        if self.classify(licence, None).tier == SkuTier::AddOn {
            return true;
        }
        self.friendly_names.iter().any(|(id, name)| {
            name.eq_ignore_ascii_case(licence) && self.classify(id, None).tier == SkuTier::AddOn
        })
    }

    /// Shorthand for `classify(..).is_excluded_from_aggregates`.
    pub fn is_excluded(&self, sku_id: &str, purchased: Option<u64>) -> bool {
        self.classify(sku_id, purchased).is_excluded_from_aggregates
    }

    /// Friendly name for a SKU identifier; unmapped identifiers pass through.
    pub fn friendly_name(&self, sku_id: &str) -> String {
        let trimmed = sku_id.trim();
        if let Some(name) = self.friendly_names.get(trimmed) {
            return name.clone();
        }
        let upper = trimmed.to_uppercase();
        self.friendly_names
            .get(&upper)
            .cloned()
            .unwrap_or_else(|| sku_id.to_string())
    }

    /// Suite level of a licence name or SKU identifier, if any.
    ///
    /// Both the raw name and its friendly name are searched, so part numbers
    /// and display titles resolve alike. E5 is checked before E3 before F3.
    pub fn suite_level(&self, licence: &str) -> Option<SuiteLevel> {
        let haystack = format!(
            "{} | {}",
            licence.to_uppercase(),
            self.friendly_name(licence).to_uppercase()
        );
        let hit = |markers: &[String]| markers.iter().any(|m| haystack.contains(&m.to_uppercase()));

        if hit(&self.suite_markers.e5) {
            Some(SuiteLevel::E5)
        } else if hit(&self.suite_markers.e3) {
            Some(SuiteLevel::E3)
        } else if hit(&self.suite_markers.f3) {
            Some(SuiteLevel::F3)
        } else {
            None
        }
    }
}

/// `needle` occurs in `haystack` at the start or right after a
/// non-alphanumeric separator such as `_` or a space.
fn starts_token(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(i, _)| {
        haystack[..i]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_ascii_alphanumeric())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> SkuCatalog {
        SkuCatalog::builtin()
    }

    // ── Tier patterns ───────────────────────────────────────────────────────

    #[test]
    fn test_core_paid_default() {
        let c = catalog().classify("SPE_E3", Some(500));
        assert_eq!(c.tier, SkuTier::CorePaid);
        assert_eq!(c.friendly_name, "Microsoft 365 E3");
        assert!(!c.is_excluded_from_aggregates);
    }

    #[test]
    fn test_viral_patterns_excluded() {
        for id in ["POWERAPPS_VIRAL", "CCIBOTS_PRIVPREV_VIRAL", "TEAMS_EXPLORATORY", "Dynamics Trial"] {
            let c = catalog().classify(id, None);
            assert_eq!(c.tier, SkuTier::Viral, "{id}");
            assert!(c.is_excluded_from_aggregates, "{id}");
        }
    }

    #[test]
    fn test_free_patterns_excluded() {
        for id in ["FLOW_FREE", "POWER_BI_STANDARD", "WINDOWS_STORE", "STREAM"] {
            let c = catalog().classify(id, Some(10));
            assert_eq!(c.tier, SkuTier::Free, "{id}");
            assert!(c.is_excluded_from_aggregates, "{id}");
        }
    }

    #[test]
    fn test_addon_patterns() {
        for id in ["MCOMEETADV", "POWER_BI_PRO", "VISIOCLIENT", "EMSPREMIUM", "ATP_ENTERPRISE"] {
            let c = catalog().classify(id, Some(50));
            assert_eq!(c.tier, SkuTier::AddOn, "{id}");
            assert!(!c.is_excluded_from_aggregates, "{id}");
        }
    }

    #[test]
    fn test_addon_keywords_anchor_on_token_start() {
        let cat = catalog();
        for id in ["CONTOSO_SYSTEMS", "XPROJECTX", "SOMEVISIO"] {
            assert_eq!(cat.classify(id, None).tier, SkuTier::CorePaid, "{id}");
        }
        for id in ["EMS", "CONTOSO_EMS_ADDON", "Microsoft DEFENDER for Endpoint"] {
            assert_eq!(cat.classify(id, None).tier, SkuTier::AddOn, "{id}");
        }
    }

    #[test]
    fn test_is_addon_by_friendly_name() {
        let cat = catalog();
        assert!(cat.is_addon("EMSPREMIUM"));
        assert!(cat.is_addon("Enterprise Mobility + Security E5"));
        assert!(cat.is_addon("power bi pro"));
        assert!(!cat.is_addon("Microsoft 365 E5"));
        assert!(!cat.is_addon("SPE_E3"));
    }

    #[test]
    fn test_excluded_patterns_checked_before_addons() {
        // Matches both "PROJECT" (add-on) and "TRIAL" (viral).
        let c = catalog().classify("PROJECT_PLAN_TRIAL", None);
        assert_eq!(c.tier, SkuTier::Viral);
    }

    #[test]
    fn test_pattern_match_is_case_insensitive() {
        assert_eq!(catalog().classify("flow_free", None).tier, SkuTier::Free);
    }

    // ── Seat-count heuristic ────────────────────────────────────────────────

    #[test]
    fn test_huge_seat_count_forces_viral() {
        let c = catalog().classify("SPE_E3", Some(100_000));
        assert_eq!(c.tier, SkuTier::Viral);
        assert!(c.is_excluded_from_aggregates);

        let c = catalog().classify("MCOMEETADV", Some(1_000_000));
        assert_eq!(c.tier, SkuTier::Viral);
    }

    #[test]
    fn test_seat_count_below_threshold_unchanged() {
        let c = catalog().classify("SPE_E3", Some(99_999));
        assert_eq!(c.tier, SkuTier::CorePaid);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let mut cat = catalog();
        cat.viral_seat_threshold = 1_000;
        assert!(cat.is_excluded("SPE_E3", Some(1_000)));
        assert!(!cat.is_excluded("SPE_E3", Some(999)));
    }

    // ── Friendly names ──────────────────────────────────────────────────────

    #[test]
    fn test_friendly_name_unmapped_passes_through() {
        assert_eq!(catalog().friendly_name("CONTOSO_CUSTOM"), "CONTOSO_CUSTOM");
        assert_eq!(catalog().classify("", None).friendly_name, "");
    }

    #[test]
    fn test_friendly_name_case_insensitive_key() {
        assert_eq!(catalog().friendly_name("spe_e5"), "Microsoft 365 E5");
    }

    #[test]
    fn test_classification_is_deterministic() {
        let cat = catalog();
        for id in ["SPE_E5", "FLOW_FREE", "MCOEV", "unknown", ""] {
            assert_eq!(cat.classify(id, Some(25)), cat.classify(id, Some(25)));
        }
    }

    // ── Suite levels ────────────────────────────────────────────────────────

    #[test]
    fn test_suite_level_from_titles_and_part_numbers() {
        let cat = catalog();
        assert_eq!(cat.suite_level("Microsoft 365 E5"), Some(SuiteLevel::E5));
        assert_eq!(cat.suite_level("ENTERPRISEPREMIUM"), Some(SuiteLevel::E5));
        assert_eq!(cat.suite_level("SPE_E3"), Some(SuiteLevel::E3));
        assert_eq!(cat.suite_level("office 365 e3"), Some(SuiteLevel::E3));
        assert_eq!(cat.suite_level("Microsoft 365 F3"), Some(SuiteLevel::F3));
        assert_eq!(cat.suite_level("Power BI Pro"), None);
    }

    #[test]
    fn test_suite_level_ignores_security_e5_addon() {
        assert_eq!(catalog().suite_level("EMSPREMIUM"), None);
    }
}
