//! E5-exclusive feature usage attribution.
//!
//! Per-feature telemetry is not available, so usage is inferred from the
//! user's department and job title, sign-in recency and chat-app activity.
//! Every verdict is an estimate carrying a confidence score, never a fact.
//! The inference sits behind [`FeatureUsageStrategy`] so it can be replaced
//! without touching the profile aggregation around it.

use licence_core::error::{LicenceError, Result};
use licence_core::models::{CoreApp, LicenceUser};
use regex::Regex;
use serde::{Deserialize, Serialize};

// ── Feature catalogue ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum E5Feature {
    ThreatProtection,
    InformationProtection,
    CloudAppSecurity,
    EDiscovery,
    Compliance,
    PowerBiPro,
    AudioConferencing,
    PhoneSystem,
    PersonalAnalytics,
}

impl E5Feature {
    pub const ALL: [E5Feature; 9] = [
        E5Feature::ThreatProtection,
        E5Feature::InformationProtection,
        E5Feature::CloudAppSecurity,
        E5Feature::EDiscovery,
        E5Feature::Compliance,
        E5Feature::PowerBiPro,
        E5Feature::AudioConferencing,
        E5Feature::PhoneSystem,
        E5Feature::PersonalAnalytics,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            E5Feature::ThreatProtection => "Defender for Office 365 / Endpoint",
            E5Feature::InformationProtection => "Information Protection",
            E5Feature::CloudAppSecurity => "Cloud App Security",
            E5Feature::EDiscovery => "eDiscovery (Premium)",
            E5Feature::Compliance => "Advanced Compliance",
            E5Feature::PowerBiPro => "Power BI Pro",
            E5Feature::AudioConferencing => "Audio Conferencing",
            E5Feature::PhoneSystem => "Phone System",
            E5Feature::PersonalAnalytics => "Personal Analytics",
        }
    }
}

// ── Strategy seam ─────────────────────────────────────────────────────────────

/// What a strategy may look at for one user.
#[derive(Debug, Clone, Copy)]
pub struct FeatureContext<'a> {
    pub user: &'a LicenceUser,
    /// Apps with any activity flag set; empty without telemetry.
    pub apps_used: &'a [CoreApp],
    pub telemetry_available: bool,
}

impl FeatureContext<'_> {
    pub fn uses(&self, app: CoreApp) -> bool {
        self.apps_used.contains(&app)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureVerdict {
    pub used: bool,
    /// 0–100 heuristic certainty.
    pub confidence: u8,
    /// Which signals produced the verdict.
    pub basis: String,
}

/// Maps a user and their context to a used/unused verdict per feature.
pub trait FeatureUsageStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn assess(&self, feature: E5Feature, ctx: &FeatureContext<'_>) -> FeatureVerdict;
}

// ── Keyword heuristic ─────────────────────────────────────────────────────────

/// Configurable attribution rule for one feature. All present conditions
/// must hold for the feature to count as used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRule {
    pub feature: E5Feature,
    /// Whole-word, case-insensitive matches against department or job title.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Maximum days since last sign-in.
    #[serde(default)]
    pub recent_sign_in_days: Option<u32>,
    /// Requires detected chat/meetings app activity.
    #[serde(default)]
    pub requires_chat_app: bool,
    pub confidence: u8,
}

impl FeatureRule {
    fn new(feature: E5Feature, keywords: &[&str], recent: Option<u32>, chat: bool, confidence: u8) -> Self {
        Self {
            feature,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            recent_sign_in_days: recent,
            requires_chat_app: chat,
            confidence,
        }
    }
}

/// Built-in attribution rules, one per catalogue feature.
pub fn default_feature_rules() -> Vec<FeatureRule> {
    use E5Feature::*;
    vec![
        FeatureRule::new(ThreatProtection, &[], Some(30), false, 40),
        FeatureRule::new(
            InformationProtection,
            &["legal", "compliance", "finance", "hr", "human resources", "executive", "director"],
            None,
            false,
            55,
        ),
        FeatureRule::new(
            CloudAppSecurity,
            &["it", "security", "cyber", "infrastructure"],
            None,
            false,
            50,
        ),
        FeatureRule::new(EDiscovery, &["legal", "compliance", "audit", "counsel"], None, false, 60),
        FeatureRule::new(
            Compliance,
            &["compliance", "risk", "audit", "governance", "legal", "regulatory"],
            None,
            false,
            55,
        ),
        FeatureRule::new(
            PowerBiPro,
            &["analyst", "analytics", "data", "finance", "reporting", "bi"],
            None,
            false,
            50,
        ),
        FeatureRule::new(AudioConferencing, &[], Some(30), true, 45),
        FeatureRule::new(
            PhoneSystem,
            &["sales", "reception", "support", "service desk"],
            None,
            true,
            45,
        ),
        FeatureRule::new(
            PersonalAnalytics,
            &["manager", "director", "head", "chief", "lead"],
            Some(30),
            false,
            35,
        ),
    ]
}

struct CompiledRule {
    def: FeatureRule,
    pattern: Option<Regex>,
}

/// Department / job-title keyword heuristic.
pub struct KeywordFeatureHeuristic {
    rules: Vec<CompiledRule>,
}

impl KeywordFeatureHeuristic {
    pub fn new() -> Self {
        Self::with_rules(default_feature_rules()).expect("built-in feature rules are valid")
    }

    /// Compile custom rules. Features without a rule are never counted as used.
    pub fn with_rules(defs: Vec<FeatureRule>) -> Result<Self> {
        let rules = defs
            .into_iter()
            .map(|def| {
                let keywords: Vec<String> = def
                    .keywords
                    .iter()
                    .map(|k| k.trim())
                    .filter(|k| !k.is_empty())
                    .map(regex::escape)
                    .collect();
                let pattern = if keywords.is_empty() {
                    None
                } else {
                    // Word boundaries that also work for keywords ending in punctuation.
                    let source = format!(r"(?i)(?:^|\W)({})(?:$|\W)", keywords.join("|"));
                    Some(Regex::new(&source).map_err(|e| {
                        LicenceError::Config(format!("feature rule {:?}: {e}", def.feature))
                    })?)
                };
                Ok(CompiledRule { def, pattern })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }
}

impl Default for KeywordFeatureHeuristic {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureUsageStrategy for KeywordFeatureHeuristic {
    fn name(&self) -> &str {
        "department-keyword-heuristic"
    }

    fn assess(&self, feature: E5Feature, ctx: &FeatureContext<'_>) -> FeatureVerdict {
        let Some(rule) = self.rules.iter().find(|r| r.def.feature == feature) else {
            return FeatureVerdict {
                used: false,
                confidence: 0,
                basis: "no attribution rule".to_string(),
            };
        };

        let mut basis = Vec::new();
        let mut used = true;

        if let Some(pattern) = &rule.pattern {
            let dept = ctx.user.department.as_deref().unwrap_or_default();
            let title = ctx.user.job_title.as_deref().unwrap_or_default();
            let hit = pattern
                .captures(dept)
                .or_else(|| pattern.captures(title))
                .and_then(|c| c.get(1));
            match hit {
                Some(m) => basis.push(format!("role keyword \"{}\"", m.as_str().to_lowercase())),
                None => used = false,
            }
        }

        if let Some(limit) = rule.def.recent_sign_in_days {
            if ctx.user.days_inactive() <= limit {
                basis.push(format!("signed in within {limit} days"));
            } else {
                used = false;
            }
        }

        if rule.def.requires_chat_app {
            if !ctx.telemetry_available {
                used = false;
                basis.push("no app telemetry".to_string());
            } else if ctx.uses(CoreApp::Teams) {
                basis.push("Teams activity".to_string());
            } else {
                used = false;
            }
        }

        FeatureVerdict {
            used,
            confidence: rule.def.confidence,
            basis: if basis.is_empty() {
                "no supporting signal".to_string()
            } else {
                basis.join(", ")
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn user(dept: Option<&str>, title: Option<&str>, days: Option<u32>) -> LicenceUser {
        LicenceUser {
            id: "u".into(),
            display_name: "U".into(),
            department: dept.map(str::to_string),
            job_title: title.map(str::to_string),
            licences: "Microsoft 365 E5".into(),
            days_since_sign_in: days,
            ..Default::default()
        }
    }

    fn assess(feature: E5Feature, u: &LicenceUser, apps: &[CoreApp], telemetry: bool) -> FeatureVerdict {
        let h = KeywordFeatureHeuristic::new();
        h.assess(
            feature,
            &FeatureContext {
                user: u,
                apps_used: apps,
                telemetry_available: telemetry,
            },
        )
    }

    #[test]
    fn test_catalogue_has_nine_features_each_with_rule() {
        let rules = default_feature_rules();
        assert_eq!(E5Feature::ALL.len(), 9);
        for f in E5Feature::ALL {
            assert!(rules.iter().any(|r| r.feature == f), "{f:?}");
        }
    }

    #[test]
    fn test_department_keyword_whole_word() {
        let legal = user(Some("Legal & Compliance"), None, Some(5));
        assert!(assess(E5Feature::EDiscovery, &legal, &[], false).used);

        // "it" must not match inside "Facilities".
        let facilities = user(Some("Facilities"), None, Some(5));
        assert!(!assess(E5Feature::CloudAppSecurity, &facilities, &[], false).used);
        let it = user(Some("IT"), None, Some(5));
        assert!(assess(E5Feature::CloudAppSecurity, &it, &[], false).used);
    }

    #[test]
    fn test_job_title_also_matches() {
        let u = user(Some("Operations"), Some("Senior Data Analyst"), Some(5));
        let v = assess(E5Feature::PowerBiPro, &u, &[], false);
        assert!(v.used);
        assert_eq!(v.confidence, 50);
        assert!(v.basis.contains("role keyword"));
    }

    #[test]
    fn test_recency_rule() {
        assert!(assess(E5Feature::ThreatProtection, &user(None, None, Some(30)), &[], false).used);
        assert!(!assess(E5Feature::ThreatProtection, &user(None, None, Some(31)), &[], false).used);
        assert!(!assess(E5Feature::ThreatProtection, &user(None, None, None), &[], false).used);
    }

    #[test]
    fn test_keyword_and_recency_both_required() {
        let stale_manager = user(None, Some("Store Manager"), Some(45));
        assert!(!assess(E5Feature::PersonalAnalytics, &stale_manager, &[], false).used);
        let active_manager = user(None, Some("Store Manager"), Some(3));
        assert!(assess(E5Feature::PersonalAnalytics, &active_manager, &[], false).used);
    }

    #[test]
    fn test_phone_system_needs_teams_activity() {
        let sales = user(Some("Sales"), None, Some(1));
        assert!(assess(E5Feature::PhoneSystem, &sales, &[CoreApp::Teams], true).used);
        assert!(!assess(E5Feature::PhoneSystem, &sales, &[CoreApp::Outlook], true).used);
        let v = assess(E5Feature::PhoneSystem, &sales, &[], false);
        assert!(!v.used);
        assert!(v.basis.contains("no app telemetry"));
    }

    #[test]
    fn test_custom_rules_escape_keywords() {
        let h = KeywordFeatureHeuristic::with_rules(vec![FeatureRule {
            feature: E5Feature::PowerBiPro,
            keywords: vec!["R&D (labs)".into()],
            recent_sign_in_days: None,
            requires_chat_app: false,
            confidence: 70,
        }])
        .unwrap();
        let u = user(Some("R&D (labs)"), None, Some(1));
        let ctx = FeatureContext {
            user: &u,
            apps_used: &[],
            telemetry_available: false,
        };
        let v = h.assess(E5Feature::PowerBiPro, &ctx);
        assert!(v.used);
        assert_eq!(v.confidence, 70);
        assert!(v.basis.contains("r&d (labs)"));
        let missing = h.assess(E5Feature::EDiscovery, &ctx);
        assert!(!missing.used);
        assert_eq!(missing.confidence, 0);
    }
}
