//! Per-user usage profiles and right-sizing recommendations.
//!
//! Combines each user's licences with optional app telemetry and the E5
//! feature attribution strategy, then rolls the profiles up into a tenant
//! summary and per-feature statistics.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use licence_core::formatting::rounded_pct;
use licence_core::models::{AppUsageRecord, CoreApp, LicenceUser, UsageReport, UsageTelemetry};
use licence_core::sku::SuiteLevel;
use serde::{Deserialize, Serialize};

use crate::downgrade::{held_licence_at, DowngradeEngine};
use crate::feature_heuristics::{E5Feature, FeatureContext, FeatureRule, FeatureUsageStrategy};

/// Shown to consumers next to every attribution figure.
pub const ATTRIBUTION_NOTE: &str = "E5 feature usage is estimated from department, job title, \
sign-in recency and app activity because per-feature telemetry is unavailable. \
Treat it as a confidence-scored estimate, not a measurement.";

// ── Rules ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UsageRules {
    /// E5 utilisation below this is "underutilised".
    pub underutilised_pct: u32,
    /// E5 utilisation below this raises E3-downgrade confidence.
    pub very_low_pct: u32,
    pub inactive_days: u32,
    pub f3_max_apps: usize,
    pub f3_allowed_apps: Vec<CoreApp>,
    pub top_unused_features: usize,
    /// Replaces the built-in attribution rules when set.
    pub feature_rules: Option<Vec<FeatureRule>>,
}

impl Default for UsageRules {
    fn default() -> Self {
        Self {
            underutilised_pct: 30,
            very_low_pct: 10,
            inactive_days: 90,
            f3_max_apps: 3,
            f3_allowed_apps: vec![CoreApp::Outlook, CoreApp::Teams],
            top_unused_features: 5,
            feature_rules: None,
        }
    }
}

// ── Output types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedAction {
    DowngradeToE3,
    RemoveLicence,
    DowngradeToF3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecommendation {
    pub action: RecommendedAction,
    pub current_licence: String,
    /// `None` for removal.
    pub recommended_licence: Option<String>,
    pub monthly_savings: f64,
    pub annual_savings: f64,
    pub confidence: u8,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureAssessment {
    pub feature: E5Feature,
    pub label: String,
    pub used: bool,
    pub confidence: u8,
    pub basis: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUsageProfile {
    pub user_id: String,
    pub display_name: String,
    pub user_principal_name: String,
    pub department: String,
    pub licences: Vec<String>,
    pub has_e5: bool,
    pub has_e3: bool,
    pub days_inactive: u32,
    /// Whether an app-usage record exists for this user.
    pub has_app_telemetry: bool,
    pub apps_used: Vec<CoreApp>,
    pub apps_unused: Vec<CoreApp>,
    pub storage_used_bytes: Option<u64>,
    pub last_activity_date: Option<NaiveDate>,
    /// Empty unless the user holds an E5-tier licence.
    pub e5_features: Vec<FeatureAssessment>,
    pub e5_features_used: usize,
    pub e5_utilisation_pct: u32,
    pub monthly_cost: f64,
    pub recommendation: Option<UsageRecommendation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnusedFeatureCount {
    pub feature: E5Feature,
    pub label: String,
    pub unused_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentUsage {
    pub department: String,
    pub e5_users: usize,
    pub downgrade_candidates: usize,
    pub annual_savings: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAnalysisSummary {
    pub users_analysed: usize,
    pub e5_users: usize,
    pub e5_underutilised: usize,
    pub e5_underutilised_pct: u32,
    pub average_e5_utilisation_pct: u32,
    pub downgrade_candidates: usize,
    pub total_annual_savings: f64,
    pub top_unused_features: Vec<UnusedFeatureCount>,
    pub department_breakdown: Vec<DepartmentUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUsageStats {
    pub feature: E5Feature,
    pub label: String,
    pub users_using: usize,
    pub e5_users: usize,
    pub utilisation_pct: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageAnalysis {
    pub profiles: Vec<UserUsageProfile>,
    pub summary: UsageAnalysisSummary,
    /// Least-used first.
    pub feature_stats: Vec<FeatureUsageStats>,
    pub telemetry_available: bool,
    pub attribution_strategy: String,
    pub attribution_note: String,
}

// ── Builder ───────────────────────────────────────────────────────────────────

struct TelemetryIndex<'t> {
    apps: HashMap<String, &'t AppUsageRecord>,
    reports: HashMap<String, &'t UsageReport>,
}

impl<'t> TelemetryIndex<'t> {
    /// Keyed by lowercased UPN; the most recently refreshed row wins.
    fn new(telemetry: Option<&'t UsageTelemetry>) -> Self {
        let mut apps: HashMap<String, &AppUsageRecord> = HashMap::new();
        let mut reports: HashMap<String, &UsageReport> = HashMap::new();
        if let Some(t) = telemetry {
            for rec in &t.app_usage {
                let key = rec.user_principal_name.trim().to_lowercase();
                match apps.get(&key) {
                    Some(existing) if existing.report_refresh_date > rec.report_refresh_date => {}
                    _ => {
                        apps.insert(key, rec);
                    }
                }
            }
            for rep in &t.reports {
                let key = rep.user_principal_name.trim().to_lowercase();
                match reports.get(&key) {
                    Some(existing) if existing.report_date > rep.report_date => {}
                    _ => {
                        reports.insert(key, rep);
                    }
                }
            }
        }
        Self { apps, reports }
    }
}

pub struct UsageProfileBuilder<'a> {
    downgrade: &'a DowngradeEngine<'a>,
    strategy: &'a dyn FeatureUsageStrategy,
    rules: &'a UsageRules,
}

impl<'a> UsageProfileBuilder<'a> {
    pub fn new(
        downgrade: &'a DowngradeEngine<'a>,
        strategy: &'a dyn FeatureUsageStrategy,
        rules: &'a UsageRules,
    ) -> Self {
        Self {
            downgrade,
            strategy,
            rules,
        }
    }

    /// Profile every user and build the tenant roll-ups.
    pub fn build(&self, users: &[LicenceUser], telemetry: Option<&UsageTelemetry>) -> UsageAnalysis {
        let telemetry_available = telemetry.is_some_and(|t| !t.is_empty());
        let index = TelemetryIndex::new(telemetry);
        let profiles: Vec<UserUsageProfile> =
            users.iter().map(|u| self.profile(u, &index)).collect();
        let summary = self.summarise(&profiles);
        let feature_stats = feature_stats(&profiles);

        tracing::debug!(
            users = summary.users_analysed,
            e5_users = summary.e5_users,
            candidates = summary.downgrade_candidates,
            telemetry = telemetry_available,
            "usage profiles built"
        );

        UsageAnalysis {
            profiles,
            summary,
            feature_stats,
            telemetry_available,
            attribution_strategy: self.strategy.name().to_string(),
            attribution_note: ATTRIBUTION_NOTE.to_string(),
        }
    }

    fn profile(&self, user: &LicenceUser, index: &TelemetryIndex<'_>) -> UserUsageProfile {
        let catalog = self.downgrade.catalog();
        let key = user.user_principal_name.trim().to_lowercase();
        let app_record = index.apps.get(&key).copied();
        let report = index.reports.get(&key).copied();

        let (apps_used, apps_unused) = match app_record {
            Some(rec) => {
                let used = rec.apps_used();
                let unused = CoreApp::ALL
                    .into_iter()
                    .filter(|a| !used.contains(a))
                    .collect();
                (used, unused)
            }
            None => (Vec::new(), Vec::new()),
        };

        let e5 = held_licence_at(user, SuiteLevel::E5, catalog);
        let e3 = held_licence_at(user, SuiteLevel::E3, catalog);

        let e5_features: Vec<FeatureAssessment> = if e5.is_some() {
            let ctx = FeatureContext {
                user,
                apps_used: &apps_used,
                telemetry_available: app_record.is_some(),
            };
            E5Feature::ALL
                .iter()
                .map(|f| {
                    let v = self.strategy.assess(*f, &ctx);
                    FeatureAssessment {
                        feature: *f,
                        label: f.label().to_string(),
                        used: v.used,
                        confidence: v.confidence,
                        basis: v.basis,
                    }
                })
                .collect()
        } else {
            Vec::new()
        };
        let e5_features_used = e5_features.iter().filter(|f| f.used).count();
        let e5_utilisation_pct = rounded_pct(e5_features_used as f64, E5Feature::ALL.len() as f64);
        let e5_utilisation_pct = if e5.is_some() { e5_utilisation_pct } else { 0 };

        let breakdown = self.downgrade.cost_breakdown(user);
        let days_inactive = user.days_inactive();

        let recommendation = match (e5, e3) {
            (Some(e5), _) => {
                self.e5_recommendation(e5, days_inactive, e5_utilisation_pct, breakdown.total_monthly_cost)
            }
            (None, Some(e3)) if app_record.is_some() => {
                self.f3_recommendation(e3, days_inactive, &apps_used)
            }
            _ => None,
        };

        UserUsageProfile {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            user_principal_name: user.user_principal_name.clone(),
            department: user.department_or_default().to_string(),
            licences: user.licence_names().into_iter().map(str::to_string).collect(),
            has_e5: e5.is_some(),
            has_e3: e3.is_some(),
            days_inactive,
            has_app_telemetry: app_record.is_some(),
            apps_used,
            apps_unused,
            storage_used_bytes: report.map(|r| r.storage_used_bytes),
            last_activity_date: report.and_then(|r| r.last_activity_date),
            e5_features,
            e5_features_used,
            e5_utilisation_pct,
            monthly_cost: breakdown.total_monthly_cost,
            recommendation,
        }
    }

    fn e5_recommendation(
        &self,
        e5: &str,
        days_inactive: u32,
        utilisation: u32,
        held_monthly_cost: f64,
    ) -> Option<UsageRecommendation> {
        if days_inactive >= self.rules.inactive_days {
            return Some(UsageRecommendation {
                action: RecommendedAction::RemoveLicence,
                current_licence: e5.to_string(),
                recommended_licence: None,
                monthly_savings: held_monthly_cost,
                annual_savings: held_monthly_cost * 12.0,
                confidence: 90,
                reason: format!("No sign-in for {days_inactive} days."),
            });
        }
        if utilisation >= self.rules.underutilised_pct {
            return None;
        }
        let (target, _, _, saving) = self.downgrade.downgrade_saving(e5, SuiteLevel::E3);
        if saving <= 0.0 {
            return None;
        }
        let confidence = if utilisation < self.rules.very_low_pct { 85 } else { 65 };
        Some(UsageRecommendation {
            action: RecommendedAction::DowngradeToE3,
            current_licence: e5.to_string(),
            recommended_licence: Some(target),
            monthly_savings: saving,
            annual_savings: saving * 12.0,
            confidence,
            reason: format!("Estimated E5 feature utilisation is {utilisation}%."),
        })
    }

    fn f3_recommendation(
        &self,
        e3: &str,
        days_inactive: u32,
        apps_used: &[CoreApp],
    ) -> Option<UsageRecommendation> {
        let light = apps_used.len() <= self.rules.f3_max_apps
            && apps_used.iter().all(|a| self.rules.f3_allowed_apps.contains(a));
        if !light || days_inactive >= self.rules.inactive_days {
            return None;
        }
        let (target, _, _, saving) = self.downgrade.downgrade_saving(e3, SuiteLevel::F3);
        if saving <= 0.0 {
            return None;
        }
        let apps = if apps_used.is_empty() {
            "no core apps".to_string()
        } else {
            apps_used.iter().map(|a| a.label()).collect::<Vec<_>>().join(" and ")
        };
        Some(UsageRecommendation {
            action: RecommendedAction::DowngradeToF3,
            current_licence: e3.to_string(),
            recommended_licence: Some(target),
            monthly_savings: saving,
            annual_savings: saving * 12.0,
            confidence: 50,
            reason: format!("Uses {apps} only."),
        })
    }

    fn summarise(&self, profiles: &[UserUsageProfile]) -> UsageAnalysisSummary {
        let e5: Vec<&UserUsageProfile> = profiles.iter().filter(|p| p.has_e5).collect();
        let underutilised = e5
            .iter()
            .filter(|p| p.e5_utilisation_pct < self.rules.underutilised_pct)
            .count();
        let average = if e5.is_empty() {
            0
        } else {
            let total: u32 = e5.iter().map(|p| p.e5_utilisation_pct).sum();
            (total as f64 / e5.len() as f64).round() as u32
        };
        let candidates: Vec<&UserUsageProfile> =
            profiles.iter().filter(|p| p.recommendation.is_some()).collect();
        let total_annual_savings = candidates
            .iter()
            .filter_map(|p| p.recommendation.as_ref())
            .map(|r| r.annual_savings)
            .sum();

        let mut top_unused: Vec<UnusedFeatureCount> = E5Feature::ALL
            .iter()
            .map(|f| UnusedFeatureCount {
                feature: *f,
                label: f.label().to_string(),
                unused_count: e5
                    .iter()
                    .filter(|p| p.e5_features.iter().any(|a| a.feature == *f && !a.used))
                    .count(),
            })
            .filter(|c| c.unused_count > 0)
            .collect();
        // Stable: ties keep catalogue order.
        top_unused.sort_by(|a, b| b.unused_count.cmp(&a.unused_count));
        top_unused.truncate(self.rules.top_unused_features);

        let mut departments: BTreeMap<&str, DepartmentUsage> = BTreeMap::new();
        for p in profiles {
            if !p.has_e5 && p.recommendation.is_none() {
                continue;
            }
            let entry = departments
                .entry(p.department.as_str())
                .or_insert_with(|| DepartmentUsage {
                    department: p.department.clone(),
                    e5_users: 0,
                    downgrade_candidates: 0,
                    annual_savings: 0.0,
                });
            if p.has_e5 {
                entry.e5_users += 1;
            }
            if let Some(r) = &p.recommendation {
                entry.downgrade_candidates += 1;
                entry.annual_savings += r.annual_savings;
            }
        }
        let mut department_breakdown: Vec<DepartmentUsage> = departments.into_values().collect();
        department_breakdown.sort_by(|a, b| b.annual_savings.total_cmp(&a.annual_savings));

        UsageAnalysisSummary {
            users_analysed: profiles.len(),
            e5_users: e5.len(),
            e5_underutilised: underutilised,
            e5_underutilised_pct: rounded_pct(underutilised as f64, e5.len() as f64),
            average_e5_utilisation_pct: average,
            downgrade_candidates: candidates.len(),
            total_annual_savings,
            top_unused_features: top_unused,
            department_breakdown,
        }
    }
}

/// Share of E5 holders using each feature, least-used first. Empty when no
/// user holds E5.
pub fn feature_stats(profiles: &[UserUsageProfile]) -> Vec<FeatureUsageStats> {
    let e5: Vec<&UserUsageProfile> = profiles.iter().filter(|p| p.has_e5).collect();
    if e5.is_empty() {
        return Vec::new();
    }
    let mut stats: Vec<FeatureUsageStats> = E5Feature::ALL
        .iter()
        .map(|f| {
            let using = e5
                .iter()
                .filter(|p| p.e5_features.iter().any(|a| a.feature == *f && a.used))
                .count();
            FeatureUsageStats {
                feature: *f,
                label: f.label().to_string(),
                users_using: using,
                e5_users: e5.len(),
                utilisation_pct: rounded_pct(using as f64, e5.len() as f64),
            }
        })
        .collect();
    stats.sort_by_key(|s| s.utilisation_pct);
    stats
}

// ── Tests ─────────────────────────────────────────────────────────────────────
