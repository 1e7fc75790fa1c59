//! Downgrade recommendation engine.
//!
//! Finds users with no hygiene flag whose activity or role suggests a cheaper
//! suite would do, prices the move through the shared [`CostResolver`], and
//! groups the candidates by downgrade type.

use std::collections::BTreeMap;

use licence_core::models::{IssueType, LicenceUser};
use licence_core::pricing::{CostResolver, PriceMatch, ResolutionDepth, UserCostBreakdown};
use licence_core::sku::{SkuCatalog, SuiteLevel};
use serde::{Deserialize, Serialize};

// ── Rules ─────────────────────────────────────────────────────────────────────

/// Thresholds and keywords for downgrade detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DowngradeRules {
    /// Inclusive lower bound of the E5→E3 inactivity window.
    pub e5_min_inactive_days: u32,
    /// Inclusive upper bound; 90+ is handled by the `Inactive 90+` flag.
    pub e5_max_inactive_days: u32,
    /// Inactivity above this many days makes an E5→E3 candidate high confidence.
    pub high_confidence_after_days: u32,
    /// Department fragments indicating frontline roles (lowercase).
    pub frontline_keywords: Vec<String>,
}

impl Default for DowngradeRules {
    fn default() -> Self {
        Self {
            e5_min_inactive_days: 30,
            e5_max_inactive_days: 89,
            high_confidence_after_days: 60,
            frontline_keywords: [
                "retail",
                "store",
                "warehouse",
                "logistics",
                "call centre",
                "call center",
                "contact centre",
                "customer service",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

// ── Output types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DowngradeKind {
    E5ToE3,
    E3ToF3,
}

impl DowngradeKind {
    pub fn label(&self) -> &'static str {
        match self {
            DowngradeKind::E5ToE3 => "E5 to E3",
            DowngradeKind::E3ToF3 => "E3 to F3",
        }
    }
}

/// Qualitative confidence with a numeric score attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// 0–100 score, not a probability.
    pub fn score(&self) -> u8 {
        match self {
            Confidence::High => 80,
            Confidence::Medium => 60,
            Confidence::Low => 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DowngradeRecommendation {
    pub user_id: String,
    pub display_name: String,
    pub user_principal_name: String,
    pub department: String,
    pub kind: DowngradeKind,
    pub current_licence: String,
    pub recommended_licence: String,
    pub current_monthly_cost: f64,
    pub recommended_monthly_cost: f64,
    pub monthly_savings: f64,
    pub annual_savings: f64,
    pub confidence: Confidence,
    pub confidence_score: u8,
    /// Set when the candidate rests on a heuristic that needs a human check.
    pub requires_verification: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DowngradeSummary {
    pub kind: DowngradeKind,
    pub label: String,
    pub user_count: usize,
    pub total_monthly_savings: f64,
    pub total_annual_savings: f64,
    pub recommendations: Vec<DowngradeRecommendation>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DowngradeAnalysis {
    /// All candidates, largest saving first.
    pub recommendations: Vec<DowngradeRecommendation>,
    /// Per-kind roll-ups, largest saving first.
    pub summaries: Vec<DowngradeSummary>,
    pub total_monthly_savings: f64,
    pub total_annual_savings: f64,
}

// ── Licence naming ────────────────────────────────────────────────────────────

/// Name of the `target` suite in the same product family as `current`
/// (Office 365 stays Office 365, everything else maps to Microsoft 365).
pub fn equivalent_licence(current: &str, target: SuiteLevel, catalog: &SkuCatalog) -> String {
    let haystack = format!(
        "{} {}",
        current.to_uppercase(),
        catalog.friendly_name(current).to_uppercase()
    );
    let family = if haystack.contains("OFFICE 365") || haystack.contains("O365") {
        "Office 365"
    } else {
        "Microsoft 365"
    };
    let level = match target {
        SuiteLevel::E5 => "E5",
        SuiteLevel::E3 => "E3",
        SuiteLevel::F3 => "F3",
    };
    format!("{family} {level}")
}

/// First held licence at the given suite level.
pub fn held_licence_at<'u>(
    user: &'u LicenceUser,
    level: SuiteLevel,
    catalog: &SkuCatalog,
) -> Option<&'u str> {
    user.licence_names()
        .into_iter()
        .find(|name| catalog.suite_level(name) == Some(level))
}

// ── DowngradeEngine ───────────────────────────────────────────────────────────

/// Downgrade detection over one cycle's users.
pub struct DowngradeEngine<'a> {
    resolver: &'a CostResolver<'a>,
    rules: &'a DowngradeRules,
}

impl<'a> DowngradeEngine<'a> {
    pub fn new(resolver: &'a CostResolver<'a>, rules: &'a DowngradeRules) -> Self {
        Self { resolver, rules }
    }

    pub fn catalog(&self) -> &'a SkuCatalog {
        self.resolver.catalog()
    }

    /// Monthly cost of a licence name through the full five-strategy chain.
    pub fn licence_cost(&self, name: &str) -> PriceMatch {
        self.resolver.resolve(name, ResolutionDepth::Full)
    }

    /// Authoritative per-user cost breakdown.
    pub fn cost_breakdown(&self, user: &LicenceUser) -> UserCostBreakdown {
        self.resolver.user_breakdown(user, ResolutionDepth::Full)
    }

    /// Monthly saving of moving `current` to the `target` suite, with the
    /// target's name and both costs. Never negative.
    pub fn downgrade_saving(&self, current: &str, target: SuiteLevel) -> (String, f64, f64, f64) {
        let target_name = equivalent_licence(current, target, self.catalog());
        let current_cost = self.licence_cost(current).monthly_cost;
        let target_cost = self.licence_cost(&target_name).monthly_cost;
        let saving = (current_cost - target_cost).max(0.0);
        (target_name, current_cost, target_cost, saving)
    }

    /// The downgrade candidate for one user, if any.
    ///
    /// Only users without an issue flag are considered; flagged users
    /// (including service accounts) are already handled elsewhere.
    pub fn recommend_for(&self, user: &LicenceUser) -> Option<DowngradeRecommendation> {
        if user.issue_type != IssueType::None {
            return None;
        }
        let catalog = self.catalog();
        let inactive = user.days_inactive();

        if let Some(e5) = held_licence_at(user, SuiteLevel::E5, catalog) {
            if !(self.rules.e5_min_inactive_days..=self.rules.e5_max_inactive_days)
                .contains(&inactive)
            {
                return None;
            }
            let (target, current_cost, target_cost, saving) =
                self.downgrade_saving(e5, SuiteLevel::E3);
            if saving <= 0.0 {
                return None;
            }
            let confidence = if inactive > self.rules.high_confidence_after_days {
                Confidence::High
            } else {
                Confidence::Medium
            };
            return Some(self.recommendation(
                user,
                DowngradeKind::E5ToE3,
                e5,
                target,
                current_cost,
                target_cost,
                confidence,
                false,
                format!("No sign-in for {inactive} days; E5 capabilities are unlikely to be in use."),
            ));
        }

        let e3 = held_licence_at(user, SuiteLevel::E3, catalog)?;
        let department = user.department.as_deref().unwrap_or_default().to_lowercase();
        let keyword = self
            .rules
            .frontline_keywords
            .iter()
            .find(|k| !k.is_empty() && department.contains(&k.to_lowercase()))?;
        let (target, current_cost, target_cost, saving) = self.downgrade_saving(e3, SuiteLevel::F3);
        if saving <= 0.0 {
            return None;
        }
        Some(self.recommendation(
            user,
            DowngradeKind::E3ToF3,
            e3,
            target,
            current_cost,
            target_cost,
            Confidence::Low,
            true,
            format!(
                "Department \"{}\" matches frontline keyword \"{keyword}\"; estimate from department name only, verify the role before acting.",
                user.department_or_default()
            ),
        ))
    }

    /// Candidates for all users plus per-kind summaries.
    pub fn generate(&self, users: &[LicenceUser]) -> DowngradeAnalysis {
        let mut recommendations: Vec<DowngradeRecommendation> =
            users.iter().filter_map(|u| self.recommend_for(u)).collect();
        sort_by_savings(&mut recommendations);

        let mut grouped: BTreeMap<DowngradeKind, Vec<DowngradeRecommendation>> = BTreeMap::new();
        for rec in &recommendations {
            grouped.entry(rec.kind).or_default().push(rec.clone());
        }
        let mut summaries: Vec<DowngradeSummary> = grouped
            .into_iter()
            .map(|(kind, recs)| {
                let monthly: f64 = recs.iter().map(|r| r.monthly_savings).sum();
                DowngradeSummary {
                    kind,
                    label: kind.label().to_string(),
                    user_count: recs.len(),
                    total_monthly_savings: monthly,
                    total_annual_savings: monthly * 12.0,
                    recommendations: recs,
                }
            })
            .collect();
        summaries.sort_by(|a, b| b.total_annual_savings.total_cmp(&a.total_annual_savings));

        let total_monthly: f64 = recommendations.iter().map(|r| r.monthly_savings).sum();
        tracing::debug!(
            candidates = recommendations.len(),
            monthly_savings = total_monthly,
            "downgrade analysis complete"
        );

        DowngradeAnalysis {
            recommendations,
            summaries,
            total_monthly_savings: total_monthly,
            total_annual_savings: total_monthly * 12.0,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn recommendation(
        &self,
        user: &LicenceUser,
        kind: DowngradeKind,
        current: &str,
        target: String,
        current_cost: f64,
        target_cost: f64,
        confidence: Confidence,
        requires_verification: bool,
        reason: String,
    ) -> DowngradeRecommendation {
        let saving = (current_cost - target_cost).max(0.0);
        DowngradeRecommendation {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            user_principal_name: user.user_principal_name.clone(),
            department: user.department_or_default().to_string(),
            kind,
            current_licence: current.to_string(),
            recommended_licence: target,
            current_monthly_cost: current_cost,
            recommended_monthly_cost: target_cost,
            monthly_savings: saving,
            annual_savings: saving * 12.0,
            confidence,
            confidence_score: confidence.score(),
            requires_verification,
            reason,
        }
    }
}

fn sort_by_savings(recs: &mut [DowngradeRecommendation]) {
    recs.sort_by(|a, b| {
        b.annual_savings
            .total_cmp(&a.annual_savings)
            .then_with(|| a.display_name.cmp(&b.display_name))
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
