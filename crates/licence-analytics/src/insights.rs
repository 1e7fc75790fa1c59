//! Free-text findings and the executive summary paragraph.

use licence_core::formatting::{format_currency_whole, format_number};
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, AlertSeverity};
use crate::comparison::{ComparisonMetric, MonthComparisonData, Trend};
use crate::downgrade::{DowngradeAnalysis, DowngradeKind};
use crate::kpi::{KpiReport, KpiSummary};
use crate::usage_profile::UsageAnalysis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InsightKind {
    Spend,
    WastedSeats,
    Hygiene,
    RightSizing,
    Usage,
    Trend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub kind: InsightKind,
    pub title: String,
    pub detail: String,
    pub annual_impact: Option<f64>,
}

impl Insight {
    fn new(kind: InsightKind, title: impl Into<String>, detail: impl Into<String>, impact: Option<f64>) -> Self {
        Self {
            kind,
            title: title.into(),
            detail: detail.into(),
            annual_impact: impact,
        }
    }
}

/// Findings sorted by descending annual impact; impact-less findings last.
pub fn generate_insights(
    kpis: &KpiReport,
    downgrades: &DowngradeAnalysis,
    usage: &UsageAnalysis,
    comparison: Option<&MonthComparisonData>,
) -> Vec<Insight> {
    let mut insights = Vec::new();
    let s = &kpis.summary;

    if s.monthly_spend > 0.0 {
        insights.push(Insight::new(
            InsightKind::Spend,
            "Licence spend",
            format!(
                "Paid licences cost {} per month ({} per year) across {} paid SKU(s).",
                format_currency_whole(s.monthly_spend),
                format_currency_whole(s.annual_spend),
                s.paid_sku_count
            ),
            None,
        ));
    }

    if s.wasted_monthly_spend > 0.0 {
        let unused: i64 = kpis
            .sku_costs
            .iter()
            .filter(|r| !r.is_excluded_from_aggregates)
            .map(|r| r.available.max(0))
            .sum();
        insights.push(Insight::new(
            InsightKind::WastedSeats,
            "Unassigned paid seats",
            format!(
                "{} purchased seat(s) are unassigned, costing {} per month.",
                format_number(unused as f64, 0),
                format_currency_whole(s.wasted_monthly_spend)
            ),
            Some(s.wasted_monthly_spend * 12.0),
        ));
    }

    if let Some(top) = kpis
        .issue_categories
        .iter()
        .filter(|c| c.potential_annual_savings > 0.0)
        .max_by(|a, b| a.potential_annual_savings.total_cmp(&b.potential_annual_savings))
    {
        insights.push(Insight::new(
            InsightKind::Hygiene,
            format!("Largest hygiene saving: {}", top.label),
            format!(
                "{} user(s) affected; reclaiming their licences saves {} per year.",
                top.user_count,
                format_currency_whole(top.potential_annual_savings)
            ),
            Some(top.potential_annual_savings),
        ));
    }

    if let Some(top) = downgrades.summaries.first() {
        let mut detail = format!(
            "{} user(s) could move {}, saving {} per year.",
            top.user_count,
            top.label,
            format_currency_whole(top.total_annual_savings)
        );
        if top.kind == DowngradeKind::E3ToF3 {
            detail.push_str(" Based on department names only; verify roles first.");
        }
        insights.push(Insight::new(
            InsightKind::RightSizing,
            format!("{} downgrade opportunity", top.label),
            detail,
            Some(top.total_annual_savings),
        ));
    }

    let u = &usage.summary;
    if u.e5_underutilised > 0 {
        insights.push(Insight::new(
            InsightKind::Usage,
            "E5 under-utilisation",
            format!(
                "{}% of E5 users ({} of {}) are under-utilising E5 features; estimated average use is {}%.",
                u.e5_underutilised_pct,
                u.e5_underutilised,
                u.e5_users,
                u.average_e5_utilisation_pct
            ),
            (u.total_annual_savings > 0.0).then_some(u.total_annual_savings),
        ));
    }
    if let Some(least) = usage.feature_stats.first() {
        insights.push(Insight::new(
            InsightKind::Usage,
            "Least-used E5 feature",
            format!(
                "{} is used by an estimated {}% of E5 users.",
                least.label, least.utilisation_pct
            ),
            None,
        ));
    }

    if let Some(util) = comparison
        .and_then(|c| c.metric(ComparisonMetric::Utilisation))
        .filter(|m| m.trend != Trend::Stable)
    {
        let direction = if util.trend == Trend::Up { "up" } else { "down" };
        insights.push(Insight::new(
            InsightKind::Trend,
            format!("Utilisation trending {direction}"),
            format!(
                "Utilisation moved from {}% to {}% since the previous snapshot.",
                util.previous, util.current
            ),
            None,
        ));
    }

    // Stable: equal impacts keep generation order.
    insights.sort_by(|a, b| match (a.annual_impact, b.annual_impact) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    insights
}

/// One-paragraph summary for the top of a report.
pub fn executive_summary(kpis: &KpiSummary, downgrades: &DowngradeAnalysis, alerts: &[Alert]) -> String {
    let hygiene = kpis.potential_annual_savings;
    let right_sizing = downgrades.total_annual_savings;
    let critical = alerts
        .iter()
        .filter(|a| a.severity == AlertSeverity::Critical)
        .count();
    let warning = alerts
        .iter()
        .filter(|a| a.severity == AlertSeverity::Warning)
        .count();

    let mut text = format!(
        "{} licensed users across {} paid SKU(s) are {}% utilised, costing {} per month ({} per year). \
Identified savings total {} per year: {} from licence hygiene and {} from right-sizing.",
        format_number(kpis.licensed_users as f64, 0),
        kpis.paid_sku_count,
        kpis.overall_utilisation_pct,
        format_currency_whole(kpis.monthly_spend),
        format_currency_whole(kpis.annual_spend),
        format_currency_whole(hygiene + right_sizing),
        format_currency_whole(hygiene),
        format_currency_whole(right_sizing),
    );
    if critical + warning == 0 {
        text.push_str(" No critical or warning alerts.");
    } else {
        text.push_str(&format!(
            " {critical} critical and {warning} warning alert(s) need attention."
        ));
    }
    text
}
