//! Month-over-month comparison of licence snapshots.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use licence_core::formatting::rounded_pct;
use licence_core::models::LicenceSnapshot;
use licence_core::sku::SkuCatalog;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// How a metric's direction maps to good or bad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Polarity {
    HigherIsBetter,
    /// Lower is better.
    Inverted,
    /// Direction carries no judgement; always positive.
    Neutral,
}

impl Polarity {
    fn is_positive(&self, trend: Trend) -> bool {
        match self {
            Polarity::HigherIsBetter => trend != Trend::Down,
            Polarity::Inverted => trend != Trend::Up,
            Polarity::Neutral => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonMetric {
    TotalUsers,
    AssignedLicences,
    PurchasedLicences,
    Utilisation,
    DisabledAccounts,
    InactiveUsers,
    DualLicensedUsers,
    TotalIssues,
}

impl ComparisonMetric {
    pub const ALL: [ComparisonMetric; 8] = [
        ComparisonMetric::TotalUsers,
        ComparisonMetric::AssignedLicences,
        ComparisonMetric::PurchasedLicences,
        ComparisonMetric::Utilisation,
        ComparisonMetric::DisabledAccounts,
        ComparisonMetric::InactiveUsers,
        ComparisonMetric::DualLicensedUsers,
        ComparisonMetric::TotalIssues,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            ComparisonMetric::TotalUsers => "Total users",
            ComparisonMetric::AssignedLicences => "Assigned licences",
            ComparisonMetric::PurchasedLicences => "Purchased licences",
            ComparisonMetric::Utilisation => "Utilisation %",
            ComparisonMetric::DisabledAccounts => "Disabled accounts",
            ComparisonMetric::InactiveUsers => "Inactive users",
            ComparisonMetric::DualLicensedUsers => "Dual-licensed users",
            ComparisonMetric::TotalIssues => "Total issues",
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            ComparisonMetric::TotalUsers
            | ComparisonMetric::AssignedLicences
            | ComparisonMetric::PurchasedLicences => Polarity::Neutral,
            ComparisonMetric::Utilisation => Polarity::HigherIsBetter,
            ComparisonMetric::DisabledAccounts
            | ComparisonMetric::InactiveUsers
            | ComparisonMetric::DualLicensedUsers
            | ComparisonMetric::TotalIssues => Polarity::Inverted,
        }
    }

    fn value(&self, t: &PeriodTotals) -> i64 {
        match self {
            ComparisonMetric::TotalUsers => t.total_users as i64,
            ComparisonMetric::AssignedLicences => t.total_assigned as i64,
            ComparisonMetric::PurchasedLicences => t.total_purchased as i64,
            ComparisonMetric::Utilisation => t.utilisation_pct as i64,
            ComparisonMetric::DisabledAccounts => t.disabled_count as i64,
            ComparisonMetric::InactiveUsers => t.inactive_count as i64,
            ComparisonMetric::DualLicensedUsers => t.dual_count as i64,
            ComparisonMetric::TotalIssues => t.total_issues() as i64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricComparison {
    pub metric: ComparisonMetric,
    pub label: String,
    pub previous: i64,
    pub current: i64,
    pub change: i64,
    pub change_pct: i64,
    pub trend: Trend,
    pub is_positive: bool,
}

impl MetricComparison {
    fn new(metric: ComparisonMetric, previous: i64, current: i64) -> Self {
        let change = current - previous;
        let change_pct = change_pct(previous, current);
        let trend = if change_pct.abs() < 1 {
            Trend::Stable
        } else if change > 0 {
            Trend::Up
        } else {
            Trend::Down
        };
        Self {
            metric,
            label: metric.label().to_string(),
            previous,
            current,
            change,
            change_pct,
            trend,
            is_positive: metric.polarity().is_positive(trend),
        }
    }
}

/// `round(100 × change / previous)`; 100 when growing from zero, else 0.
fn change_pct(previous: i64, current: i64) -> i64 {
    if previous == 0 {
        return if current > 0 { 100 } else { 0 };
    }
    (100.0 * (current - previous) as f64 / previous as f64).round() as i64
}

/// Aggregated totals for one snapshot date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub snapshot_date: NaiveDate,
    pub total_assigned: u64,
    pub total_purchased: u64,
    pub utilisation_pct: u32,
    pub total_users: u64,
    pub disabled_count: u64,
    pub inactive_count: u64,
    pub dual_count: u64,
    pub service_count: u64,
}

impl PeriodTotals {
    pub fn total_issues(&self) -> u64 {
        self.disabled_count + self.inactive_count + self.dual_count + self.service_count
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthComparisonData {
    pub previous: PeriodTotals,
    pub current: PeriodTotals,
    pub metrics: Vec<MetricComparison>,
    pub summary: String,
}

impl MonthComparisonData {
    pub fn metric(&self, metric: ComparisonMetric) -> Option<&MetricComparison> {
        self.metrics.iter().find(|m| m.metric == metric)
    }
}

pub struct ComparisonEngine<'a> {
    catalog: &'a SkuCatalog,
}

impl<'a> ComparisonEngine<'a> {
    pub fn new(catalog: &'a SkuCatalog) -> Self {
        Self { catalog }
    }

    /// Compare the two most recent distinct snapshot dates.
    ///
    /// Returns `None` when fewer than two distinct dates exist.
    pub fn generate_month_comparison(
        &self,
        snapshots: &[LicenceSnapshot],
    ) -> Option<MonthComparisonData> {
        let mut by_date: BTreeMap<NaiveDate, Vec<&LicenceSnapshot>> = BTreeMap::new();
        for s in snapshots {
            by_date.entry(s.snapshot_date).or_default().push(s);
        }
        let mut recent = by_date.iter().rev();
        let (cur_date, cur_rows) = recent.next()?;
        let (prev_date, prev_rows) = recent.next()?;

        let current = self.totals(*cur_date, cur_rows);
        let previous = self.totals(*prev_date, prev_rows);
        let metrics: Vec<MetricComparison> = ComparisonMetric::ALL
            .iter()
            .map(|m| MetricComparison::new(*m, m.value(&previous), m.value(&current)))
            .collect();
        let summary = summarise(&metrics);

        tracing::debug!(
            previous = %previous.snapshot_date,
            current = %current.snapshot_date,
            "month comparison generated"
        );
        Some(MonthComparisonData {
            previous,
            current,
            metrics,
            summary,
        })
    }

    fn totals(&self, date: NaiveDate, rows: &[&LicenceSnapshot]) -> PeriodTotals {
        let mut totals = PeriodTotals {
            snapshot_date: date,
            ..Default::default()
        };
        // Tenant-wide counts are repeated on every row of a date.
        if let Some(first) = rows.first() {
            totals.total_users = first.total_users;
            totals.disabled_count = first.disabled_count;
            totals.inactive_count = first.inactive_count;
            totals.dual_count = first.dual_count;
            totals.service_count = first.service_count;
        }
        for row in rows
            .iter()
            .filter(|r| !self.catalog.is_excluded(&r.sku_part_number, Some(r.purchased)))
        {
            totals.total_assigned += row.assigned;
            totals.total_purchased += row.purchased;
        }
        totals.utilisation_pct =
            rounded_pct(totals.total_assigned as f64, totals.total_purchased as f64);
        totals
    }
}

fn summarise(metrics: &[MetricComparison]) -> String {
    let find = |m: ComparisonMetric| metrics.iter().find(|c| c.metric == m);
    let mut clauses = Vec::new();

    if let Some(c) = find(ComparisonMetric::TotalUsers).filter(|c| c.trend != Trend::Stable) {
        let verb = if c.trend == Trend::Up { "grew" } else { "fell" };
        clauses.push(format!(
            "user count {verb} by {} ({}%)",
            c.change.abs(),
            c.change_pct.abs()
        ));
    }
    if let Some(c) = find(ComparisonMetric::Utilisation).filter(|c| c.trend != Trend::Stable) {
        let verb = if c.trend == Trend::Up { "rose" } else { "dropped" };
        clauses.push(format!(
            "utilisation {verb} from {}% to {}%",
            c.previous, c.current
        ));
    }
    if let Some(c) = find(ComparisonMetric::TotalIssues).filter(|c| c.trend != Trend::Stable) {
        let verb = if c.trend == Trend::Up { "increased" } else { "decreased" };
        clauses.push(format!("licence issues {verb} by {}", c.change.abs()));
    }
    if let Some(c) = find(ComparisonMetric::DisabledAccounts).filter(|c| c.trend != Trend::Stable) {
        let verb = if c.trend == Trend::Up { "up" } else { "down" };
        clauses.push(format!("disabled accounts {verb} {}", c.change.abs()));
    }

    if clauses.is_empty() {
        return "No significant changes since the previous snapshot.".to_string();
    }
    format!("Since the previous snapshot, {}.", clauses.join("; "))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn snap(d: NaiveDate, part: &str, purchased: u64, assigned: u64, users: u64) -> LicenceSnapshot {
        LicenceSnapshot {
            snapshot_date: d,
            sku_part_number: part.into(),
            title: part.into(),
            purchased,
            assigned,
            total_users: users,
            ..Default::default()
        }
    }

    fn compare(snapshots: &[LicenceSnapshot]) -> Option<MonthComparisonData> {
        let catalog = SkuCatalog::builtin();
        ComparisonEngine::new(&catalog).generate_month_comparison(snapshots)
    }

    // ── Availability ─────────────────────────────────────────────────────────

    #[test]
    fn test_none_without_two_distinct_dates() {
        assert!(compare(&[]).is_none());
        let d = date(2024, 1, 1);
        assert!(compare(&[snap(d, "SPE_E3", 100, 80, 100), snap(d, "SPE_E5", 10, 5, 100)]).is_none());
    }

    // ── Metrics ──────────────────────────────────────────────────────────────

    #[test]
    fn test_utilisation_comparison() {
        let data = compare(&[
            snap(date(2024, 1, 1), "SPE_E3", 100, 80, 100),
            snap(date(2024, 2, 1), "SPE_E3", 100, 95, 110),
        ])
        .unwrap();
        let u = data.metric(ComparisonMetric::Utilisation).unwrap();
        assert_eq!((u.previous, u.current, u.change), (80, 95, 15));
        assert_eq!(u.trend, Trend::Up);
        assert!(u.is_positive);
        assert_eq!(data.metrics.len(), 8);
    }

    #[test]
    fn test_uses_two_most_recent_dates() {
        let data = compare(&[
            snap(date(2024, 3, 1), "SPE_E3", 100, 90, 120),
            snap(date(2024, 1, 1), "SPE_E3", 100, 10, 50),
            snap(date(2024, 2, 1), "SPE_E3", 100, 80, 110),
        ])
        .unwrap();
        assert_eq!(data.previous.snapshot_date, date(2024, 2, 1));
        assert_eq!(data.current.snapshot_date, date(2024, 3, 1));
    }

    #[test]
    fn test_totals_sum_skus_and_take_tenant_counts_from_first_row() {
        let d1 = date(2024, 1, 1);
        let d2 = date(2024, 2, 1);
        let mut a = snap(d2, "SPE_E3", 100, 50, 200);
        a.disabled_count = 4;
        let mut b = snap(d2, "SPE_E5", 50, 50, 999);
        b.disabled_count = 999;
        let data = compare(&[snap(d1, "SPE_E3", 100, 50, 200), a, b]).unwrap();
        assert_eq!(data.current.total_purchased, 150);
        assert_eq!(data.current.total_assigned, 100);
        assert_eq!(data.current.total_users, 200);
        assert_eq!(data.current.disabled_count, 4);
        assert_eq!(data.current.utilisation_pct, 67);
    }

    #[test]
    fn test_excluded_skus_not_summed() {
        let d1 = date(2024, 1, 1);
        let d2 = date(2024, 2, 1);
        let data = compare(&[
            snap(d1, "SPE_E3", 100, 80, 100),
            snap(d2, "SPE_E3", 100, 80, 100),
            snap(d2, "FLOW_FREE", 1_000_000, 5_000, 100),
        ])
        .unwrap();
        assert_eq!(data.current.total_purchased, 100);
        assert_eq!(data.current.utilisation_pct, 80);
    }

    #[test]
    fn test_change_pct_from_zero() {
        assert_eq!(change_pct(0, 5), 100);
        assert_eq!(change_pct(0, 0), 0);
        assert_eq!(change_pct(200, 199), -1);
        assert_eq!(change_pct(1000, 1004), 0);
    }

    #[test]
    fn test_inverted_and_neutral_polarity() {
        let d1 = date(2024, 1, 1);
        let d2 = date(2024, 2, 1);
        let mut prev = snap(d1, "SPE_E3", 100, 80, 100);
        prev.inactive_count = 10;
        prev.dual_count = 2;
        let mut cur = snap(d2, "SPE_E3", 100, 80, 80);
        cur.inactive_count = 5;
        cur.dual_count = 4;
        let data = compare(&[prev, cur]).unwrap();

        let inactive = data.metric(ComparisonMetric::InactiveUsers).unwrap();
        assert_eq!(inactive.trend, Trend::Down);
        assert!(inactive.is_positive);

        let dual = data.metric(ComparisonMetric::DualLicensedUsers).unwrap();
        assert_eq!(dual.trend, Trend::Up);
        assert!(!dual.is_positive);

        let users = data.metric(ComparisonMetric::TotalUsers).unwrap();
        assert_eq!(users.trend, Trend::Down);
        assert!(users.is_positive);

        let issues = data.metric(ComparisonMetric::TotalIssues).unwrap();
        assert_eq!((issues.previous, issues.current), (12, 9));
    }

    #[test]
    fn test_stable_counts_as_positive() {
        let data = compare(&[
            snap(date(2024, 1, 1), "SPE_E3", 100, 80, 100),
            snap(date(2024, 2, 1), "SPE_E3", 100, 80, 100),
        ])
        .unwrap();
        assert!(data.metrics.iter().all(|m| m.trend == Trend::Stable && m.is_positive));
    }

    // ── Summary ──────────────────────────────────────────────────────────────

    #[test]
    fn test_summary_no_changes() {
        let data = compare(&[
            snap(date(2024, 1, 1), "SPE_E3", 100, 80, 100),
            snap(date(2024, 2, 1), "SPE_E3", 100, 80, 100),
        ])
        .unwrap();
        assert_eq!(data.summary, "No significant changes since the previous snapshot.");
    }

    #[test]
    fn test_summary_mentions_changed_metrics_only() {
        let data = compare(&[
            snap(date(2024, 1, 1), "SPE_E3", 100, 80, 100),
            snap(date(2024, 2, 1), "SPE_E3", 100, 95, 110),
        ])
        .unwrap();
        assert!(data.summary.starts_with("Since the previous snapshot"));
        assert!(data.summary.contains("user count grew by 10 (10%)"));
        assert!(data.summary.contains("utilisation rose from 80% to 95%"));
        assert!(!data.summary.contains("issues"));
        assert!(!data.summary.contains("disabled"));
    }
}
