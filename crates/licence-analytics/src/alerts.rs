//! Proactive alert rules.
//!
//! Every rule is evaluated independently against the KPI summary, the raw SKU
//! and pricing records and (optionally) the downgrade analysis. The result is
//! sorted by severity with generation order preserved inside each severity.

use chrono::NaiveDate;
use licence_core::formatting::{format_currency_whole, format_number, rounded_pct};
use licence_core::models::{LicencePricing, LicenceSku};
use licence_core::sku::SkuCatalog;
use licence_core::time_utils::days_until;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::downgrade::DowngradeAnalysis;
use crate::kpi::KpiSummary;

// ── Alert types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
    Success,
}

impl AlertSeverity {
    /// Sort rank, most urgent first.
    pub fn rank(&self) -> u8 {
        match self {
            AlertSeverity::Critical => 0,
            AlertSeverity::Warning => 1,
            AlertSeverity::Info => 2,
            AlertSeverity::Success => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Critical => "critical",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Info => "info",
            AlertSeverity::Success => "success",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertCategory {
    Allocation,
    Utilisation,
    Savings,
    Hygiene,
    Activity,
    Renewal,
    Optimisation,
    Status,
}

/// Where a consumer should navigate to act on an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertTarget {
    Licences,
    Issues,
    Costs,
    Recommendations,
    Users,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    /// Fresh per cycle; alerts are not deduplicated across cycles.
    pub id: Uuid,
    pub severity: AlertSeverity,
    pub category: AlertCategory,
    pub title: String,
    pub message: String,
    /// Short human-readable figure, e.g. `"£52,340/yr"`.
    pub metric: String,
    pub target: Option<AlertTarget>,
}

impl Alert {
    fn new(
        severity: AlertSeverity,
        category: AlertCategory,
        title: impl Into<String>,
        message: impl Into<String>,
        metric: impl Into<String>,
        target: Option<AlertTarget>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            severity,
            category,
            title: title.into(),
            message: message.into(),
            metric: metric.into(),
            target,
        }
    }
}

// ── Thresholds ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AlertThresholds {
    /// Seat floor for the capacity and low-utilisation rules.
    pub min_purchased_for_utilisation: u64,
    pub near_capacity_pct: u32,
    pub low_utilisation_pct: u32,
    pub savings_critical_annual: f64,
    pub savings_warning_annual: f64,
    pub downgrade_info_annual: f64,
    /// Potential monthly savings as a share of monthly spend.
    pub savings_share_of_spend: f64,
    pub inactive_min_count: u64,
    pub inactive_min_share: f64,
    pub active_user_pct_floor: u32,
    pub renewal_critical_days: i64,
    pub renewal_warning_days: i64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            min_purchased_for_utilisation: 10,
            near_capacity_pct: 90,
            low_utilisation_pct: 50,
            savings_critical_annual: 50_000.0,
            savings_warning_annual: 10_000.0,
            downgrade_info_annual: 5_000.0,
            savings_share_of_spend: 0.15,
            inactive_min_count: 10,
            inactive_min_share: 0.05,
            active_user_pct_floor: 75,
            renewal_critical_days: 30,
            renewal_warning_days: 90,
        }
    }
}

// ── AlertGenerator ────────────────────────────────────────────────────────────

pub struct AlertGenerator<'a> {
    thresholds: &'a AlertThresholds,
    catalog: &'a SkuCatalog,
}

impl<'a> AlertGenerator<'a> {
    pub fn new(thresholds: &'a AlertThresholds, catalog: &'a SkuCatalog) -> Self {
        Self {
            thresholds,
            catalog,
        }
    }

    /// Evaluate every rule and return the prioritised alert list.
    pub fn generate(
        &self,
        kpis: &KpiSummary,
        skus: &[LicenceSku],
        pricing: &[LicencePricing],
        downgrades: Option<&DowngradeAnalysis>,
        as_of: NaiveDate,
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let paid: Vec<&LicenceSku> = skus
            .iter()
            .filter(|s| !self.catalog.is_excluded(&s.sku_part_number, Some(s.purchased)))
            .collect();

        self.allocation_alerts(&paid, &mut alerts);
        self.savings_alerts(kpis, downgrades, &mut alerts);
        self.hygiene_alerts(kpis, &mut alerts);
        self.renewal_alerts(pricing, as_of, &mut alerts);

        if alerts.is_empty() {
            alerts.push(Alert::new(
                AlertSeverity::Success,
                AlertCategory::Status,
                "Licence estate healthy",
                "No allocation, savings, hygiene or renewal issues detected.",
                format!("{}% utilised", kpis.overall_utilisation_pct),
                None,
            ));
        }

        // Stable: ties keep generation order.
        alerts.sort_by_key(|a| a.severity.rank());
        tracing::debug!(alerts = alerts.len(), "alerts generated");
        alerts
    }

    fn allocation_alerts(&self, paid: &[&LicenceSku], alerts: &mut Vec<Alert>) {
        let t = self.thresholds;

        let over: Vec<&&LicenceSku> = paid.iter().filter(|s| s.assigned > s.purchased).collect();
        if !over.is_empty() {
            let seats: u64 = over.iter().map(|s| s.assigned - s.purchased).sum();
            alerts.push(Alert::new(
                AlertSeverity::Critical,
                AlertCategory::Allocation,
                "Licences over-allocated",
                format!(
                    "{} SKU(s) have more seats assigned than purchased; true-up required.",
                    over.len()
                ),
                format!("{seats} seats over"),
                Some(AlertTarget::Licences),
            ));
        }

        let sized: Vec<(&LicenceSku, u32)> = paid
            .iter()
            .filter(|s| s.purchased >= t.min_purchased_for_utilisation)
            .map(|s| (*s, rounded_pct(s.assigned as f64, s.purchased as f64)))
            .collect();

        let near_capacity = sized
            .iter()
            .filter(|(_, pct)| (t.near_capacity_pct..100).contains(pct))
            .fold(None::<&(&LicenceSku, u32)>, |best, cur| match best {
                Some(b) if b.1 >= cur.1 => Some(b),
                _ => Some(cur),
            });
        if let Some((sku, pct)) = near_capacity {
            let remaining = sku.available().max(0);
            alerts.push(Alert::new(
                AlertSeverity::Warning,
                AlertCategory::Utilisation,
                "Licence nearing capacity",
                format!(
                    "{} is {pct}% utilised with {remaining} seat(s) remaining.",
                    self.catalog.friendly_name(&sku.sku_part_number)
                ),
                format!("{remaining} seats left"),
                Some(AlertTarget::Licences),
            ));
        }

        let low: Vec<&(&LicenceSku, u32)> = sized
            .iter()
            .filter(|(_, pct)| *pct < t.low_utilisation_pct)
            .collect();
        if !low.is_empty() {
            let unused: i64 = low.iter().map(|(s, _)| s.available().max(0)).sum();
            alerts.push(Alert::new(
                AlertSeverity::Info,
                AlertCategory::Utilisation,
                "Low licence utilisation",
                format!(
                    "{} SKU(s) are under {}% utilised; consider reducing seat counts at renewal.",
                    low.len(),
                    t.low_utilisation_pct
                ),
                format!("{} unused seats", format_number(unused as f64, 0)),
                Some(AlertTarget::Licences),
            ));
        }
    }

    fn savings_alerts(
        &self,
        kpis: &KpiSummary,
        downgrades: Option<&DowngradeAnalysis>,
        alerts: &mut Vec<Alert>,
    ) {
        let t = self.thresholds;
        let annual = kpis.potential_annual_savings;

        if annual >= t.savings_critical_annual {
            alerts.push(Alert::new(
                AlertSeverity::Critical,
                AlertCategory::Savings,
                "Significant savings available",
                "Reclaiming licences from disabled, inactive and dual-licensed users would save a significant amount.",
                format!("{}/yr", format_currency_whole(annual)),
                Some(AlertTarget::Costs),
            ));
        } else if annual >= t.savings_warning_annual {
            alerts.push(Alert::new(
                AlertSeverity::Warning,
                AlertCategory::Savings,
                "Savings available",
                "Licences held by disabled, inactive and dual-licensed users can be reclaimed.",
                format!("{}/yr", format_currency_whole(annual)),
                Some(AlertTarget::Costs),
            ));
        }

        if let Some(d) = downgrades {
            if d.total_annual_savings >= t.downgrade_info_annual {
                alerts.push(Alert::new(
                    AlertSeverity::Info,
                    AlertCategory::Optimisation,
                    "Licence right-sizing opportunity",
                    format!(
                        "{} user(s) could move to a cheaper licence tier.",
                        d.recommendations.len()
                    ),
                    format!("{}/yr", format_currency_whole(d.total_annual_savings)),
                    Some(AlertTarget::Recommendations),
                ));
            }
        }

        if kpis.monthly_spend > 0.0
            && kpis.potential_monthly_savings >= t.savings_share_of_spend * kpis.monthly_spend
        {
            let share = rounded_pct(kpis.potential_monthly_savings, kpis.monthly_spend);
            alerts.push(Alert::new(
                AlertSeverity::Warning,
                AlertCategory::Savings,
                "High share of spend is recoverable",
                format!("{share}% of monthly licence spend is tied up in reclaimable licences."),
                format!("{share}% of spend"),
                Some(AlertTarget::Costs),
            ));
        }
    }

    fn hygiene_alerts(&self, kpis: &KpiSummary, alerts: &mut Vec<Alert>) {
        let t = self.thresholds;

        if kpis.disabled_with_licences > 0 {
            alerts.push(Alert::new(
                AlertSeverity::Critical,
                AlertCategory::Hygiene,
                "Disabled accounts holding licences",
                "Disabled accounts still hold licences that can be reclaimed immediately.",
                format!("{} accounts", kpis.disabled_with_licences),
                Some(AlertTarget::Issues),
            ));
        }

        if kpis.dual_licensed_count > 0 {
            alerts.push(Alert::new(
                AlertSeverity::Warning,
                AlertCategory::Hygiene,
                "Dual-licensed users",
                "Users hold overlapping licence tiers; remove the redundant lower tiers.",
                format!("{} users", kpis.dual_licensed_count),
                Some(AlertTarget::Issues),
            ));
        }

        let inactive_floor = t.inactive_min_share * kpis.licensed_users as f64;
        if kpis.inactive_count >= t.inactive_min_count
            && kpis.inactive_count as f64 >= inactive_floor
        {
            alerts.push(Alert::new(
                AlertSeverity::Warning,
                AlertCategory::Activity,
                "Many inactive users",
                "A notable share of licensed users has not signed in for 90 days or more.",
                format!("{} users", kpis.inactive_count),
                Some(AlertTarget::Users),
            ));
        }

        if kpis.licensed_users > 0 && kpis.active_user_pct < t.active_user_pct_floor {
            alerts.push(Alert::new(
                AlertSeverity::Info,
                AlertCategory::Activity,
                "Low active-user rate",
                format!(
                    "Only {}% of licensed users are active.",
                    kpis.active_user_pct
                ),
                format!("{}% active", kpis.active_user_pct),
                Some(AlertTarget::Users),
            ));
        }
    }

    fn renewal_alerts(&self, pricing: &[LicencePricing], as_of: NaiveDate, alerts: &mut Vec<Alert>) {
        let t = self.thresholds;
        for row in pricing {
            let Some(renewal) = row.renewal_date else {
                continue;
            };
            let days = days_until(as_of, renewal);
            let severity = if (0..=t.renewal_critical_days).contains(&days) {
                AlertSeverity::Critical
            } else if days > t.renewal_critical_days && days <= t.renewal_warning_days {
                AlertSeverity::Warning
            } else {
                continue;
            };
            alerts.push(Alert::new(
                severity,
                AlertCategory::Renewal,
                format!("{} renewal due", row.title),
                format!(
                    "{} renews on {}; review seat counts before the renewal date.",
                    row.title,
                    renewal.format("%Y-%m-%d")
                ),
                format!("{days} days"),
                Some(AlertTarget::Costs),
            ));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
