//! Cost and KPI aggregation.
//!
//! Joins users, SKUs and pricing into the headline [`KpiSummary`], one
//! [`IssueCategory`] per hygiene issue type and a per-SKU cost table. Free and
//! viral SKUs are listed but never summed.

use licence_core::formatting::rounded_pct;
use licence_core::models::{IssueType, LicenceSku, LicenceUser};
use licence_core::pricing::{CostResolver, PriceSource, ResolutionDepth, UserCostBreakdown};
use licence_core::sku::SkuTier;
use serde::{Deserialize, Serialize};

use crate::alerts::AlertSeverity;

// ── Output types ──────────────────────────────────────────────────────────────

/// Headline licence KPIs for one analysis cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiSummary {
    pub total_users: u64,
    /// Users holding at least one licence.
    pub licensed_users: u64,
    /// Licensed users not flagged disabled or inactive.
    pub active_users: u64,
    pub active_user_pct: u32,
    pub disabled_count: u64,
    /// Disabled accounts that still hold a licence.
    pub disabled_with_licences: u64,
    pub inactive_count: u64,
    pub dual_licensed_count: u64,
    pub service_account_count: u64,
    pub total_issues: u64,
    pub paid_sku_count: u64,
    pub excluded_sku_count: u64,
    pub total_purchased: u64,
    pub total_assigned: u64,
    pub total_available: i64,
    pub overall_utilisation_pct: u32,
    pub monthly_spend: f64,
    pub annual_spend: f64,
    /// Cost of purchased-but-unassigned seats on paid SKUs.
    pub wasted_monthly_spend: f64,
    pub potential_monthly_savings: f64,
    pub potential_annual_savings: f64,
}

/// Roll-up of one licence-hygiene issue type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCategory {
    pub issue_type: IssueType,
    pub label: String,
    pub description: String,
    pub severity: AlertSeverity,
    pub user_count: u64,
    /// Licences held by the affected users.
    pub licence_count: u64,
    /// Monthly cost of every licence held by the affected users.
    pub monthly_licence_cost: f64,
    pub potential_monthly_savings: f64,
    pub potential_annual_savings: f64,
}

/// Cost row for one SKU.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkuCostRow {
    pub sku_part_number: String,
    pub friendly_name: String,
    pub tier: SkuTier,
    pub is_excluded_from_aggregates: bool,
    pub purchased: u64,
    pub assigned: u64,
    pub available: i64,
    pub utilisation_pct: u32,
    pub unit_monthly_cost: f64,
    pub price_source: PriceSource,
    pub monthly_cost: f64,
    pub unused_monthly_cost: f64,
}

/// Everything the aggregator produces.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiReport {
    pub summary: KpiSummary,
    pub issue_categories: Vec<IssueCategory>,
    pub sku_costs: Vec<SkuCostRow>,
}

// ── KpiAggregator ─────────────────────────────────────────────────────────────

/// Stateless aggregator over one cycle's records.
pub struct KpiAggregator<'a> {
    resolver: &'a CostResolver<'a>,
}

impl<'a> KpiAggregator<'a> {
    pub fn new(resolver: &'a CostResolver<'a>) -> Self {
        Self { resolver }
    }

    /// Build the KPI summary, issue categories and SKU cost rows.
    pub fn aggregate(&self, users: &[LicenceUser], skus: &[LicenceSku]) -> KpiReport {
        let sku_costs = self.sku_costs(skus);
        let breakdowns: Vec<(&LicenceUser, UserCostBreakdown)> = users
            .iter()
            .map(|u| (u, self.resolver.user_breakdown(u, ResolutionDepth::Listed)))
            .collect();

        let mut summary = KpiSummary {
            total_users: users.len() as u64,
            ..Default::default()
        };

        for row in &sku_costs {
            if row.is_excluded_from_aggregates {
                summary.excluded_sku_count += 1;
                continue;
            }
            summary.paid_sku_count += 1;
            summary.total_purchased += row.purchased;
            summary.total_assigned += row.assigned;
            summary.monthly_spend += row.monthly_cost;
            summary.wasted_monthly_spend += row.unused_monthly_cost;
        }
        summary.total_available = summary.total_purchased as i64 - summary.total_assigned as i64;
        summary.overall_utilisation_pct =
            rounded_pct(summary.total_assigned as f64, summary.total_purchased as f64);
        summary.annual_spend = summary.monthly_spend * 12.0;

        for (user, breakdown) in &breakdowns {
            let licensed = user.has_licences();
            if licensed {
                summary.licensed_users += 1;
            }
            match user.issue_type {
                IssueType::Disabled => {
                    summary.disabled_count += 1;
                    if licensed {
                        summary.disabled_with_licences += 1;
                    }
                }
                IssueType::Inactive90 => summary.inactive_count += 1,
                IssueType::DualLicensed => summary.dual_licensed_count += 1,
                IssueType::ServiceAccount => summary.service_account_count += 1,
                IssueType::None => {}
            }
            if licensed && !matches!(user.issue_type, IssueType::Disabled | IssueType::Inactive90) {
                summary.active_users += 1;
            }
            summary.potential_monthly_savings += breakdown.potential_monthly_savings;
        }
        summary.total_issues = summary.disabled_count
            + summary.inactive_count
            + summary.dual_licensed_count
            + summary.service_account_count;
        summary.active_user_pct =
            rounded_pct(summary.active_users as f64, summary.licensed_users as f64);
        summary.potential_annual_savings = summary.potential_monthly_savings * 12.0;

        let issue_categories = IssueType::FLAGGED
            .iter()
            .map(|issue| issue_category(*issue, &breakdowns))
            .collect();

        tracing::debug!(
            users = summary.total_users,
            paid_skus = summary.paid_sku_count,
            utilisation = summary.overall_utilisation_pct,
            monthly_spend = summary.monthly_spend,
            "kpi aggregation complete"
        );

        KpiReport {
            summary,
            issue_categories,
            sku_costs,
        }
    }

    /// Per-SKU cost rows, most expensive first.
    pub fn sku_costs(&self, skus: &[LicenceSku]) -> Vec<SkuCostRow> {
        let catalog = self.resolver.catalog();
        let mut rows: Vec<SkuCostRow> = skus
            .iter()
            .map(|sku| {
                let class = catalog.classify(&sku.sku_part_number, Some(sku.purchased));
                let price = if class.is_excluded_from_aggregates {
                    None
                } else {
                    Some(self.resolver.resolve_sku(sku))
                };
                let unit = price.as_ref().map(|p| p.monthly_cost).unwrap_or(0.0);
                let available = sku.available();
                SkuCostRow {
                    sku_part_number: sku.sku_part_number.clone(),
                    friendly_name: class.friendly_name,
                    tier: class.tier,
                    is_excluded_from_aggregates: class.is_excluded_from_aggregates,
                    purchased: sku.purchased,
                    assigned: sku.assigned,
                    available,
                    utilisation_pct: rounded_pct(sku.assigned as f64, sku.purchased as f64),
                    unit_monthly_cost: unit,
                    price_source: price.map(|p| p.source).unwrap_or(PriceSource::NotFound),
                    monthly_cost: sku.purchased as f64 * unit,
                    unused_monthly_cost: available.max(0) as f64 * unit,
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.monthly_cost
                .total_cmp(&a.monthly_cost)
                .then_with(|| a.sku_part_number.cmp(&b.sku_part_number))
        });
        rows
    }
}

fn issue_category(issue: IssueType, breakdowns: &[(&LicenceUser, UserCostBreakdown)]) -> IssueCategory {
    let (label, description, severity) = match issue {
        IssueType::Disabled => (
            "Disabled accounts",
            "Disabled accounts still holding licences; every licence can be reclaimed.",
            AlertSeverity::Critical,
        ),
        IssueType::Inactive90 => (
            "Inactive 90+ days",
            "Enabled accounts with no sign-in for 90 days or more.",
            AlertSeverity::Warning,
        ),
        IssueType::DualLicensed => (
            "Dual-licensed users",
            "Users holding overlapping licence tiers; the highest tier is kept, the rest are redundant.",
            AlertSeverity::Warning,
        ),
        IssueType::ServiceAccount => (
            "Service accounts",
            "Licensed service accounts; review manually, not counted as savings.",
            AlertSeverity::Info,
        ),
        IssueType::None => ("No issue", "", AlertSeverity::Success),
    };

    let mut category = IssueCategory {
        issue_type: issue,
        label: label.to_string(),
        description: description.to_string(),
        severity,
        user_count: 0,
        licence_count: 0,
        monthly_licence_cost: 0.0,
        potential_monthly_savings: 0.0,
        potential_annual_savings: 0.0,
    };
    for (user, breakdown) in breakdowns.iter().filter(|(u, _)| u.issue_type == issue) {
        category.user_count += 1;
        category.licence_count += user.licence_names().len() as u64;
        category.monthly_licence_cost += breakdown.total_monthly_cost;
        category.potential_monthly_savings += breakdown.potential_monthly_savings;
    }
    category.potential_annual_savings = category.potential_monthly_savings * 12.0;
    category
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use licence_core::models::LicencePricing;
    use licence_core::sku::SkuCatalog;

    fn sku(part: &str, title: &str, purchased: u64, assigned: u64) -> LicenceSku {
        LicenceSku {
            sku_part_number: part.into(),
            title: title.into(),
            purchased,
            assigned,
            utilisation_pct: 0.0,
        }
    }

    fn price(title: &str, monthly: f64) -> LicencePricing {
        LicencePricing {
            title: title.into(),
            monthly_cost: Some(monthly),
            ..Default::default()
        }
    }

    fn user(id: &str, issue: IssueType, licences: &str) -> LicenceUser {
        LicenceUser {
            id: id.into(),
            display_name: id.into(),
            licences: licences.into(),
            issue_type: issue,
            account_enabled: issue != IssueType::Disabled,
            days_since_sign_in: Some(5),
            ..Default::default()
        }
    }

    fn run(users: &[LicenceUser], skus: &[LicenceSku], pricing: &[LicencePricing]) -> KpiReport {
        let catalog = SkuCatalog::builtin();
        let resolver = CostResolver::new(pricing, skus, &catalog, &[]);
        KpiAggregator::new(&resolver).aggregate(users, skus)
    }

    // ── Seat and spend totals ────────────────────────────────────────────────

    #[test]
    fn test_viral_skus_excluded_from_totals() {
        let skus = vec![
            sku("SPE_E3", "Microsoft 365 E3", 100, 80),
            sku("FLOW_FREE", "Power Automate Free", 1_000_000, 400),
            sku("CONTOSO_TRIALISH", "Big Seat SKU", 500_000, 10),
        ];
        let pricing = vec![price("Microsoft 365 E3", 30.0), price("Big Seat SKU", 1.0)];
        let r = run(&[], &skus, &pricing);
        assert_eq!(r.summary.total_purchased, 100);
        assert_eq!(r.summary.total_assigned, 80);
        assert_eq!(r.summary.overall_utilisation_pct, 80);
        assert_eq!(r.summary.paid_sku_count, 1);
        assert_eq!(r.summary.excluded_sku_count, 2);
        assert!((r.summary.monthly_spend - 3_000.0).abs() < 1e-9);
        assert!((r.summary.wasted_monthly_spend - 600.0).abs() < 1e-9);
    }

    #[test]
    fn test_annual_spend_is_twelve_times_monthly() {
        let skus = vec![sku("SPE_E5", "Microsoft 365 E5", 7, 7)];
        let pricing = vec![price("Microsoft 365 E5", 54.75)];
        let r = run(&[], &skus, &pricing);
        assert_eq!(r.summary.annual_spend, 12.0 * r.summary.monthly_spend);
    }

    #[test]
    fn test_zero_purchased_gives_zero_utilisation() {
        let r = run(&[], &[], &[]);
        assert_eq!(r.summary.overall_utilisation_pct, 0);
        assert_eq!(r.summary.monthly_spend, 0.0);
        assert_eq!(r.issue_categories.len(), 4);
    }

    #[test]
    fn test_over_allocation_utilisation_above_100() {
        let skus = vec![sku("SPE_E3", "Microsoft 365 E3", 10, 12)];
        let r = run(&[], &skus, &[]);
        assert_eq!(r.summary.overall_utilisation_pct, 120);
        assert_eq!(r.summary.total_available, -2);
        assert_eq!(r.sku_costs[0].unused_monthly_cost, 0.0);
    }

    #[test]
    fn test_unpriced_sku_costs_nothing() {
        let skus = vec![sku("CONTOSO_APP", "Contoso App", 10, 5)];
        let r = run(&[], &skus, &[]);
        assert_eq!(r.sku_costs[0].price_source, PriceSource::NotFound);
        assert_eq!(r.summary.monthly_spend, 0.0);
    }

    #[test]
    fn test_sku_rows_sorted_by_cost() {
        let skus = vec![
            sku("SPE_E3", "Microsoft 365 E3", 10, 10),
            sku("SPE_E5", "Microsoft 365 E5", 10, 10),
        ];
        let pricing = vec![price("Microsoft 365 E3", 30.0), price("Microsoft 365 E5", 55.0)];
        let r = run(&[], &skus, &pricing);
        assert_eq!(r.sku_costs[0].sku_part_number, "SPE_E5");
    }

    // ── Users and savings ────────────────────────────────────────────────────

    #[test]
    fn test_disabled_user_savings() {
        let users = vec![user("d1", IssueType::Disabled, "Microsoft 365 E3")];
        let pricing = vec![price("Microsoft 365 E3", 30.0)];
        let r = run(&users, &[], &pricing);
        assert!((r.summary.potential_monthly_savings - 30.0).abs() < 1e-9);
        assert!((r.summary.potential_annual_savings - 360.0).abs() < 1e-9);
        assert_eq!(r.summary.disabled_with_licences, 1);
    }

    #[test]
    fn test_dual_licensed_savings_keep_highest() {
        let users = vec![user("u", IssueType::DualLicensed, "A, B, C")];
        let pricing = vec![price("A", 10.0), price("B", 25.0), price("C", 5.0)];
        let r = run(&users, &[], &pricing);
        assert!((r.summary.potential_monthly_savings - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_service_accounts_never_count_as_savings() {
        let users = vec![user("svc", IssueType::ServiceAccount, "Microsoft 365 E3")];
        let pricing = vec![price("Microsoft 365 E3", 30.0)];
        let r = run(&users, &[], &pricing);
        assert_eq!(r.summary.potential_monthly_savings, 0.0);
        let svc = r
            .issue_categories
            .iter()
            .find(|c| c.issue_type == IssueType::ServiceAccount)
            .unwrap();
        assert_eq!(svc.user_count, 1);
        assert!((svc.monthly_licence_cost - 30.0).abs() < 1e-9);
        assert_eq!(svc.potential_monthly_savings, 0.0);
    }

    #[test]
    fn test_user_counts() {
        let users = vec![
            user("a", IssueType::None, "Microsoft 365 E3"),
            user("b", IssueType::Inactive90, "Microsoft 365 E3"),
            user("c", IssueType::Disabled, ""),
            user("d", IssueType::DualLicensed, "Microsoft 365 E3, Microsoft 365 E5"),
            user("e", IssueType::None, ""),
        ];
        let r = run(&users, &[], &[]);
        let s = &r.summary;
        assert_eq!(s.total_users, 5);
        assert_eq!(s.licensed_users, 3);
        assert_eq!(s.active_users, 2);
        assert_eq!(s.active_user_pct, 67);
        assert_eq!(s.disabled_count, 1);
        assert_eq!(s.disabled_with_licences, 0);
        assert_eq!(s.total_issues, 3);
    }

    #[test]
    fn test_issue_categories_fixed_order() {
        let r = run(&[], &[], &[]);
        let order: Vec<IssueType> = r.issue_categories.iter().map(|c| c.issue_type).collect();
        assert_eq!(order, IssueType::FLAGGED.to_vec());
    }
}
