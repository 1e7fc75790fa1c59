//! Single-cycle analysis pipeline.
//!
//! Builds the shared cost resolver for the cycle's records, then runs the
//! aggregator, downgrade engine, alert generator, comparison engine, usage
//! profile builder and insight generation in that order, returning one
//! [`AnalysisReport`] ready for the presentation layer.

use chrono::{NaiveDate, Utc};
use licence_core::error::Result;
use licence_core::models::{LicenceDataset, UsageTelemetry};
use licence_core::pricing::CostResolver;
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, AlertGenerator};
use crate::comparison::{ComparisonEngine, MonthComparisonData};
use crate::config::EngineConfig;
use crate::downgrade::{DowngradeAnalysis, DowngradeEngine};
use crate::feature_heuristics::{FeatureUsageStrategy, KeywordFeatureHeuristic};
use crate::insights::{executive_summary, generate_insights, Insight};
use crate::kpi::{IssueCategory, KpiAggregator, KpiSummary, SkuCostRow};
use crate::usage_profile::{UsageAnalysis, UsageProfileBuilder};

// ── Public types ──────────────────────────────────────────────────────────────

/// Metadata produced alongside the derived outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    /// ISO-8601 timestamp when this report was generated.
    pub generated_at: String,
    /// Reference date for renewal windows.
    pub as_of: NaiveDate,
    pub users_processed: usize,
    pub skus_processed: usize,
    pub pricing_records: usize,
    pub snapshot_records: usize,
    pub telemetry_available: bool,
    pub app_usage_records: usize,
    /// Wall-clock seconds spent in the engine.
    pub analysis_time_seconds: f64,
}

/// Every derived output of one analysis cycle. Rebuilt wholesale each cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub metadata: AnalysisMetadata,
    pub executive_summary: String,
    pub kpis: KpiSummary,
    pub issue_categories: Vec<IssueCategory>,
    pub sku_costs: Vec<SkuCostRow>,
    pub alerts: Vec<Alert>,
    pub comparison: Option<MonthComparisonData>,
    pub downgrades: DowngradeAnalysis,
    pub usage: UsageAnalysis,
    pub insights: Vec<Insight>,
}

// ── AnalysisEngine ────────────────────────────────────────────────────────────

/// The engine, configured once and reused across cycles. Holds no state
/// between calls to [`AnalysisEngine::analyze`].
pub struct AnalysisEngine {
    config: EngineConfig,
    strategy: Box<dyn FeatureUsageStrategy>,
}

impl AnalysisEngine {
    /// Build the engine with the keyword attribution heuristic, using the
    /// configured feature rules when present.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let strategy = match &config.usage.feature_rules {
            Some(rules) => KeywordFeatureHeuristic::with_rules(rules.clone())?,
            None => KeywordFeatureHeuristic::new(),
        };
        Ok(Self::with_strategy(config, Box::new(strategy)))
    }

    /// Build the engine with a custom feature attribution strategy.
    pub fn with_strategy(config: EngineConfig, strategy: Box<dyn FeatureUsageStrategy>) -> Self {
        Self { config, strategy }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline over one cycle's records.
    pub fn analyze(
        &self,
        dataset: &LicenceDataset,
        telemetry: Option<&UsageTelemetry>,
        as_of: NaiveDate,
    ) -> AnalysisReport {
        let start = std::time::Instant::now();
        let config = &self.config;

        // ── Step 1: Shared cost resolver ──────────────────────────────────────
        let resolver = CostResolver::new(
            &dataset.pricing,
            &dataset.skus,
            &config.catalog,
            &config.standard_pricing,
        );

        // ── Step 2: KPIs ──────────────────────────────────────────────────────
        let kpi_report = KpiAggregator::new(&resolver).aggregate(&dataset.users, &dataset.skus);

        // ── Step 3: Downgrades ────────────────────────────────────────────────
        let downgrade_engine = DowngradeEngine::new(&resolver, &config.downgrade);
        let downgrades = downgrade_engine.generate(&dataset.users);

        // ── Step 4: Alerts ────────────────────────────────────────────────────
        let alerts = AlertGenerator::new(&config.alerts, &config.catalog).generate(
            &kpi_report.summary,
            &dataset.skus,
            &dataset.pricing,
            Some(&downgrades),
            as_of,
        );

        // ── Step 5: Month comparison ──────────────────────────────────────────
        let comparison =
            ComparisonEngine::new(&config.catalog).generate_month_comparison(&dataset.snapshots);

        // ── Step 6: Usage profiles ────────────────────────────────────────────
        let usage = UsageProfileBuilder::new(&downgrade_engine, self.strategy.as_ref(), &config.usage)
            .build(&dataset.users, telemetry);

        // ── Step 7: Insights ──────────────────────────────────────────────────
        let insights = generate_insights(&kpi_report, &downgrades, &usage, comparison.as_ref());
        let summary = executive_summary(&kpi_report.summary, &downgrades, &alerts);

        let metadata = AnalysisMetadata {
            generated_at: Utc::now().to_rfc3339(),
            as_of,
            users_processed: dataset.users.len(),
            skus_processed: dataset.skus.len(),
            pricing_records: dataset.pricing.len(),
            snapshot_records: dataset.snapshots.len(),
            telemetry_available: usage.telemetry_available,
            app_usage_records: telemetry.map(|t| t.app_usage.len()).unwrap_or(0),
            analysis_time_seconds: start.elapsed().as_secs_f64(),
        };

        tracing::info!(
            users = metadata.users_processed,
            alerts = alerts.len(),
            downgrade_candidates = downgrades.recommendations.len(),
            elapsed = metadata.analysis_time_seconds,
            "analysis cycle complete"
        );

        AnalysisReport {
            metadata,
            executive_summary: summary,
            kpis: kpi_report.summary,
            issue_categories: kpi_report.issue_categories,
            sku_costs: kpi_report.sku_costs,
            alerts,
            comparison,
            downgrades,
            usage,
            insights,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertSeverity;
    use licence_core::models::{IssueType, LicencePricing, LicenceSku, LicenceSnapshot, LicenceUser};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn user(id: &str, licences: &str, issue: IssueType, days: u32) -> LicenceUser {
        LicenceUser {
            id: id.into(),
            display_name: id.into(),
            user_principal_name: format!("{id}@contoso.com"),
            account_enabled: issue != IssueType::Disabled,
            licences: licences.into(),
            days_since_sign_in: Some(days),
            issue_type: issue,
            ..Default::default()
        }
    }

    fn engine() -> AnalysisEngine {
        AnalysisEngine::new(EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_empty_dataset_is_well_defined() {
        let report = engine().analyze(&LicenceDataset::default(), None, date(2024, 3, 1));
        assert_eq!(report.kpis.total_users, 0);
        assert_eq!(report.kpis.overall_utilisation_pct, 0);
        assert_eq!(report.issue_categories.len(), 4);
        assert!(report.comparison.is_none());
        assert!(report.usage.feature_stats.is_empty());
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].severity, AlertSeverity::Success);
        assert!(!report.metadata.telemetry_available);
    }

    #[test]
    fn test_disabled_user_savings_and_critical_alert() {
        let dataset = LicenceDataset {
            users: vec![user("d", "Contoso Suite", IssueType::Disabled, 200)],
            skus: vec![LicenceSku {
                sku_part_number: "CONTOSO_SUITE".into(),
                title: "Contoso Suite".into(),
                purchased: 1,
                assigned: 1,
                utilisation_pct: 100.0,
            }],
            pricing: vec![LicencePricing {
                title: "Contoso Suite".into(),
                monthly_cost: Some(30.0),
                ..Default::default()
            }],
            snapshots: Vec::new(),
        };
        let report = engine().analyze(&dataset, None, date(2024, 3, 1));
        assert!((report.kpis.potential_monthly_savings - 30.0).abs() < 1e-9);
        assert!((report.kpis.potential_annual_savings - 360.0).abs() < 1e-9);
        assert!(report
            .alerts
            .iter()
            .any(|a| a.severity == AlertSeverity::Critical
                && a.title == "Disabled accounts holding licences"));
        assert_eq!(report.kpis.annual_spend, 12.0 * report.kpis.monthly_spend);
    }

    #[test]
    fn test_full_cycle_wires_every_component() {
        let dataset = LicenceDataset {
            users: vec![
                user("e5", "Microsoft 365 E5", IssueType::None, 45),
                user("dual", "Microsoft 365 E3, Office 365 E3", IssueType::DualLicensed, 2),
            ],
            skus: vec![LicenceSku {
                sku_part_number: "SPE_E5".into(),
                title: "Microsoft 365 E5".into(),
                purchased: 10,
                assigned: 9,
                utilisation_pct: 90.0,
            }],
            pricing: vec![LicencePricing {
                title: "Microsoft 365 E5".into(),
                monthly_cost: Some(55.0),
                renewal_date: Some(date(2024, 3, 20)),
                ..Default::default()
            }],
            snapshots: vec![
                LicenceSnapshot {
                    snapshot_date: date(2024, 1, 1),
                    sku_part_number: "SPE_E5".into(),
                    purchased: 10,
                    assigned: 8,
                    ..Default::default()
                },
                LicenceSnapshot {
                    snapshot_date: date(2024, 2, 1),
                    sku_part_number: "SPE_E5".into(),
                    purchased: 10,
                    assigned: 9,
                    ..Default::default()
                },
            ],
        };
        let report = engine().analyze(&dataset, None, date(2024, 3, 1));

        assert!((report.kpis.monthly_spend - 550.0).abs() < 1e-9);
        assert_eq!(report.downgrades.recommendations.len(), 1);
        assert_eq!(report.downgrades.recommendations[0].user_id, "e5");
        assert!(report.comparison.is_some());
        assert_eq!(report.usage.profiles.len(), 2);
        assert!(report.alerts.iter().any(|a| a.title == "Microsoft 365 E5 renewal due"));
        assert!(!report.insights.is_empty());
        assert!(report.executive_summary.contains("licensed users"));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("executiveSummary").is_some());
        assert!(json["kpis"].get("overallUtilisationPct").is_some());
    }

    #[test]
    fn test_custom_strategy_is_used() {
        use crate::feature_heuristics::{E5Feature, FeatureContext, FeatureVerdict};

        struct AllUsed;
        impl FeatureUsageStrategy for AllUsed {
            fn name(&self) -> &str {
                "all-used"
            }
            fn assess(&self, _f: E5Feature, _c: &FeatureContext<'_>) -> FeatureVerdict {
                FeatureVerdict {
                    used: true,
                    confidence: 100,
                    basis: "fixture".into(),
                }
            }
        }

        let engine = AnalysisEngine::with_strategy(EngineConfig::default(), Box::new(AllUsed));
        let dataset = LicenceDataset {
            users: vec![user("e5", "Microsoft 365 E5", IssueType::None, 5)],
            ..Default::default()
        };
        let report = engine.analyze(&dataset, None, date(2024, 3, 1));
        assert_eq!(report.usage.attribution_strategy, "all-used");
        assert_eq!(report.usage.profiles[0].e5_utilisation_pct, 100);
        assert!(report.usage.profiles[0].recommendation.is_none());
    }
}
