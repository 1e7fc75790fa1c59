//! Plain-text digest of an [`AnalysisReport`] for terminal output.

use std::fmt::Write as _;

use licence_analytics::analysis::AnalysisReport;
use licence_analytics::comparison::Trend;
use licence_core::formatting::{format_currency, format_currency_whole, format_number};

/// How many downgrade summaries and insights the digest lists.
const TOP_N: usize = 3;

pub fn render_text(report: &AnalysisReport) -> String {
    let mut out = String::new();
    let k = &report.kpis;

    let _ = writeln!(out, "Licence intelligence report (as of {})", report.metadata.as_of);
    let _ = writeln!(out);
    let _ = writeln!(out, "{}", report.executive_summary);
    let _ = writeln!(out);

    let _ = writeln!(out, "Key figures");
    let _ = writeln!(
        out,
        "  Users            {} total, {} licensed, {} active ({}%)",
        format_number(k.total_users as f64, 0),
        format_number(k.licensed_users as f64, 0),
        format_number(k.active_users as f64, 0),
        k.active_user_pct
    );
    let _ = writeln!(
        out,
        "  Seats            {} assigned of {} purchased ({}%)",
        format_number(k.total_assigned as f64, 0),
        format_number(k.total_purchased as f64, 0),
        k.overall_utilisation_pct
    );
    let _ = writeln!(
        out,
        "  Spend            {} / month, {} / year",
        format_currency(k.monthly_spend),
        format_currency_whole(k.annual_spend)
    );
    let _ = writeln!(
        out,
        "  Hygiene savings  {} / year across {} issue(s)",
        format_currency_whole(k.potential_annual_savings),
        k.total_issues
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "Alerts");
    for alert in &report.alerts {
        let _ = writeln!(
            out,
            "  [{:<8}] {}: {}",
            alert.severity.as_str(),
            alert.title,
            alert.message
        );
    }

    if !report.downgrades.summaries.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Right-sizing");
        for s in report.downgrades.summaries.iter().take(TOP_N) {
            let _ = writeln!(
                out,
                "  {:<10} {} user(s), {} / year",
                s.label,
                s.user_count,
                format_currency_whole(s.total_annual_savings)
            );
        }
    }

    if let Some(cmp) = &report.comparison {
        let _ = writeln!(out);
        let _ = writeln!(out, "Since {}", cmp.previous.snapshot_date);
        for m in cmp.metrics.iter().filter(|m| m.trend != Trend::Stable) {
            let _ = writeln!(
                out,
                "  {:<22} {} -> {} ({:+}%)",
                m.label, m.previous, m.current, m.change_pct
            );
        }
    }

    if !report.insights.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Insights");
        for insight in report.insights.iter().take(TOP_N) {
            let _ = writeln!(out, "  {}: {}", insight.title, insight.detail);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use licence_analytics::analysis::AnalysisEngine;
    use licence_analytics::config::EngineConfig;
    use licence_core::models::{IssueType, LicenceDataset, LicenceSku, LicenceUser};

    fn report(dataset: &LicenceDataset) -> AnalysisReport {
        AnalysisEngine::new(EngineConfig::default())
            .unwrap()
            .analyze(dataset, None, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
    }

    #[test]
    fn test_empty_report_renders_headline_and_status() {
        let text = render_text(&report(&LicenceDataset::default()));
        assert!(text.starts_with("Licence intelligence report (as of 2024-03-01)"));
        assert!(text.contains("Key figures"));
        assert!(text.contains("[success ]"));
        assert!(!text.contains("Right-sizing"));
        assert!(!text.contains("Since "));
    }

    #[test]
    fn test_downgrades_listed() {
        let dataset = LicenceDataset {
            users: vec![LicenceUser {
                id: "u1".into(),
                display_name: "Ann".into(),
                licences: "Microsoft 365 E5".into(),
                days_since_sign_in: Some(45),
                issue_type: IssueType::None,
                account_enabled: true,
                ..Default::default()
            }],
            skus: vec![LicenceSku {
                sku_part_number: "SPE_E5".into(),
                title: "Microsoft 365 E5".into(),
                purchased: 2,
                assigned: 1,
                utilisation_pct: 50.0,
            }],
            ..Default::default()
        };
        let text = render_text(&report(&dataset));
        assert!(text.contains("Right-sizing"));
        assert!(text.contains("E5 to E3   1 user(s)"));
    }
}
