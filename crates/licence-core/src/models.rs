use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Days-since-sign-in assumed for accounts that have never signed in.
pub const NEVER_SIGNED_IN_DAYS: u32 = 999;

/// Licence-hygiene classification assigned upstream to every user record.
///
/// The classes are mutually exclusive; the engine trusts the upstream value
/// and never recomputes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum IssueType {
    #[default]
    #[serde(rename = "None")]
    None,
    #[serde(rename = "Disabled")]
    Disabled,
    #[serde(rename = "Dual-Licensed")]
    DualLicensed,
    #[serde(rename = "Inactive 90+")]
    Inactive90,
    #[serde(rename = "Service Account")]
    ServiceAccount,
}

impl IssueType {
    /// Issue types that represent an actual problem, in reporting order.
    pub const FLAGGED: [IssueType; 4] = [
        IssueType::Disabled,
        IssueType::Inactive90,
        IssueType::DualLicensed,
        IssueType::ServiceAccount,
    ];

    /// The label used by the upstream extract.
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::None => "None",
            IssueType::Disabled => "Disabled",
            IssueType::DualLicensed => "Dual-Licensed",
            IssueType::Inactive90 => "Inactive 90+",
            IssueType::ServiceAccount => "Service Account",
        }
    }

    /// Lenient parse of the upstream label. Unknown labels map to `None`.
    pub fn parse(value: &str) -> Self {
        let key: String = value
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '+')
            .collect();
        match key.as_str() {
            "disabled" => IssueType::Disabled,
            "duallicensed" | "dual" => IssueType::DualLicensed,
            "inactive90+" | "inactive90" | "inactive" => IssueType::Inactive90,
            "serviceaccount" | "service" => IssueType::ServiceAccount,
            "" | "none" => IssueType::None,
            _ => {
                tracing::warn!(issue_type = value, "unrecognised issue type; treating as None");
                IssueType::None
            }
        }
    }
}

impl From<String> for IssueType {
    fn from(value: String) -> Self {
        IssueType::parse(&value)
    }
}

impl std::fmt::Display for IssueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One employee or account record from the licence extract.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenceUser {
    /// Directory object id.
    pub id: String,
    pub display_name: String,
    /// Sign-in name; used to join telemetry rows to users.
    #[serde(default)]
    pub user_principal_name: String,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default = "default_true")]
    pub account_enabled: bool,
    /// Comma-joined list of held licence names.
    #[serde(default)]
    pub licences: String,
    #[serde(default)]
    pub last_sign_in: Option<DateTime<Utc>>,
    /// `None` when the account has never signed in.
    #[serde(default)]
    pub days_since_sign_in: Option<u32>,
    #[serde(default)]
    pub issue_type: IssueType,
}

fn default_true() -> bool {
    true
}

impl LicenceUser {
    /// Individual licence names, trimmed, with empty fragments dropped.
    pub fn licence_names(&self) -> Vec<&str> {
        self.licences
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn has_licences(&self) -> bool {
        !self.licence_names().is_empty()
    }

    /// Days since the last sign-in, with never-signed-in accounts mapped to
    /// [`NEVER_SIGNED_IN_DAYS`].
    pub fn days_inactive(&self) -> u32 {
        self.days_since_sign_in.unwrap_or(NEVER_SIGNED_IN_DAYS)
    }

    /// Department name, or `"Unassigned"` when blank.
    pub fn department_or_default(&self) -> &str {
        match self.department.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d,
            _ => "Unassigned",
        }
    }
}

/// One purchasable licence type with its seat counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenceSku {
    /// Vendor SKU identifier, e.g. `SPE_E5`.
    pub sku_part_number: String,
    /// Friendly title as extracted upstream.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub purchased: u64,
    #[serde(default)]
    pub assigned: u64,
    /// Upstream-derived utilisation; informational only.
    #[serde(default)]
    pub utilisation_pct: f64,
}

impl LicenceSku {
    /// `purchased − assigned`; negative when over-allocated.
    pub fn available(&self) -> i64 {
        self.purchased as i64 - self.assigned as i64
    }

    /// Utilisation recomputed from the seat counts (0 when nothing purchased).
    pub fn computed_utilisation_pct(&self) -> f64 {
        if self.purchased == 0 {
            0.0
        } else {
            100.0 * self.assigned as f64 / self.purchased as f64
        }
    }
}

/// Per-seat cost for a licence title.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicencePricing {
    pub title: String,
    #[serde(default)]
    pub monthly_cost: Option<f64>,
    #[serde(default)]
    pub annual_cost: Option<f64>,
    #[serde(default)]
    pub renewal_date: Option<NaiveDate>,
}

impl LicencePricing {
    /// Monthly per-seat cost, deriving it from the annual figure when only
    /// that is present. Missing or negative values yield 0.
    pub fn effective_monthly_cost(&self) -> f64 {
        match (self.monthly_cost, self.annual_cost) {
            (Some(m), _) if m > 0.0 => m,
            (_, Some(a)) if a > 0.0 => a / 12.0,
            _ => 0.0,
        }
    }
}

/// Historical per-SKU rollup for one reporting period.
///
/// The tenant-wide counts are duplicated on every row of a period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenceSnapshot {
    pub snapshot_date: NaiveDate,
    #[serde(default)]
    pub sku_part_number: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub purchased: u64,
    #[serde(default)]
    pub assigned: u64,
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub disabled_count: u64,
    #[serde(default)]
    pub inactive_count: u64,
    #[serde(default)]
    pub dual_count: u64,
    #[serde(default)]
    pub service_count: u64,
}

/// Per-user storage and activity telemetry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageReport {
    pub user_principal_name: String,
    #[serde(default)]
    pub report_date: Option<NaiveDate>,
    #[serde(default)]
    pub last_activity_date: Option<NaiveDate>,
    #[serde(default)]
    pub storage_used_bytes: u64,
}

/// The six core productivity applications tracked by app telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreApp {
    Outlook,
    Word,
    Excel,
    PowerPoint,
    OneNote,
    Teams,
}

impl CoreApp {
    pub const ALL: [CoreApp; 6] = [
        CoreApp::Outlook,
        CoreApp::Word,
        CoreApp::Excel,
        CoreApp::PowerPoint,
        CoreApp::OneNote,
        CoreApp::Teams,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CoreApp::Outlook => "Outlook",
            CoreApp::Word => "Word",
            CoreApp::Excel => "Excel",
            CoreApp::PowerPoint => "PowerPoint",
            CoreApp::OneNote => "OneNote",
            CoreApp::Teams => "Teams",
        }
    }
}

/// Platform activity flags for one application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppFlags {
    #[serde(default)]
    pub desktop: bool,
    #[serde(default)]
    pub web: bool,
    #[serde(default)]
    pub mobile: bool,
}

impl AppFlags {
    pub fn any(&self) -> bool {
        self.desktop || self.web || self.mobile
    }
}

/// Per-user application activity from the usage-reporting API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppUsageRecord {
    pub user_principal_name: String,
    #[serde(default)]
    pub report_refresh_date: Option<NaiveDate>,
    #[serde(default)]
    pub outlook: AppFlags,
    #[serde(default)]
    pub word: AppFlags,
    #[serde(default)]
    pub excel: AppFlags,
    #[serde(default)]
    pub powerpoint: AppFlags,
    #[serde(default)]
    pub onenote: AppFlags,
    #[serde(default)]
    pub teams: AppFlags,
}

impl AppUsageRecord {
    pub fn flags(&self, app: CoreApp) -> &AppFlags {
        match app {
            CoreApp::Outlook => &self.outlook,
            CoreApp::Word => &self.word,
            CoreApp::Excel => &self.excel,
            CoreApp::PowerPoint => &self.powerpoint,
            CoreApp::OneNote => &self.onenote,
            CoreApp::Teams => &self.teams,
        }
    }

    /// Applications with any platform flag set, in [`CoreApp::ALL`] order.
    pub fn apps_used(&self) -> Vec<CoreApp> {
        CoreApp::ALL
            .into_iter()
            .filter(|app| self.flags(*app).any())
            .collect()
    }
}

/// Licence records loaded for one analysis cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenceDataset {
    #[serde(default)]
    pub users: Vec<LicenceUser>,
    #[serde(default)]
    pub skus: Vec<LicenceSku>,
    #[serde(default)]
    pub pricing: Vec<LicencePricing>,
    #[serde(default)]
    pub snapshots: Vec<LicenceSnapshot>,
}

/// Optional telemetry loaded alongside the licence records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageTelemetry {
    #[serde(default)]
    pub reports: Vec<UsageReport>,
    #[serde(default)]
    pub app_usage: Vec<AppUsageRecord>,
}

impl UsageTelemetry {
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty() && self.app_usage.is_empty()
    }
}
