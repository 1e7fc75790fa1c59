//! Licence cost resolution.
//!
//! Curated pricing lists and the upstream extract rarely agree on exact
//! licence titles, so a name is resolved through an ordered chain of
//! strategies; the first hit wins:
//!
//! 1. exact title match against the pricing list;
//! 2. case-insensitive title match;
//! 3. SKU lookup: the name is a SKU part number or title, retry with the
//!    SKU's other names;
//! 4. classifier friendly name, retried against the pricing list;
//! 5. standard list-price table, first keyword contained in the name.
//!
//! [`ResolutionDepth::Listed`] stops after step 4 so that spend figures only
//! ever use contracted prices. Anything unresolved costs 0.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{IssueType, LicencePricing, LicenceSku, LicenceUser};
use crate::sku::SkuCatalog;

/// Which strategy produced a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PriceSource {
    ExactTitle,
    CaseInsensitiveTitle,
    SkuLookup,
    FriendlyName,
    StandardTable,
    NotFound,
}

/// How far down the strategy chain a lookup may go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionDepth {
    /// Steps 1–4: curated pricing only.
    Listed,
    /// Steps 1–5: fall back to standard list prices.
    Full,
}

/// A resolved monthly per-seat cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceMatch {
    pub monthly_cost: f64,
    pub source: PriceSource,
}

impl PriceMatch {
    fn not_found() -> Self {
        Self {
            monthly_cost: 0.0,
            source: PriceSource::NotFound,
        }
    }

    pub fn is_found(&self) -> bool {
        self.source != PriceSource::NotFound
    }

    pub fn annual_cost(&self) -> f64 {
        self.monthly_cost * 12.0
    }
}

/// Fallback monthly price (GBP) for any licence whose name contains `keyword`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardPrice {
    pub keyword: String,
    pub monthly_cost: f64,
}

/// Standard UK monthly list prices per licence family, most specific first.
///
/// Suite keywords always carry a product prefix so add-ons whose names end
/// in a tier ("... Security E5") never pick up a suite price.
pub fn default_standard_pricing() -> Vec<StandardPrice> {
    const TABLE: &[(&str, f64)] = &[
        ("microsoft 365 e5", 54.75),
        ("m365 e5", 54.75),
        ("spe_e5", 54.75),
        ("microsoft 365 e3", 33.00),
        ("m365 e3", 33.00),
        ("spe_e3", 33.00),
        ("microsoft 365 f3", 6.70),
        ("m365 f3", 6.70),
        ("spe_f1", 6.70),
        ("office 365 e5", 35.00),
        ("o365 e5", 35.00),
        ("enterprisepremium", 35.00),
        ("office 365 e3", 20.60),
        ("o365 e3", 20.60),
        ("enterprisepack", 20.60),
        ("office 365 e1", 8.20),
        ("standardpack", 8.20),
        ("office 365 f3", 3.30),
        ("desklesspack", 3.30),
        ("business premium", 18.10),
        ("business standard", 10.30),
        ("business basic", 4.90),
        ("power bi pro", 8.20),
        ("audio conferencing", 2.70),
        ("teams phone", 6.60),
        ("visio plan 2", 12.30),
        ("project plan 3", 24.70),
        ("project plan 5", 45.30),
    ];
    TABLE
        .iter()
        .map(|(keyword, monthly_cost)| StandardPrice {
            keyword: keyword.to_string(),
            monthly_cost: *monthly_cost,
        })
        .collect()
}

/// The shared cost resolver. Built once per analysis cycle from that
/// cycle's pricing and SKU records.
pub struct CostResolver<'a> {
    exact: HashMap<String, f64>,
    folded: HashMap<String, f64>,
    /// Lowercased SKU part number or title → the SKU's other names.
    sku_aliases: HashMap<String, Vec<String>>,
    catalog: &'a SkuCatalog,
    standard: &'a [StandardPrice],
}

impl<'a> CostResolver<'a> {
    /// Index the pricing list and SKU records.
    ///
    /// Pricing rows without a usable cost are skipped so lookups fall
    /// through to later strategies. The first row for a title wins.
    pub fn new(
        pricing: &[LicencePricing],
        skus: &[LicenceSku],
        catalog: &'a SkuCatalog,
        standard: &'a [StandardPrice],
    ) -> Self {
        let mut exact = HashMap::new();
        let mut folded = HashMap::new();
        for row in pricing {
            let cost = row.effective_monthly_cost();
            if cost <= 0.0 {
                continue;
            }
            let title = row.title.trim();
            exact.entry(title.to_string()).or_insert(cost);
            folded.entry(title.to_lowercase()).or_insert(cost);
        }

        let mut sku_aliases: HashMap<String, Vec<String>> = HashMap::new();
        for sku in skus {
            let part = sku.sku_part_number.trim();
            let title = sku.title.trim();
            let friendly = catalog.friendly_name(part);
            if !part.is_empty() {
                sku_aliases
                    .entry(part.to_lowercase())
                    .or_default()
                    .extend([title.to_string(), friendly.clone()]);
            }
            if !title.is_empty() {
                sku_aliases
                    .entry(title.to_lowercase())
                    .or_default()
                    .extend([friendly, part.to_string()]);
            }
        }
        for aliases in sku_aliases.values_mut() {
            aliases.retain(|a| !a.is_empty());
            aliases.dedup();
        }

        Self {
            exact,
            folded,
            sku_aliases,
            catalog,
            standard,
        }
    }

    /// The classifier this resolver consults.
    pub fn catalog(&self) -> &'a SkuCatalog {
        self.catalog
    }

    /// Resolve a licence display name through the strategy chain.
    pub fn resolve(&self, name: &str, depth: ResolutionDepth) -> PriceMatch {
        let name = name.trim();
        if name.is_empty() {
            return PriceMatch::not_found();
        }

        // 1–2. Direct title lookups.
        if let Some(hit) = self.lookup(name) {
            return hit;
        }

        // 3. SKU lookup table.
        if let Some(aliases) = self.sku_aliases.get(&name.to_lowercase()) {
            for alias in aliases {
                if let Some(hit) = self.lookup(alias) {
                    return PriceMatch {
                        source: PriceSource::SkuLookup,
                        ..hit
                    };
                }
            }
        }

        // 4. Classifier friendly name.
        let friendly = self.catalog.friendly_name(name);
        if friendly != name {
            if let Some(hit) = self.lookup(&friendly) {
                return PriceMatch {
                    source: PriceSource::FriendlyName,
                    ..hit
                };
            }
        }

        if depth == ResolutionDepth::Listed {
            return PriceMatch::not_found();
        }

        // 5. Standard list-price table. Add-ons only match non-suite entries.
        let haystack = format!("{} | {}", name.to_lowercase(), friendly.to_lowercase());
        let addon = self.catalog.is_addon(name);
        self.standard
            .iter()
            .filter(|p| !addon || self.catalog.suite_level(&p.keyword).is_none())
            .find(|p| haystack.contains(&p.keyword.to_lowercase()))
            .map(|p| PriceMatch {
                monthly_cost: p.monthly_cost,
                source: PriceSource::StandardTable,
            })
            .unwrap_or_else(PriceMatch::not_found)
    }

    /// Price a SKU record against the curated list: its title, then the
    /// friendly name of its part number, then the part number itself.
    pub fn resolve_sku(&self, sku: &LicenceSku) -> PriceMatch {
        if let Some(hit) = self.lookup(sku.title.trim()) {
            return hit;
        }
        let friendly = self.catalog.friendly_name(sku.sku_part_number.trim());
        if let Some(hit) = self.lookup(&friendly) {
            return PriceMatch {
                source: PriceSource::FriendlyName,
                ..hit
            };
        }
        if let Some(hit) = self.lookup(sku.sku_part_number.trim()) {
            return PriceMatch {
                source: PriceSource::SkuLookup,
                ..hit
            };
        }
        PriceMatch::not_found()
    }

    /// Price every licence a user holds.
    pub fn price_licences(&self, user: &LicenceUser, depth: ResolutionDepth) -> Vec<PricedLicence> {
        user.licence_names()
            .into_iter()
            .map(|name| {
                let m = self.resolve(name, depth);
                PricedLicence {
                    name: name.to_string(),
                    monthly_cost: m.monthly_cost,
                    source: m.source,
                }
            })
            .collect()
    }

    /// Issue-type-aware cost breakdown for one user.
    pub fn user_breakdown(&self, user: &LicenceUser, depth: ResolutionDepth) -> UserCostBreakdown {
        UserCostBreakdown::new(user, self.price_licences(user, depth))
    }

    fn lookup(&self, title: &str) -> Option<PriceMatch> {
        if title.is_empty() {
            return None;
        }
        if let Some(cost) = self.exact.get(title) {
            return Some(PriceMatch {
                monthly_cost: *cost,
                source: PriceSource::ExactTitle,
            });
        }
        self.folded.get(&title.to_lowercase()).map(|cost| PriceMatch {
            monthly_cost: *cost,
            source: PriceSource::CaseInsensitiveTitle,
        })
    }
}

// ── Per-user savings ──────────────────────────────────────────────────────────

/// One held licence and its resolved monthly cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PricedLicence {
    pub name: String,
    pub monthly_cost: f64,
    pub source: PriceSource,
}

/// Potential monthly savings for a user given the monthly cost of each held
/// licence.
///
/// * `Disabled` / `Inactive 90+` → every held licence.
/// * `Dual-Licensed` → every licence except the single most expensive one.
/// * `Service Account` / `None` → 0; service accounts go to manual review.
pub fn potential_monthly_savings(issue: IssueType, monthly_costs: &[f64]) -> f64 {
    let total: f64 = monthly_costs.iter().sum();
    match issue {
        IssueType::Disabled | IssueType::Inactive90 => total,
        IssueType::DualLicensed => {
            let keep = monthly_costs.iter().copied().fold(0.0_f64, f64::max);
            total - keep
        }
        IssueType::ServiceAccount | IssueType::None => 0.0,
    }
}

/// Priced licences, totals and potential savings for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCostBreakdown {
    pub user_id: String,
    pub display_name: String,
    pub issue_type: IssueType,
    pub licences: Vec<PricedLicence>,
    pub total_monthly_cost: f64,
    pub total_annual_cost: f64,
    pub potential_monthly_savings: f64,
    pub potential_annual_savings: f64,
}

impl UserCostBreakdown {
    pub fn new(user: &LicenceUser, licences: Vec<PricedLicence>) -> Self {
        let costs: Vec<f64> = licences.iter().map(|l| l.monthly_cost).collect();
        let total: f64 = costs.iter().sum();
        let savings = potential_monthly_savings(user.issue_type, &costs);
        Self {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
            issue_type: user.issue_type,
            licences,
            total_monthly_cost: total,
            total_annual_cost: total * 12.0,
            potential_monthly_savings: savings,
            potential_annual_savings: savings * 12.0,
        }
    }

    /// Number of held licences that resolved to a price.
    pub fn priced_count(&self) -> usize {
        self.licences.iter().filter(|l| l.monthly_cost > 0.0).count()
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
