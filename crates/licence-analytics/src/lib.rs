//! Licence intelligence analytics.
//!
//! The KPI aggregator, alert generator, month-comparison engine, downgrade
//! engine and usage-profile builder, plus insights, the record-file reader
//! and the single-cycle [`analysis::AnalysisEngine`] that wires them together.

pub mod alerts;
pub mod analysis;
pub mod comparison;
pub mod config;
pub mod downgrade;
pub mod feature_heuristics;
pub mod insights;
pub mod kpi;
pub mod reader;
pub mod usage_profile;

pub use licence_core as core;
