//! Shared data model and lookup tables for the licence intelligence engine.
//!
//! Holds the raw record types, the SKU classifier, the cost resolver that every
//! analytics component prices licences through, CLI settings and the small
//! formatting / date helpers used by the reporting layer.

pub mod error;
pub mod formatting;
pub mod models;
pub mod pricing;
pub mod settings;
pub mod sku;
pub mod time_utils;
