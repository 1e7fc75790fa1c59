//! Runtime layer for the licence intelligence engine.
//!
//! Loads record files off the async executor, falls back to the last good
//! load when a refresh fails, and drives the analysis engine either once or
//! on a fixed reload interval.

pub mod data_manager;
pub mod orchestrator;

pub use licence_analytics as analytics;
pub use licence_core as core;
