//! Shared helpers
//!
//! - `age`: age-model priority and BP ↔ CE conversion
//! - `stats`: baselines, order-independent means and z-scores
//! - `lazy_helpers`: typed column extraction from loosely typed CSV frames

pub mod age;
pub mod lazy_helpers;
pub mod stats;

// Re-export commonly used items
pub use age::{bp_to_ce, ce_to_bp, select_age, AgeModel, AGE_MODEL_PRIORITY, BP_ANCHOR_YEAR};
pub use lazy_helpers::{f64_values, i64_values, require_columns, str_values};
pub use stats::{stable_mean, zscore_series, Baseline};
