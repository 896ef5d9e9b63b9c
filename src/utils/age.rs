//! Age models and calendar conversion
//!
//! SISAL chronologies carry several competing age models per sample, all in
//! years BP (anchored at 1950). The loader takes the first non-null value in a
//! fixed priority order.

use serde::{Deserialize, Serialize};

/// Calendar year that "Before Present" is anchored to
pub const BP_ANCHOR_YEAR: f64 = 1950.0;

/// Age models consulted, in priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgeModel {
    #[serde(rename = "copRa")]
    CopRa,
    #[serde(rename = "StalAge")]
    StalAge,
    #[serde(rename = "lin_interp")]
    LinInterp,
    #[serde(rename = "lin_reg")]
    LinReg,
}

/// Highest priority first
pub const AGE_MODEL_PRIORITY: [AgeModel; 4] = [
    AgeModel::CopRa,
    AgeModel::StalAge,
    AgeModel::LinInterp,
    AgeModel::LinReg,
];

impl AgeModel {
    /// Column name in `sisal_chronology.csv`
    pub fn column(&self) -> &'static str {
        match self {
            AgeModel::CopRa => "copRa_age",
            AgeModel::StalAge => "StalAge_age",
            AgeModel::LinInterp => "lin_interp_age",
            AgeModel::LinReg => "lin_reg_age",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgeModel::CopRa => "copRa",
            AgeModel::StalAge => "StalAge",
            AgeModel::LinInterp => "lin_interp",
            AgeModel::LinReg => "lin_reg",
        }
    }
}

/// Pick the first usable age from candidates given in `AGE_MODEL_PRIORITY` order
///
/// Non-finite values count as missing.
pub fn select_age(candidates: &[Option<f64>; 4]) -> Option<(AgeModel, f64)> {
    AGE_MODEL_PRIORITY
        .iter()
        .zip(candidates.iter())
        .find_map(|(model, age)| age.filter(|a| a.is_finite()).map(|a| (*model, a)))
}

/// Years BP → calendar year CE
pub fn bp_to_ce(age_bp: f64) -> f64 {
    BP_ANCHOR_YEAR - age_bp
}

/// Calendar year CE → years BP
pub fn ce_to_bp(year_ce: f64) -> f64 {
    BP_ANCHOR_YEAR - year_ce
}
