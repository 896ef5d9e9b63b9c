//! Standard-score utilities
//!
//! Reduces proxy measurements to z-scores against a whole-series baseline.
//!
//! Conventions used everywhere in the crate:
//! - Standard deviation is the POPULATION form (divide by N).
//! - A constant series (std == 0) maps every value to z = 0.
//! - Non-finite inputs are treated as missing and never enter a baseline.
//! - Sums run over value-sorted copies so results do not depend on input order.

use serde::{Deserialize, Serialize};

/// Mean / standard deviation of one entity's full proxy series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
    /// Number of finite values the baseline was computed from
    pub n: usize,
}

impl Baseline {
    /// Baseline over the finite values of `values`. `None` if there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            return None;
        }
        finite.sort_by(f64::total_cmp);

        let n = finite.len();
        if finite[0] == finite[n - 1] {
            // Constant series: std is exactly 0
            return Some(Self { mean: finite[0], std: 0.0, n });
        }
        let mean = finite.iter().sum::<f64>() / n as f64;

        let mut sq_dev: Vec<f64> = finite.iter().map(|v| (v - mean).powi(2)).collect();
        sq_dev.sort_by(f64::total_cmp);
        let variance = sq_dev.iter().sum::<f64>() / n as f64;

        Some(Self {
            mean,
            std: variance.sqrt(),
            n,
        })
    }

    /// Baseline over the present values of a series with gaps
    pub fn from_optional(values: &[Option<f64>]) -> Option<Self> {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        Self::from_values(&present)
    }

    /// Standard score of `value` against this baseline
    pub fn z(&self, value: f64) -> f64 {
        if self.std > 0.0 {
            (value - self.mean) / self.std
        } else {
            0.0
        }
    }
}

/// Order-independent mean of finite values
pub fn stable_mean(values: &[f64]) -> Option<f64> {
    Baseline::from_values(values).map(|b| b.mean)
}

/// Z-score a series with gaps
///
/// Returns the baseline and a z-score vector aligned with `values`
/// (gaps stay `None`). `None` when the series has no valid values at all.
pub fn zscore_series(values: &[Option<f64>]) -> Option<(Baseline, Vec<Option<f64>>)> {
    let baseline = Baseline::from_optional(values)?;
    let z = values
        .iter()
        .map(|v| v.filter(|x| x.is_finite()).map(|x| baseline.z(x)))
        .collect();
    Some((baseline, z))
}
