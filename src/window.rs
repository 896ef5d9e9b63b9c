//! Event window evaluation
//!
//! Given one entity/proxy series and a closed year interval, aggregates the
//! samples inside the interval and expresses their mean as a z-score against
//! the entity's full-series baseline. Empty windows report *why* they are
//! empty instead of a numeric zero.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::utils::stats::{stable_mean, Baseline};

/// Closed year interval [start, end] (CE)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventWindow {
    pub start: f64,
    pub end: f64,
}

impl EventWindow {
    /// Bounds are reordered if given backwards
    pub fn new(start: f64, end: f64) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    /// `year ± half_width`
    pub fn around(year: f64, half_width: f64) -> Self {
        Self::new(year - half_width.abs(), year + half_width.abs())
    }

    pub fn contains(&self, year: f64) -> bool {
        self.start <= year && year <= self.end
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }
}

/// Aggregate of the samples inside a window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowStats {
    pub n_samples: usize,
    pub mean: f64,
    /// Window mean against the full-series baseline
    pub z_score: f64,
}

/// Why a window holds no samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Coverage {
    /// Window falls in a gap inside the record
    Gap,
    /// Window ends before the first sample
    BeforeRecord,
    /// Window starts after the last sample
    AfterRecord,
    /// Series has no valid values at all
    EmptySeries,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum WindowOutcome {
    Data(WindowStats),
    NoData(Coverage),
}

impl WindowOutcome {
    pub fn stats(&self) -> Option<&WindowStats> {
        match self {
            WindowOutcome::Data(stats) => Some(stats),
            WindowOutcome::NoData(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WindowOutcome::Data(_) => "data",
            WindowOutcome::NoData(Coverage::Gap) => "gap",
            WindowOutcome::NoData(Coverage::BeforeRecord) => "before_record",
            WindowOutcome::NoData(Coverage::AfterRecord) => "after_record",
            WindowOutcome::NoData(Coverage::EmptySeries) => "empty_series",
        }
    }
}

/// Evaluate `window` over parallel `years` / `values` slices
///
/// Input order does not matter. Missing values are ignored both for the
/// window and for the covered range.
pub fn evaluate_window(
    years: &[f64],
    values: &[Option<f64>],
    baseline: &Baseline,
    window: &EventWindow,
) -> WindowOutcome {
    let valid: Vec<(f64, f64)> = years.iter()
        .zip(values.iter())
        .filter_map(|(y, v)| v.filter(|x| x.is_finite()).map(|x| (*y, x)))
        .collect();

    if valid.is_empty() {
        return WindowOutcome::NoData(Coverage::EmptySeries);
    }

    let inside: Vec<f64> = valid.iter()
        .filter(|(y, _)| window.contains(*y))
        .map(|(_, v)| *v)
        .collect();

    match stable_mean(&inside) {
        Some(mean) => WindowOutcome::Data(WindowStats {
            n_samples: inside.len(),
            mean,
            z_score: baseline.z(mean),
        }),
        None => {
            let first = valid.iter().map(|(y, _)| *y).fold(f64::INFINITY, f64::min);
            let last = valid.iter().map(|(y, _)| *y).fold(f64::NEG_INFINITY, f64::max);
            let coverage = if window.end < first {
                Coverage::BeforeRecord
            } else if window.start > last {
                Coverage::AfterRecord
            } else {
                Coverage::Gap
            };
            WindowOutcome::NoData(coverage)
        }
    }
}

/// Empirical significance of an observed window z-score
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowSignificance {
    pub observed_z: f64,
    /// Random windows that landed on data
    pub draws: usize,
    /// Fraction of those with |z| >= |observed_z|
    pub p_value: f64,
}

/// Compare a window against `n_draws` equal-width windows placed uniformly at
/// random inside the covered range
///
/// Draws that land in gaps are discarded. `None` when the window itself has no
/// data or no random window lands on data.
pub fn window_significance(
    years: &[f64],
    values: &[Option<f64>],
    baseline: &Baseline,
    window: &EventWindow,
    n_draws: usize,
    seed: u64,
) -> Option<WindowSignificance> {
    let observed = *evaluate_window(years, values, baseline, window).stats()?;

    let covered: Vec<f64> = years.iter()
        .zip(values.iter())
        .filter(|(_, v)| v.is_some())
        .map(|(y, _)| *y)
        .collect();
    let first = covered.iter().copied().fold(f64::INFINITY, f64::min);
    let last = covered.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = window.width();
    if last - first < width {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut landed = 0usize;
    let mut extreme = 0usize;
    for _ in 0..n_draws {
        let start = if last - width > first {
            rng.gen_range(first..=last - width)
        } else {
            first
        };
        let draw = EventWindow::new(start, start + width);
        if let WindowOutcome::Data(stats) = evaluate_window(years, values, baseline, &draw) {
            landed += 1;
            if stats.z_score.abs() >= observed.z_score.abs() {
                extreme += 1;
            }
        }
    }

    if landed == 0 {
        return None;
    }

    Some(WindowSignificance {
        observed_z: observed.z_score,
        draws: landed,
        p_value: extreme as f64 / landed as f64,
    })
}
