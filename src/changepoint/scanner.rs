//! Change-point scanning of z-score series
//!
//! Runs PELT over an entity's z-scores and characterises every breakpoint by
//! its mean shift and a heuristic recovery time: how many following samples
//! stay more than `recovery_threshold` σ away from the pre-event level, capped
//! at `recovery_cap`, converted to years with the local sample spacing.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::Serialize;

use super::pelt::{Pelt, PeltError};
use crate::proxy::Proxy;
use crate::series::EntitySeries;
use crate::utils::stats::stable_mean;

pub const DEFAULT_RECOVERY_THRESHOLD: f64 = 0.5;
pub const DEFAULT_RECOVERY_CAP: usize = 50;

/// One detected breakpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangePoint {
    /// Index into the entity's time axis
    pub index: usize,
    pub year_ce: f64,
    pub before_mean: f64,
    pub after_mean: f64,
    /// after_mean − before_mean (z units)
    pub shift: f64,
    pub recovery_samples: usize,
    pub recovery_years: f64,
    /// A sample returned within threshold before the cap / end of record
    pub recovered: bool,
}

/// Scan result for one series
#[derive(Debug, Clone, Default)]
pub struct SeriesScan {
    pub change_points: Vec<ChangePoint>,
    /// Samples fed to the detector after gap filling
    pub n_used: usize,
    /// Detector failure, reported as "no change points"
    pub failure: Option<PeltError>,
}

/// Scan result for one entity/proxy pair
#[derive(Debug, Clone)]
pub struct EntityScan {
    pub entity_id: i64,
    pub label: String,
    pub proxy: Proxy,
    pub scan: SeriesScan,
}

#[derive(Debug, Clone, Copy)]
pub struct ChangePointScanner {
    pub penalty: f64,
    pub min_size: usize,
    pub recovery_threshold: f64,
    pub recovery_cap: usize,
}

impl ChangePointScanner {
    pub fn new(penalty: f64, min_size: usize) -> Self {
        Self {
            penalty,
            min_size,
            recovery_threshold: DEFAULT_RECOVERY_THRESHOLD,
            recovery_cap: DEFAULT_RECOVERY_CAP,
        }
    }

    /// Scan a z-score series aligned with `years`
    ///
    /// # Arguments
    /// * `years` - Ascending calendar years, one per sample
    /// * `z` - Z-scores aligned with `years`; `None` marks a gap
    ///
    /// # Returns
    /// Change points indexed into the full `years` axis. Internal gaps are
    /// linearly interpolated and leading/trailing gaps trimmed before
    /// detection. A series with no valid values gives an empty scan.
    ///
    /// Detector errors (invalid penalty or segment size) are not propagated:
    /// they are logged at warn level and kept in `SeriesScan::failure`.
    pub fn scan(&self, years: &[f64], z: &[Option<f64>]) -> SeriesScan {
        let Some((offset, work)) = interpolate_gaps(z) else {
            return SeriesScan::default();
        };
        let work_years = &years[offset..offset + work.len()];

        let detected = Pelt::new(self.penalty, self.min_size)
            .and_then(|pelt| pelt.detect(&work));

        let indices = match detected {
            Ok(indices) => indices,
            Err(err) => {
                tracing::warn!("Change-point detection failed, reporting none: {}", err);
                return SeriesScan {
                    change_points: Vec::new(),
                    n_used: work.len(),
                    failure: Some(err),
                };
            }
        };

        let mut bounds = Vec::with_capacity(indices.len() + 2);
        bounds.push(0);
        bounds.extend(indices.iter().copied());
        bounds.push(work.len());

        let change_points = indices
            .iter()
            .enumerate()
            .map(|(k, &idx)| {
                let before = &work[bounds[k]..idx];
                let after = &work[idx..bounds[k + 2]];
                self.characterise(&work, work_years, idx, before, after, offset)
            })
            .collect();

        SeriesScan {
            change_points,
            n_used: work.len(),
            failure: None,
        }
    }

    fn characterise(
        &self,
        work: &[f64],
        years: &[f64],
        idx: usize,
        before: &[f64],
        after: &[f64],
        offset: usize,
    ) -> ChangePoint {
        let before_mean = stable_mean(before).unwrap_or(0.0);
        let after_mean = stable_mean(after).unwrap_or(0.0);

        let horizon = (idx + self.recovery_cap).min(work.len());
        let recovery_samples = work[idx..horizon]
            .iter()
            .take_while(|z| (*z - before_mean).abs() > self.recovery_threshold)
            .count();
        let recovered = recovery_samples < self.recovery_cap && idx + recovery_samples < work.len();

        ChangePoint {
            index: offset + idx,
            year_ce: years[idx],
            before_mean,
            after_mean,
            shift: after_mean - before_mean,
            recovery_samples,
            recovery_years: recovery_samples as f64 * local_spacing(years, idx),
            recovered,
        }
    }

    /// Scan one proxy across all entities (in parallel, ordered by entity id)
    pub fn scan_entities(
        &self,
        series: &BTreeMap<i64, EntitySeries>,
        proxy: Proxy,
    ) -> Vec<EntityScan> {
        let mut scans: Vec<EntityScan> = series
            .par_iter()
            .filter_map(|(&entity_id, s)| {
                let proxy_series = s.proxy(proxy)?;
                Some(EntityScan {
                    entity_id,
                    label: s.label(),
                    proxy,
                    scan: self.scan(&s.years_ce, &proxy_series.z),
                })
            })
            .collect();
        scans.sort_by_key(|s| s.entity_id);
        scans
    }
}

/// Fill internal gaps by linear interpolation (by position)
///
/// Returns the index of the first valid value and the filled run up to the
/// last valid value. `None` when nothing is valid.
pub fn interpolate_gaps(values: &[Option<f64>]) -> Option<(usize, Vec<f64>)> {
    let valid = |v: &Option<f64>| v.filter(|x| x.is_finite());
    let first = values.iter().position(|v| valid(v).is_some())?;
    let last = values.iter().rposition(|v| valid(v).is_some())?;

    let mut filled = Vec::with_capacity(last - first + 1);
    let mut prev: (usize, f64) = (first, valid(&values[first]).unwrap_or_default());

    for i in first..=last {
        match valid(&values[i]) {
            Some(x) => {
                filled.push(x);
                prev = (i, x);
            }
            None => {
                let (next_i, next_x) = (i + 1..=last)
                    .find_map(|j| valid(&values[j]).map(|x| (j, x)))
                    .unwrap_or(prev);
                let frac = (i - prev.0) as f64 / (next_i - prev.0) as f64;
                filled.push(prev.1 + frac * (next_x - prev.1));
            }
        }
    }

    Some((first, filled))
}

/// Years per sample around `idx`, from the neighbouring ages
fn local_spacing(years: &[f64], idx: usize) -> f64 {
    let n = years.len();
    let spacing = if idx >= 1 && idx + 1 < n {
        (years[idx + 1] - years[idx - 1]) / 2.0
    } else if idx + 1 < n {
        years[idx + 1] - years[idx]
    } else if idx >= 1 {
        years[idx] - years[idx - 1]
    } else {
        0.0
    };
    spacing.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn years(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| 1000.0 + step * i as f64).collect()
    }

    #[test]
    fn test_interpolate_internal_gaps() {
        let values = vec![None, Some(1.0), None, None, Some(4.0), Some(5.0), None];
        let (offset, filled) = interpolate_gaps(&values).unwrap();
        assert_eq!(offset, 1);
        assert_eq!(filled.len(), 5);
        assert_relative_eq!(filled[1], 2.0);
        assert_relative_eq!(filled[2], 3.0);
        assert_eq!(interpolate_gaps(&[None, None]), None);
    }

    #[test]
    fn test_flat_series_reports_nothing() {
        let z = vec![Some(0.0); 20];
        for penalty in [0.0, 1.0, 50.0] {
            let scan = ChangePointScanner::new(penalty, 2).scan(&years(20, 5.0), &z);
            assert!(scan.change_points.is_empty());
            assert!(scan.failure.is_none());
        }
    }

    #[test]
    fn test_step_is_characterised() {
        let mut z: Vec<Option<f64>> = vec![Some(-1.0); 30];
        z.extend(vec![Some(1.0); 30]);
        let scan = ChangePointScanner::new(3.0, 5).scan(&years(60, 2.0), &z);

        assert_eq!(scan.change_points.len(), 1);
        let cp = &scan.change_points[0];
        assert_eq!(cp.index, 30);
        assert_relative_eq!(cp.year_ce, 1060.0);
        assert_relative_eq!(cp.shift, 2.0);
        // never returns to the pre-event level
        assert_eq!(cp.recovery_samples, 30);
        assert!(!cp.recovered);
        assert_relative_eq!(cp.recovery_years, 60.0);
    }

    #[test]
    fn test_pulse_recovers() {
        let mut z: Vec<Option<f64>> = vec![Some(0.0); 20];
        z.extend(vec![Some(3.0); 8]);
        z.extend(vec![Some(0.0); 20]);
        let scan = ChangePointScanner::new(2.0, 4).scan(&years(48, 10.0), &z);

        assert_eq!(scan.change_points.len(), 2);
        let onset = &scan.change_points[0];
        assert_eq!(onset.index, 20);
        assert_eq!(onset.recovery_samples, 8);
        assert!(onset.recovered);
        assert_relative_eq!(onset.recovery_years, 80.0);
    }

    #[test]
    fn test_recovery_is_capped() {
        let mut z: Vec<Option<f64>> = vec![Some(0.0); 10];
        z.extend(vec![Some(5.0); 80]);
        let mut scanner = ChangePointScanner::new(1.0, 5);
        scanner.recovery_cap = 50;
        let scan = scanner.scan(&years(90, 1.0), &z);

        assert_eq!(scan.change_points[0].recovery_samples, 50);
        assert!(!scan.change_points[0].recovered);
    }

    #[test]
    fn test_invalid_penalty_is_swallowed() {
        let z: Vec<Option<f64>> = (0..30).map(|i| Some(i as f64)).collect();
        let scan = ChangePointScanner::new(-3.0, 2).scan(&years(30, 1.0), &z);
        assert!(scan.change_points.is_empty());
        assert_eq!(scan.failure, Some(PeltError::InvalidPenalty(-3.0)));

        let kept = scan.clone();
        assert_eq!(kept.failure, scan.failure);
    }

    #[test]
    fn test_offset_maps_back_to_time_axis() {
        let mut z: Vec<Option<f64>> = vec![None; 3];
        z.extend(vec![Some(-2.0); 10]);
        z.extend(vec![Some(2.0); 10]);
        let scan = ChangePointScanner::new(1.0, 3).scan(&years(23, 1.0), &z);
        assert_eq!(scan.change_points[0].index, 13);
        assert_relative_eq!(scan.change_points[0].year_ce, 1013.0);
    }

    #[test]
    fn test_local_spacing() {
        let y = vec![0.0, 10.0, 30.0];
        assert_relative_eq!(local_spacing(&y, 0), 10.0);
        assert_relative_eq!(local_spacing(&y, 1), 15.0);
        assert_relative_eq!(local_spacing(&y, 2), 20.0);
        assert_relative_eq!(local_spacing(&[5.0], 0), 0.0);
    }
}
