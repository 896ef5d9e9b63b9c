//! PELT: Pruned Exact Linear Time change-point search
//!
//! Minimises  Σ cost(segment) + penalty × (#segments)  over all segmentations
//! whose segments are at least `min_size` samples long. Segment cost is the L2
//! cost (sum of squared deviations from the segment mean), evaluated in O(1)
//! from prefix sums.
//!
//! Reference: Killick, Fearnhead & Eckley (2012), JASA 107(500).

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum PeltError {
    #[error("Penalty must be finite and non-negative, got {0}")]
    InvalidPenalty(f64),

    #[error("Minimum segment size must be at least 1")]
    InvalidMinSize,

    #[error("Non-finite value at index {0}")]
    NonFinite(usize),
}

/// Prefix sums for O(1) segment cost
struct L2Cost {
    sum: Vec<f64>,
    sum_sq: Vec<f64>,
}

impl L2Cost {
    fn new(signal: &[f64]) -> Self {
        let mut sum = Vec::with_capacity(signal.len() + 1);
        let mut sum_sq = Vec::with_capacity(signal.len() + 1);
        sum.push(0.0);
        sum_sq.push(0.0);
        for (i, x) in signal.iter().enumerate() {
            sum.push(sum[i] + x);
            sum_sq.push(sum_sq[i] + x * x);
        }
        Self { sum, sum_sq }
    }

    /// Cost of signal[start..end]
    fn cost(&self, start: usize, end: usize) -> f64 {
        let n = (end - start) as f64;
        let s = self.sum[end] - self.sum[start];
        let sq = self.sum_sq[end] - self.sum_sq[start];
        (sq - s * s / n).max(0.0)
    }
}

/// Penalised change-point detector
#[derive(Debug, Clone, Copy)]
pub struct Pelt {
    penalty: f64,
    min_size: usize,
}

impl Pelt {
    pub fn new(penalty: f64, min_size: usize) -> Result<Self, PeltError> {
        if !penalty.is_finite() || penalty < 0.0 {
            return Err(PeltError::InvalidPenalty(penalty));
        }
        if min_size == 0 {
            return Err(PeltError::InvalidMinSize);
        }
        Ok(Self { penalty, min_size })
    }

    /// Indices where a new segment starts (ascending, never 0 or `signal.len()`)
    ///
    /// Signals shorter than `2 × min_size` cannot be split and return no
    /// change points.
    pub fn detect(&self, signal: &[f64]) -> Result<Vec<usize>, PeltError> {
        if let Some(idx) = signal.iter().position(|x| !x.is_finite()) {
            return Err(PeltError::NonFinite(idx));
        }

        let n = signal.len();
        let min_size = self.min_size;
        if n < 2 * min_size || signal.iter().all(|x| *x == signal[0]) {
            return Ok(Vec::new());
        }

        let cost = L2Cost::new(signal);

        // best[t]: optimal penalised cost of signal[..t]
        let mut best = vec![f64::INFINITY; n + 1];
        let mut last_change = vec![0usize; n + 1];
        best[0] = -self.penalty;

        let mut admissible: Vec<usize> = vec![0];

        for t in min_size..=n {
            // Segments ending at t..t+min_size can still start at any s kept
            // here, so prune against best[tau] rather than best[t]
            if t >= 2 * min_size {
                let tau = t - min_size;
                admissible.retain(|&s| best[s] + cost.cost(s, tau) <= best[tau]);
                admissible.push(tau);
            }

            let mut best_t = f64::INFINITY;
            let mut arg_t = 0usize;
            for &s in &admissible {
                let candidate = best[s] + cost.cost(s, t) + self.penalty;
                if candidate < best_t {
                    best_t = candidate;
                    arg_t = s;
                }
            }
            best[t] = best_t;
            last_change[t] = arg_t;
        }

        let mut changes = Vec::new();
        let mut t = n;
        while t > 0 {
            let s = last_change[t];
            if s > 0 {
                changes.push(s);
            }
            t = s;
        }
        changes.reverse();

        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(levels: &[(f64, usize)]) -> Vec<f64> {
        levels.iter()
            .flat_map(|&(level, len)| std::iter::repeat(level).take(len))
            .collect()
    }

    #[test]
    fn test_flat_series_has_no_change_points() {
        let flat = vec![0.7; 20];
        for penalty in [0.0, 0.1, 1.0, 10.0, 1e6] {
            let pelt = Pelt::new(penalty, 2).unwrap();
            assert!(pelt.detect(&flat).unwrap().is_empty(), "penalty {}", penalty);
        }
    }

    #[test]
    fn test_single_step() {
        let signal = step(&[(0.0, 30), (5.0, 30)]);
        let pelt = Pelt::new(3.0, 5).unwrap();
        assert_eq!(pelt.detect(&signal).unwrap(), vec![30]);
    }

    #[test]
    fn test_two_steps_with_noise() {
        let mut signal = step(&[(0.0, 25), (4.0, 25), (-3.0, 25)]);
        for (i, x) in signal.iter_mut().enumerate() {
            *x += ((i * 7919) % 13) as f64 / 13.0 * 0.4 - 0.2;
        }
        let pelt = Pelt::new(5.0, 5).unwrap();
        assert_eq!(pelt.detect(&signal).unwrap(), vec![25, 50]);
    }

    #[test]
    fn test_high_penalty_suppresses_small_shift() {
        let signal = step(&[(0.0, 20), (0.5, 20)]);
        let pelt = Pelt::new(100.0, 5).unwrap();
        assert!(pelt.detect(&signal).unwrap().is_empty());
    }

    #[test]
    fn test_short_series_is_skipped() {
        let signal = step(&[(0.0, 4), (9.0, 5)]);
        let pelt = Pelt::new(1.0, 5).unwrap();
        assert!(pelt.detect(&signal).unwrap().is_empty());
    }

    #[test]
    fn test_segments_respect_min_size() {
        let signal = step(&[(0.0, 20), (8.0, 2), (0.0, 20)]);
        let pelt = Pelt::new(1.0, 5).unwrap();
        let changes = pelt.detect(&signal).unwrap();
        let mut bounds = vec![0];
        bounds.extend(&changes);
        bounds.push(signal.len());
        assert!(bounds.windows(2).all(|w| w[1] - w[0] >= 5));
    }

    /// Exhaustive optimal partitioning (no pruning), same objective as `detect`
    fn optimal_cost(signal: &[f64], penalty: f64, min_size: usize) -> f64 {
        let n = signal.len();
        let cost = L2Cost::new(signal);
        let mut best = vec![f64::INFINITY; n + 1];
        best[0] = -penalty;
        for t in min_size..=n {
            let starts = std::iter::once(0).chain(min_size..=t.saturating_sub(min_size));
            best[t] = starts
                .map(|s| best[s] + cost.cost(s, t) + penalty)
                .fold(f64::INFINITY, f64::min);
        }
        best[n]
    }

    fn segmentation_cost(signal: &[f64], changes: &[usize], penalty: f64) -> f64 {
        let cost = L2Cost::new(signal);
        let mut bounds = vec![0];
        bounds.extend(changes);
        bounds.push(signal.len());
        let total: f64 = bounds.windows(2).map(|w| cost.cost(w[0], w[1])).sum();
        total + penalty * changes.len() as f64
    }

    #[test]
    fn test_matches_exhaustive_partitioning() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(2012);
        for _ in 0..600 {
            let n = rng.gen_range(8..28);
            let min_size = rng.gen_range(1..=4);
            let signal: Vec<f64> = (0..n)
                .map(|i| (if i % 7 < 3 { 2.0 } else { 0.0 }) + rng.gen_range(-1.5..1.5))
                .collect();

            for penalty in [0.5, 5.0, 30.0] {
                let changes = Pelt::new(penalty, min_size).unwrap().detect(&signal).unwrap();
                let found = segmentation_cost(&signal, &changes, penalty);
                let optimal = optimal_cost(&signal, penalty, min_size);
                assert!(
                    found <= optimal + 1e-9,
                    "n={} min_size={} penalty={} found={} optimal={}",
                    n, min_size, penalty, found, optimal
                );
            }
        }
    }

    #[test]
    fn test_invalid_parameters() {
        assert_eq!(Pelt::new(-1.0, 2).unwrap_err(), PeltError::InvalidPenalty(-1.0));
        assert_eq!(Pelt::new(1.0, 0).unwrap_err(), PeltError::InvalidMinSize);
        let pelt = Pelt::new(1.0, 2).unwrap();
        assert_eq!(pelt.detect(&[1.0, f64::NAN, 2.0, 3.0]).unwrap_err(), PeltError::NonFinite(1));
    }
}
