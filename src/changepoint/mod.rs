//! Change-point detection on proxy z-score series
//!
//! - `pelt`: penalised exact segmentation (L2 cost)
//! - `scanner`: gap filling, per-breakpoint shift and recovery characterisation

pub mod pelt;
pub mod scanner;

pub use pelt::{Pelt, PeltError};
pub use scanner::{
    interpolate_gaps, ChangePoint, ChangePointScanner, EntityScan, SeriesScan,
    DEFAULT_RECOVERY_CAP, DEFAULT_RECOVERY_THRESHOLD,
};
