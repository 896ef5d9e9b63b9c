//! Speleothem anomaly scanner
//!
//! Batch analyses over the SISAL v3 speleothem database for a paleoseismology
//! investigation: proxy series are z-scored per entity, then checked against
//! historical earthquake windows, scanned for change points and screened for
//! excursions that no catalogued event explains ("dark earthquake" candidates).
//!
//! Layout:
//! - `utils/`: age models, statistics, column helpers
//! - `data`: SISAL snapshot loading with Polars
//! - `series`: per-entity ordered proxy series and z-scores
//! - `window`: event window evaluation and significance
//! - `changepoint/`: PELT and breakpoint characterisation
//! - `catalog`, `anomaly`: event catalog and excursion screening
//! - `noaa`, `ionex`: published text records and ionosphere TEC maps
//! - `config`, `report`: run configuration and CSV/JSON outputs

pub mod utils;
pub mod proxy;
pub mod data;
pub mod series;
pub mod window;
pub mod changepoint;
pub mod catalog;
pub mod anomaly;
pub mod noaa;
pub mod ionex;
pub mod config;
pub mod report;

// Re-export commonly used types
pub use anomaly::{screen_entities, Attribution, ScreenedExcursion, ScreeningParams};
pub use catalog::{CatalogEvent, EventCatalog, EventKind};
pub use changepoint::{ChangePoint, ChangePointScanner, EntityScan};
pub use config::ScanConfig;
pub use data::SisalData;
pub use proxy::Proxy;
pub use series::{load_entity_series, EntitySeries, ProxySeries};
pub use utils::{AgeModel, Baseline};
pub use window::{evaluate_window, EventWindow, WindowOutcome};
