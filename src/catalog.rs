//! Historical earthquake / volcanic event catalog
//!
//! Columns: `year` (required), optional `name`, `magnitude`, `latitude`,
//! `longitude`, `kind` (`earthquake` | `volcanic`, default earthquake).
//! Rows whose year does not parse are skipped.

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::data::read_table;
use crate::utils::lazy_helpers::{f64_values, require_columns, str_values};

/// Mean Earth radius (IUGG), km
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventKind {
    Earthquake,
    Volcanic,
}

impl EventKind {
    fn parse(s: Option<&str>) -> Self {
        match s.map(|v| v.to_ascii_lowercase()) {
            Some(v) if v.starts_with("volc") || v == "eruption" => EventKind::Volcanic,
            _ => EventKind::Earthquake,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEvent {
    pub year: f64,
    pub name: Option<String>,
    pub magnitude: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub kind: EventKind,
}

impl CatalogEvent {
    /// Great-circle distance to (lat, lon) in km; `None` if the event is unlocated
    pub fn distance_km(&self, lat: f64, lon: f64) -> Option<f64> {
        Some(haversine_km(self.latitude?, self.longitude?, lat, lon))
    }

    pub fn label(&self) -> String {
        match (&self.name, self.magnitude) {
            (Some(name), Some(m)) => format!("{} (M{:.1}, {})", name, m, self.year),
            (Some(name), None) => format!("{} ({})", name, self.year),
            (None, Some(m)) => format!("M{:.1} event ({})", m, self.year),
            (None, None) => format!("event ({})", self.year),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    pub events: Vec<CatalogEvent>,
}

impl EventCatalog {
    pub fn new(mut events: Vec<CatalogEvent>) -> Self {
        events.sort_by(|a, b| a.year.total_cmp(&b.year));
        Self { events }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let df = read_table(path)?;
        let ctx = "event catalog";
        require_columns(&df, &["year"], ctx)?;

        let years = f64_values(&df, "year", ctx)?;
        let names = str_values(&df, "name", ctx)?;
        let magnitudes = f64_values(&df, "magnitude", ctx)?;
        let lats = f64_values(&df, "latitude", ctx)?;
        let lons = f64_values(&df, "longitude", ctx)?;
        let kinds = str_values(&df, "kind", ctx)?;

        let mut skipped = 0usize;
        let mut events = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let Some(year) = years[idx] else {
                skipped += 1;
                continue;
            };
            events.push(CatalogEvent {
                year,
                name: names[idx].clone(),
                magnitude: magnitudes[idx],
                latitude: lats[idx],
                longitude: lons[idx],
                kind: EventKind::parse(kinds[idx].as_deref()),
            });
        }

        if skipped > 0 {
            tracing::warn!("{}: skipped {} rows without a usable year", path.display(), skipped);
        }
        tracing::info!("Loaded {} catalog events from {}", events.len(), path.display());

        Ok(Self::new(events))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Events at or above `min_magnitude`; unrated events are kept only for volcanic kinds
    pub fn with_min_magnitude(&self, min_magnitude: f64) -> Self {
        Self::new(
            self.events.iter()
                .filter(|e| match e.magnitude {
                    Some(m) => m >= min_magnitude,
                    None => e.kind == EventKind::Volcanic,
                })
                .cloned()
                .collect(),
        )
    }

    /// Events with `start <= year <= end`
    pub fn in_years(&self, start: f64, end: f64) -> impl Iterator<Item = &CatalogEvent> {
        self.events.iter().filter(move |e| start <= e.year && e.year <= end)
    }

    /// Located events within `radius_km` of (lat, lon)
    pub fn near(&self, lat: f64, lon: f64, radius_km: f64) -> Self {
        Self::new(
            self.events.iter()
                .filter(|e| e.distance_km(lat, lon).is_some_and(|d| d <= radius_km))
                .cloned()
                .collect(),
        )
    }
}

/// Haversine great-circle distance in km
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().clamp(0.0, 1.0).asin()
}
