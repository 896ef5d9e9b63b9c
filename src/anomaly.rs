//! Dark-earthquake screening
//!
//! An excursion is a maximal run of consecutive samples whose z-score stays
//! beyond ±threshold with the same sign. Each excursion is checked against
//! catalog events near the cave: if one falls inside the excursion (widened by
//! the dating tolerance) it is documented, otherwise it becomes a candidate for
//! an unrecorded event. Candidates backed by excursions in other proxies of the
//! same speleothem are the strongest.

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEvent, EventCatalog};
use crate::proxy::Proxy;
use crate::series::EntitySeries;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningParams {
    /// |z| at or above which a sample is anomalous
    pub threshold: f64,
    /// Dating slack applied on both sides of an excursion, years
    pub tolerance_years: f64,
    /// Catalog search radius around the cave, km
    pub radius_km: f64,
    /// Ignore excursions peaking before this year
    pub min_year: Option<f64>,
}

impl Default for ScreeningParams {
    fn default() -> Self {
        Self {
            threshold: 2.0,
            tolerance_years: 20.0,
            radius_km: 300.0,
            min_year: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Excursion {
    pub proxy: Proxy,
    pub start_index: usize,
    pub end_index: usize,
    pub start_year: f64,
    pub end_year: f64,
    pub peak_year: f64,
    pub peak_z: f64,
    pub n_samples: usize,
}

impl Excursion {
    /// Does [start − tol, end + tol] contain `year`?
    pub fn overlaps(&self, year: f64, tolerance: f64) -> bool {
        self.start_year - tolerance <= year && year <= self.end_year + tolerance
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Attribution {
    /// Matches a catalog event; `lag_years` = event year − peak year
    Documented { event: CatalogEvent, lag_years: f64 },
    /// No catalog event nearby in space and time
    Candidate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenedExcursion {
    pub entity_id: i64,
    pub label: String,
    pub excursion: Excursion,
    pub attribution: Attribution,
    /// Other proxies of this entity with an excursion around the same peak
    pub supporting_proxies: usize,
}

impl ScreenedExcursion {
    pub fn is_candidate(&self) -> bool {
        matches!(self.attribution, Attribution::Candidate)
    }
}

/// Excursions of one z-score series
///
/// A missing value ends a run.
pub fn find_excursions(
    proxy: Proxy,
    years: &[f64],
    z: &[Option<f64>],
    threshold: f64,
) -> Vec<Excursion> {
    let mut excursions = Vec::new();
    let mut run: Option<(usize, f64)> = None; // (start index, sign)

    let sign_at = |i: usize| -> Option<f64> {
        z[i].filter(|v| v.abs() >= threshold).map(f64::signum)
    };

    for i in 0..=z.len() {
        let sign = if i < z.len() { sign_at(i) } else { None };
        match (run, sign) {
            (Some((_, s)), Some(sign)) if s == sign => {}
            (current, next) => {
                if let Some((start, _)) = current {
                    excursions.push(summarise(proxy, years, z, start, i - 1));
                }
                run = next.map(|sign| (i, sign));
            }
        }
    }

    excursions
}

fn summarise(proxy: Proxy, years: &[f64], z: &[Option<f64>], start: usize, end: usize) -> Excursion {
    let (peak_index, peak_z) = (start..=end)
        .filter_map(|i| z[i].map(|v| (i, v)))
        .fold((start, 0.0f64), |best, (i, v)| if v.abs() > best.1.abs() { (i, v) } else { best });

    Excursion {
        proxy,
        start_index: start,
        end_index: end,
        start_year: years[start],
        end_year: years[end],
        peak_year: years[peak_index],
        peak_z,
        n_samples: end - start + 1,
    }
}

/// Attribute one excursion against a catalog already restricted to the site
pub fn attribute(excursion: &Excursion, nearby: &EventCatalog, tolerance: f64) -> Attribution {
    nearby.in_years(excursion.start_year - tolerance, excursion.end_year + tolerance)
        .min_by(|a, b| {
            (a.year - excursion.peak_year).abs().total_cmp(&(b.year - excursion.peak_year).abs())
        })
        .map(|event| Attribution::Documented {
            event: event.clone(),
            lag_years: event.year - excursion.peak_year,
        })
        .unwrap_or(Attribution::Candidate)
}

/// Screen every proxy of one entity
///
/// Entities without site coordinates are matched against the whole catalog.
pub fn screen_entity(
    series: &EntitySeries,
    catalog: &EventCatalog,
    params: &ScreeningParams,
) -> Vec<ScreenedExcursion> {
    let nearby = match series.site.as_ref().and_then(|s| s.coordinates()) {
        Some((lat, lon)) => catalog.near(lat, lon, params.radius_km),
        None => {
            tracing::debug!("{} has no site coordinates; using the full catalog", series.label());
            catalog.clone()
        }
    };

    let per_proxy: BTreeMap<Proxy, Vec<Excursion>> = series.proxies
        .iter()
        .map(|(proxy, p)| (*proxy, find_excursions(*proxy, &series.years_ce, &p.z, params.threshold)))
        .collect();

    let label = series.label();
    let mut screened = Vec::new();
    for (proxy, excursions) in &per_proxy {
        for excursion in excursions {
            if params.min_year.is_some_and(|min| excursion.peak_year < min) {
                continue;
            }

            let supporting_proxies = per_proxy.iter()
                .filter(|(other, _)| *other != proxy)
                .filter(|(_, others)| {
                    others.iter().any(|o| o.overlaps(excursion.peak_year, params.tolerance_years))
                })
                .count();

            screened.push(ScreenedExcursion {
                entity_id: series.entity_id,
                label: label.clone(),
                excursion: excursion.clone(),
                attribution: attribute(excursion, &nearby, params.tolerance_years),
                supporting_proxies,
            });
        }
    }

    screened
}

/// Screen all entities (in parallel, ordered by entity id then peak year)
pub fn screen_entities(
    series: &BTreeMap<i64, EntitySeries>,
    catalog: &EventCatalog,
    params: &ScreeningParams,
) -> Vec<ScreenedExcursion> {
    let mut all: Vec<ScreenedExcursion> = series
        .par_iter()
        .flat_map_iter(|(_, s)| screen_entity(s, catalog, params))
        .collect();

    all.sort_by(|a, b| {
        a.entity_id.cmp(&b.entity_id)
            .then(a.excursion.peak_year.total_cmp(&b.excursion.peak_year))
            .then(a.excursion.proxy.cmp(&b.excursion.proxy))
    });
    all
}
