//! Per-entity proxy time series
//!
//! Turns the joined SISAL sample table into one age-ordered series per
//! speleothem, with raw values and z-scores for each requested proxy.
//!
//! Rules:
//! - Samples without any usable age model are left off the time axis.
//! - An entity qualifies when it has at least `min_samples` dated samples
//!   carrying a value for one of the requested proxies; others are dropped.
//! - Each proxy is z-scored against that entity's own full series. A proxy with
//!   no valid values for an entity is simply absent from `proxies`.

use std::collections::BTreeMap;

use anyhow::Result;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::data::{EntityMeta, SampleRow, SisalData, Site};
use crate::proxy::Proxy;
use crate::utils::age::{bp_to_ce, AgeModel};
use crate::utils::stats::{zscore_series, Baseline};
use crate::window::{evaluate_window, EventWindow, WindowOutcome};

/// Raw values and z-scores of one proxy, aligned with the entity's time axis
#[derive(Debug, Clone)]
pub struct ProxySeries {
    pub raw: Vec<Option<f64>>,
    pub z: Vec<Option<f64>>,
    pub baseline: Baseline,
}

impl ProxySeries {
    pub fn from_raw(raw: Vec<Option<f64>>) -> Option<Self> {
        let (baseline, z) = zscore_series(&raw)?;
        Some(Self { raw, z, baseline })
    }

    pub fn valid_count(&self) -> usize {
        self.raw.iter().flatten().count()
    }
}

/// Age-ordered series for one speleothem
#[derive(Debug, Clone)]
pub struct EntitySeries {
    pub entity_id: i64,
    pub meta: Option<EntityMeta>,
    pub site: Option<Site>,
    pub sample_ids: Vec<i64>,
    /// Ascending calendar years (CE)
    pub years_ce: Vec<f64>,
    pub age_models: Vec<AgeModel>,
    pub proxies: BTreeMap<Proxy, ProxySeries>,
}

impl EntitySeries {
    pub fn len(&self) -> usize {
        self.years_ce.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years_ce.is_empty()
    }

    pub fn proxy(&self, proxy: Proxy) -> Option<&ProxySeries> {
        self.proxies.get(&proxy)
    }

    /// Display label: entity name, falling back to the id
    pub fn label(&self) -> String {
        self.meta
            .as_ref()
            .and_then(|m| m.name.clone())
            .unwrap_or_else(|| format!("entity_{}", self.entity_id))
    }

    /// First and last year covered by valid values of `proxy`
    pub fn coverage(&self, proxy: Proxy) -> Option<(f64, f64)> {
        let series = self.proxies.get(&proxy)?;
        let mut years = self.years_ce.iter()
            .zip(series.raw.iter())
            .filter(|(_, v)| v.is_some())
            .map(|(y, _)| *y);
        let first = years.next()?;
        let last = years.last().unwrap_or(first);
        Some((first, last))
    }

    /// Evaluate an event window for one proxy; `None` if the proxy is absent
    pub fn evaluate(&self, proxy: Proxy, window: &EventWindow) -> Option<WindowOutcome> {
        let series = self.proxies.get(&proxy)?;
        Some(evaluate_window(&self.years_ce, &series.raw, &series.baseline, window))
    }
}

/// Build series for every qualifying entity, keyed by entity id
///
/// # Arguments
/// * `data` - Loaded snapshot
/// * `proxies` - Proxies to keep; those whose file was not loaded are ignored
/// * `min_samples` - Minimum dated samples carrying a requested proxy value
///
/// # Returns
/// Age-ordered series (ties by `sample_id`) with per-proxy z-scores against
/// each entity's own baseline. Entities below `min_samples` are absent.
///
/// # Errors
/// Returns error if the joined sample table cannot be read back as typed rows.
pub fn load_entity_series(
    data: &SisalData,
    proxies: &[Proxy],
    min_samples: usize,
) -> Result<BTreeMap<i64, EntitySeries>> {
    let rows = data.sample_rows()?;

    // Column index of each requested proxy in SampleRow::values
    let columns: Vec<(Proxy, usize)> = proxies
        .iter()
        .filter_map(|p| data.proxies.iter().position(|q| q == p).map(|idx| (*p, idx)))
        .collect();

    let mut undated = 0usize;
    let mut by_entity: FxHashMap<i64, Vec<&SampleRow>> = FxHashMap::default();
    for row in &rows {
        if row.age.is_none() {
            undated += 1;
            continue;
        }
        by_entity.entry(row.entity_id).or_default().push(row);
    }
    if undated > 0 {
        tracing::debug!("{} samples have no usable age model", undated);
    }

    let mut built: Vec<EntitySeries> = by_entity
        .into_par_iter()
        .filter_map(|(entity_id, rows)| {
            let meta = data.entities.get(&entity_id).cloned();
            let site = data.site_of(entity_id).cloned();
            build_entity_series(entity_id, meta, site, rows, &columns, min_samples)
        })
        .collect();
    built.sort_by_key(|s| s.entity_id);

    tracing::info!(
        "{} entities with >= {} samples for {:?}",
        built.len(),
        min_samples,
        proxies
    );

    Ok(built.into_iter().map(|s| (s.entity_id, s)).collect())
}

/// Assemble one entity's series from its dated sample rows
///
/// `columns` maps each wanted proxy to its index in `SampleRow::values`.
/// Returns `None` when the entity falls below `min_samples`.
pub fn build_entity_series(
    entity_id: i64,
    meta: Option<EntityMeta>,
    site: Option<Site>,
    rows: Vec<&SampleRow>,
    columns: &[(Proxy, usize)],
    min_samples: usize,
) -> Option<EntitySeries> {
    let mut rows: Vec<(f64, &SampleRow)> = rows
        .into_iter()
        .filter_map(|r| r.age.map(|(_, age)| (bp_to_ce(age), r)))
        .filter(|(_, r)| columns.iter().any(|(_, idx)| r.values.get(*idx).copied().flatten().is_some()))
        .collect();

    if rows.is_empty() || rows.len() < min_samples {
        return None;
    }

    rows.sort_by(|(ya, ra), (yb, rb)| ya.total_cmp(yb).then(ra.sample_id.cmp(&rb.sample_id)));

    let mut proxies = BTreeMap::new();
    for &(proxy, idx) in columns {
        let raw: Vec<Option<f64>> = rows.iter()
            .map(|(_, r)| r.values.get(idx).copied().flatten())
            .collect();
        if let Some(series) = ProxySeries::from_raw(raw) {
            proxies.insert(proxy, series);
        }
    }

    Some(EntitySeries {
        entity_id,
        meta,
        site,
        sample_ids: rows.iter().map(|(_, r)| r.sample_id).collect(),
        years_ce: rows.iter().map(|(y, _)| *y).collect(),
        age_models: rows.iter().filter_map(|(_, r)| r.age.map(|(m, _)| m)).collect(),
        proxies,
    })
}
