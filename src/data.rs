//! Data Loading and Management
//!
//! Loads a SISAL v3 CSV snapshot with Polars and joins
//! sample → chronology → proxy measurements, keeping entity and site metadata
//! in id-keyed lookup tables.
//!
//! Expected layout of the snapshot directory:
//! - `sample.csv`            (sample_id, entity_id, depth_sample)
//! - `entity.csv`            (entity_id, site_id, entity_name, ...)
//! - `site.csv`              (site_id, site_name, latitude, longitude, elevation, ...)
//! - `sisal_chronology.csv`  (sample_id, copRa_age, StalAge_age, lin_interp_age, lin_reg_age, ...)
//! - `<proxy>.csv`           (sample_id, <proxy>_measurement), one per proxy

use polars::prelude::*;
use rustc_hash::FxHashMap;
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::proxy::Proxy;
use crate::utils::age::{select_age, AgeModel, AGE_MODEL_PRIORITY};
use crate::utils::lazy_helpers::{
    first_present, f64_values, i64_values, require_columns, str_values,
};

/// Cave site metadata
#[derive(Debug, Clone, Serialize)]
pub struct Site {
    pub site_id: i64,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
    pub country: Option<String>,
}

impl Site {
    /// (latitude, longitude) when both are known
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Speleothem specimen metadata
#[derive(Debug, Clone, Serialize)]
pub struct EntityMeta {
    pub entity_id: i64,
    pub site_id: i64,
    pub name: Option<String>,
    pub mineralogy: Option<String>,
}

/// One sample after the chronology and proxy joins
#[derive(Debug, Clone)]
pub struct SampleRow {
    pub sample_id: i64,
    pub entity_id: i64,
    pub depth: Option<f64>,
    /// Selected age model and its age in years BP
    pub age: Option<(AgeModel, f64)>,
    /// Measurements aligned with `SisalData::proxies`
    pub values: Vec<Option<f64>>,
}

/// Main data holder for one SISAL snapshot
pub struct SisalData {
    /// Directory the snapshot was read from
    pub data_dir: PathBuf,

    /// sample ⋈ chronology ⋈ proxies (one row per sample)
    pub samples: DataFrame,

    /// Entity ID → entity metadata
    pub entities: FxHashMap<i64, EntityMeta>,

    /// Site ID → site metadata
    pub sites: FxHashMap<i64, Site>,

    /// Proxies whose files were found, in request order
    pub proxies: Vec<Proxy>,
}

impl SisalData {
    /// Load the snapshot in `data_dir` for the requested proxies
    ///
    /// # Arguments
    /// * `data_dir` - Directory holding the SISAL v3 CSV tables
    /// * `proxies` - Proxies to join; duplicates are ignored
    ///
    /// # Returns
    /// One joined row per sample, plus entity and site lookups. Entity
    /// mineralogy comes from `entity.csv` when present, otherwise from the
    /// most common `mineralogy` value among the entity's samples.
    ///
    /// # Errors
    /// Returns error if `sample.csv`, `sisal_chronology.csv`, `entity.csv` or
    /// `site.csv` is missing or lacks its id columns, or if a proxy file exists
    /// but lacks `sample_id` / `<proxy>_measurement`. A missing proxy file only
    /// drops that proxy, with a warning.
    pub fn load(data_dir: &Path, proxies: &[Proxy]) -> Result<Self> {
        tracing::info!("Loading SISAL snapshot from {}", data_dir.display());

        let mut entities = Self::load_entities(&data_dir.join("entity.csv"))?;
        let sites = Self::load_sites(&data_dir.join("site.csv"))?;

        let sample_df = read_table(&data_dir.join("sample.csv"))?;
        for (entity_id, mineralogy) in mineralogy_by_entity(&sample_df)? {
            if let Some(entity) = entities.get_mut(&entity_id) {
                entity.mineralogy.get_or_insert(mineralogy);
            }
        }

        let mut joined = Self::sample_frame(sample_df)?;
        joined = joined.left_join(
            Self::load_chronology(&data_dir.join("sisal_chronology.csv"))?,
            col("sample_id"),
            col("sample_id"),
        );

        let mut loaded = Vec::new();
        for &proxy in proxies {
            if loaded.contains(&proxy) {
                continue;
            }
            let path = data_dir.join(proxy.file_name());
            if !path.exists() {
                tracing::warn!("Proxy file not found, skipping {}: {}", proxy, path.display());
                continue;
            }
            joined = joined.left_join(
                Self::load_proxy(&path, proxy)?,
                col("sample_id"),
                col("sample_id"),
            );
            loaded.push(proxy);
        }

        let samples = joined
            .collect()
            .with_context(|| format!("Failed to join SISAL tables in {}", data_dir.display()))?;

        tracing::info!("  Samples: {}", samples.height());
        tracing::info!("  Entities: {}", entities.len());
        tracing::info!("  Sites: {}", sites.len());
        tracing::info!("  Proxies: {:?}", loaded);

        Ok(SisalData {
            data_dir: data_dir.to_path_buf(),
            samples,
            entities,
            sites,
            proxies: loaded,
        })
    }

    /// Typed view of the joined sample table
    ///
    /// Rows with a null sample or entity id are dropped.
    pub fn sample_rows(&self) -> Result<Vec<SampleRow>> {
        let ctx = "joined samples";
        let df = &self.samples;

        let sample_ids = i64_values(df, "sample_id", ctx)?;
        let entity_ids = i64_values(df, "entity_id", ctx)?;
        let depths = f64_values(df, "depth", ctx)?;

        let age_columns = AGE_MODEL_PRIORITY
            .iter()
            .map(|m| f64_values(df, m.column(), ctx))
            .collect::<Result<Vec<_>>>()?;

        let value_columns = self.proxies
            .iter()
            .map(|p| f64_values(df, &p.measurement_column(), ctx))
            .collect::<Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let (Some(sample_id), Some(entity_id)) = (sample_ids[idx], entity_ids[idx]) else {
                continue;
            };

            let candidates = [
                age_columns[0][idx],
                age_columns[1][idx],
                age_columns[2][idx],
                age_columns[3][idx],
            ];

            rows.push(SampleRow {
                sample_id,
                entity_id,
                depth: depths[idx],
                age: select_age(&candidates),
                values: value_columns.iter().map(|c| c[idx]).collect(),
            });
        }

        Ok(rows)
    }

    /// Site of an entity, if both are known
    pub fn site_of(&self, entity_id: i64) -> Option<&Site> {
        let entity = self.entities.get(&entity_id)?;
        self.sites.get(&entity.site_id)
    }

    /// sample.csv → (sample_id, entity_id[, depth])
    fn sample_frame(df: DataFrame) -> Result<LazyFrame> {
        require_columns(&df, &["sample_id", "entity_id"], "sample.csv")?;

        let mut exprs = vec![
            col("sample_id").cast(DataType::Int64),
            col("entity_id").cast(DataType::Int64),
        ];
        if let Some(depth) = first_present(&df, &["depth_sample", "depth"]) {
            exprs.push(col(depth).cast(DataType::Float64).alias("depth"));
        }

        Ok(df.lazy().select(exprs))
    }

    /// sisal_chronology.csv → (sample_id, <age model columns present>)
    ///
    /// Age-model columns absent from the file read as all-null later on.
    fn load_chronology(path: &Path) -> Result<LazyFrame> {
        let df = read_table(path)?;
        require_columns(&df, &["sample_id"], "sisal_chronology.csv")?;

        let mut exprs = vec![col("sample_id").cast(DataType::Int64)];
        for model in AGE_MODEL_PRIORITY {
            if first_present(&df, &[model.column()]).is_some() {
                exprs.push(col(model.column()).cast(DataType::Float64));
            } else {
                tracing::debug!("sisal_chronology.csv has no {} column", model.column());
            }
        }

        Ok(df.lazy().select(exprs))
    }

    /// `<proxy>.csv` → (sample_id, <proxy>_measurement), duplicates averaged
    fn load_proxy(path: &Path, proxy: Proxy) -> Result<LazyFrame> {
        let df = read_table(path)?;
        let measurement = proxy.measurement_column();
        require_columns(&df, &["sample_id", measurement.as_str()], &proxy.file_name())?;

        Ok(df
            .lazy()
            .select([
                col("sample_id").cast(DataType::Int64),
                col(measurement.as_str()).cast(DataType::Float64),
            ])
            .group_by([col("sample_id")])
            .agg([col(measurement.as_str()).mean()]))
    }

    /// entity.csv → entity_id → metadata
    fn load_entities(path: &Path) -> Result<FxHashMap<i64, EntityMeta>> {
        let df = read_table(path)?;
        require_columns(&df, &["entity_id", "site_id"], "entity.csv")?;

        let ctx = "entity.csv";
        let entity_ids = i64_values(&df, "entity_id", ctx)?;
        let site_ids = i64_values(&df, "site_id", ctx)?;
        let names = str_values(&df, "entity_name", ctx)?;
        let mineralogy_col = first_present(&df, &["mineralogy", "entity_mineralogy"]).unwrap_or("mineralogy");
        let mineralogies = str_values(&df, mineralogy_col, ctx)?;

        let mut map = FxHashMap::default();
        for idx in 0..df.height() {
            if let (Some(entity_id), Some(site_id)) = (entity_ids[idx], site_ids[idx]) {
                map.insert(entity_id, EntityMeta {
                    entity_id,
                    site_id,
                    name: names[idx].clone(),
                    mineralogy: mineralogies[idx].clone(),
                });
            }
        }

        Ok(map)
    }

    /// site.csv → site_id → metadata
    fn load_sites(path: &Path) -> Result<FxHashMap<i64, Site>> {
        let df = read_table(path)?;
        require_columns(&df, &["site_id"], "site.csv")?;

        let ctx = "site.csv";
        let site_ids = i64_values(&df, "site_id", ctx)?;
        let names = str_values(&df, "site_name", ctx)?;
        let lats = f64_values(&df, "latitude", ctx)?;
        let lons = f64_values(&df, "longitude", ctx)?;
        let elevations = f64_values(&df, "elevation", ctx)?;
        let countries = str_values(&df, "country", ctx)?;

        let mut map = FxHashMap::default();
        for idx in 0..df.height() {
            if let Some(site_id) = site_ids[idx] {
                map.insert(site_id, Site {
                    site_id,
                    name: names[idx].clone(),
                    latitude: lats[idx],
                    longitude: lons[idx],
                    elevation: elevations[idx],
                    country: countries[idx].clone(),
                });
            }
        }

        Ok(map)
    }
}

/// Most common sample `mineralogy` per entity (ties → alphabetical first)
///
/// SISAL v3 records mineralogy per sample. Absent column → empty map.
fn mineralogy_by_entity(samples: &DataFrame) -> Result<FxHashMap<i64, String>> {
    let ctx = "sample.csv";
    let entity_ids = i64_values(samples, "entity_id", ctx)?;
    let mineralogies = str_values(samples, "mineralogy", ctx)?;

    let mut counts: FxHashMap<(i64, String), usize> = FxHashMap::default();
    for (entity_id, mineralogy) in entity_ids.into_iter().zip(mineralogies) {
        if let (Some(entity_id), Some(mineralogy)) = (entity_id, mineralogy) {
            *counts.entry((entity_id, mineralogy)).or_default() += 1;
        }
    }

    let mut best: FxHashMap<i64, (usize, String)> = FxHashMap::default();
    for ((entity_id, mineralogy), n) in counts {
        let better = match best.get(&entity_id) {
            Some((best_n, best_name)) => n > *best_n || (n == *best_n && mineralogy < *best_name),
            None => true,
        };
        if better {
            best.insert(entity_id, (n, mineralogy));
        }
    }

    Ok(best.into_iter().map(|(id, (_, m))| (id, m)).collect())
}

/// Read a SISAL-style CSV ("NA"/"NULL" treated as missing)
pub fn read_table(path: &Path) -> Result<DataFrame> {
    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }

    let parse_options = CsvParseOptions::default()
        .with_null_values(Some(NullValues::AllColumns(vec![
            "NA".into(),
            "NULL".into(),
            "null".into(),
        ])));

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .with_context(|| format!("Failed to create CSV reader: {}", path.display()))?
        .finish()
        .with_context(|| format!("Failed to load CSV: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_snapshot_is_an_error() {
        let dir = std::env::temp_dir().join("speleo_scanner_no_such_snapshot");
        let err = SisalData::load(&dir, &[Proxy::D18O]).err().unwrap();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_mineralogy_majority_per_entity() {
        let samples = df![
            "sample_id" => &[1i64, 2, 3, 4, 5, 6],
            "entity_id" => &[1i64, 1, 1, 2, 2, 3],
            "mineralogy" => &[Some("calcite"), Some("aragonite"), Some("calcite"), Some("calcite"), Some("aragonite"), None],
        ].unwrap();

        let modes = mineralogy_by_entity(&samples).unwrap();
        assert_eq!(modes.get(&1).map(String::as_str), Some("calcite"));
        assert_eq!(modes.get(&2).map(String::as_str), Some("aragonite"));
        assert!(!modes.contains_key(&3));

        let bare = df!["entity_id" => &[1i64]].unwrap();
        assert!(mineralogy_by_entity(&bare).unwrap().is_empty());
    }

    #[test]
    fn test_site_coordinates_need_both() {
        let mut site = Site {
            site_id: 1,
            name: None,
            latitude: Some(36.2),
            longitude: None,
            elevation: None,
            country: None,
        };
        assert_eq!(site.coordinates(), None);
        site.longitude = Some(29.1);
        assert_eq!(site.coordinates(), Some((36.2, 29.1)));
    }
}
