//! Report tables and run manifest
//!
//! Each analysis result flattens to a polars DataFrame and is written as CSV
//! into the output directory (overwriting earlier runs). A JSON manifest
//! records when the run happened, the configuration and what was written.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, SecondsFormat, Utc};
use polars::prelude::*;
use serde::Serialize;

use crate::anomaly::{Attribution, ScreenedExcursion};
use crate::changepoint::EntityScan;
use crate::config::ScanConfig;
use crate::series::EntitySeries;
use crate::window::{WindowOutcome, WindowSignificance};

/// One event × entity × proxy window evaluation
#[derive(Debug, Clone, Serialize)]
pub struct WindowRecord {
    pub event: String,
    pub event_year: f64,
    pub entity_id: i64,
    pub entity: String,
    pub proxy: String,
    pub distance_km: Option<f64>,
    pub outcome: WindowOutcome,
    pub significance: Option<WindowSignificance>,
}

/// Per entity/proxy series summary
pub fn series_frame(series: &BTreeMap<i64, EntitySeries>) -> PolarsResult<DataFrame> {
    let mut entity_id = Vec::new();
    let mut entity = Vec::new();
    let mut site = Vec::new();
    let mut latitude = Vec::new();
    let mut longitude = Vec::new();
    let mut proxy = Vec::new();
    let mut n_valid = Vec::new();
    let mut mean = Vec::new();
    let mut std = Vec::new();
    let mut first_year = Vec::new();
    let mut last_year = Vec::new();

    for s in series.values() {
        for (p, ps) in &s.proxies {
            let coverage = s.coverage(*p);
            entity_id.push(s.entity_id);
            entity.push(s.label());
            site.push(s.site.as_ref().and_then(|x| x.name.clone()));
            latitude.push(s.site.as_ref().and_then(|x| x.latitude));
            longitude.push(s.site.as_ref().and_then(|x| x.longitude));
            proxy.push(p.to_string());
            n_valid.push(ps.valid_count() as u32);
            mean.push(ps.baseline.mean);
            std.push(ps.baseline.std);
            first_year.push(coverage.map(|c| c.0));
            last_year.push(coverage.map(|c| c.1));
        }
    }

    DataFrame::new(vec![
        Series::new("entity_id".into(), entity_id).into(),
        Series::new("entity".into(), entity).into(),
        Series::new("site".into(), site).into(),
        Series::new("latitude".into(), latitude).into(),
        Series::new("longitude".into(), longitude).into(),
        Series::new("proxy".into(), proxy).into(),
        Series::new("n_valid".into(), n_valid).into(),
        Series::new("mean".into(), mean).into(),
        Series::new("std".into(), std).into(),
        Series::new("first_year_ce".into(), first_year).into(),
        Series::new("last_year_ce".into(), last_year).into(),
    ])
}

/// One row per change point; scans with none are omitted
pub fn changepoint_frame(scans: &[EntityScan]) -> PolarsResult<DataFrame> {
    let rows: Vec<_> = scans.iter()
        .flat_map(|s| s.scan.change_points.iter().map(move |cp| (s, cp)))
        .collect();

    DataFrame::new(vec![
        Series::new("entity_id".into(), rows.iter().map(|(s, _)| s.entity_id).collect::<Vec<_>>()).into(),
        Series::new("entity".into(), rows.iter().map(|(s, _)| s.label.clone()).collect::<Vec<_>>()).into(),
        Series::new("proxy".into(), rows.iter().map(|(s, _)| s.proxy.to_string()).collect::<Vec<_>>()).into(),
        Series::new("year_ce".into(), rows.iter().map(|(_, c)| c.year_ce).collect::<Vec<_>>()).into(),
        Series::new("before_mean".into(), rows.iter().map(|(_, c)| c.before_mean).collect::<Vec<_>>()).into(),
        Series::new("after_mean".into(), rows.iter().map(|(_, c)| c.after_mean).collect::<Vec<_>>()).into(),
        Series::new("shift".into(), rows.iter().map(|(_, c)| c.shift).collect::<Vec<_>>()).into(),
        Series::new("recovery_samples".into(), rows.iter().map(|(_, c)| c.recovery_samples as u32).collect::<Vec<_>>()).into(),
        Series::new("recovery_years".into(), rows.iter().map(|(_, c)| c.recovery_years).collect::<Vec<_>>()).into(),
        Series::new("recovered".into(), rows.iter().map(|(_, c)| c.recovered).collect::<Vec<_>>()).into(),
    ])
}

pub fn window_frame(records: &[WindowRecord]) -> PolarsResult<DataFrame> {
    let stats = |r: &WindowRecord| r.outcome.stats().copied();

    DataFrame::new(vec![
        Series::new("event".into(), records.iter().map(|r| r.event.clone()).collect::<Vec<_>>()).into(),
        Series::new("event_year".into(), records.iter().map(|r| r.event_year).collect::<Vec<_>>()).into(),
        Series::new("entity_id".into(), records.iter().map(|r| r.entity_id).collect::<Vec<_>>()).into(),
        Series::new("entity".into(), records.iter().map(|r| r.entity.clone()).collect::<Vec<_>>()).into(),
        Series::new("proxy".into(), records.iter().map(|r| r.proxy.clone()).collect::<Vec<_>>()).into(),
        Series::new("distance_km".into(), records.iter().map(|r| r.distance_km).collect::<Vec<_>>()).into(),
        Series::new("coverage".into(), records.iter().map(|r| r.outcome.label()).collect::<Vec<_>>()).into(),
        Series::new("n_samples".into(), records.iter().map(|r| stats(r).map(|s| s.n_samples as u32)).collect::<Vec<_>>()).into(),
        Series::new("window_mean".into(), records.iter().map(|r| stats(r).map(|s| s.mean)).collect::<Vec<_>>()).into(),
        Series::new("z_score".into(), records.iter().map(|r| stats(r).map(|s| s.z_score)).collect::<Vec<_>>()).into(),
        Series::new("p_value".into(), records.iter().map(|r| r.significance.map(|s| s.p_value)).collect::<Vec<_>>()).into(),
        Series::new("draws".into(), records.iter().map(|r| r.significance.map(|s| s.draws as u32)).collect::<Vec<_>>()).into(),
    ])
}

pub fn excursion_frame(screened: &[ScreenedExcursion]) -> PolarsResult<DataFrame> {
    let matched = |s: &ScreenedExcursion| match &s.attribution {
        Attribution::Documented { event, lag_years } => (Some(event.label()), Some(*lag_years)),
        Attribution::Candidate => (None, None),
    };

    DataFrame::new(vec![
        Series::new("entity_id".into(), screened.iter().map(|s| s.entity_id).collect::<Vec<_>>()).into(),
        Series::new("entity".into(), screened.iter().map(|s| s.label.clone()).collect::<Vec<_>>()).into(),
        Series::new("proxy".into(), screened.iter().map(|s| s.excursion.proxy.to_string()).collect::<Vec<_>>()).into(),
        Series::new("start_year".into(), screened.iter().map(|s| s.excursion.start_year).collect::<Vec<_>>()).into(),
        Series::new("end_year".into(), screened.iter().map(|s| s.excursion.end_year).collect::<Vec<_>>()).into(),
        Series::new("peak_year".into(), screened.iter().map(|s| s.excursion.peak_year).collect::<Vec<_>>()).into(),
        Series::new("peak_z".into(), screened.iter().map(|s| s.excursion.peak_z).collect::<Vec<_>>()).into(),
        Series::new("n_samples".into(), screened.iter().map(|s| s.excursion.n_samples as u32).collect::<Vec<_>>()).into(),
        Series::new("candidate".into(), screened.iter().map(|s| s.is_candidate()).collect::<Vec<_>>()).into(),
        Series::new("matched_event".into(), screened.iter().map(|s| matched(s).0).collect::<Vec<_>>()).into(),
        Series::new("lag_years".into(), screened.iter().map(|s| matched(s).1).collect::<Vec<_>>()).into(),
        Series::new("supporting_proxies".into(), screened.iter().map(|s| s.supporting_proxies as u32).collect::<Vec<_>>()).into(),
    ])
}

/// Regional TEC per map epoch with its z-score over the file
pub fn tec_frame(series: &[(Option<NaiveDateTime>, Option<f64>)], z: &[Option<f64>]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            "epoch".into(),
            series.iter().map(|(e, _)| e.map(|t| t.format("%Y-%m-%dT%H:%M:%S").to_string())).collect::<Vec<_>>(),
        ).into(),
        Series::new("tec".into(), series.iter().map(|(_, v)| *v).collect::<Vec<_>>()).into(),
        Series::new("z_score".into(), z.to_vec()).into(),
    ])
}

/// Write `df` as `<dir>/<name>`, creating `dir` if needed
pub fn write_csv(df: &mut DataFrame, dir: &Path, name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;

    let path = dir.join(name);
    let mut file = fs::File::create(&path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::info!("Wrote {} rows to {}", df.height(), path.display());
    Ok(path)
}

/// Summary of one batch run, written next to its CSV outputs
#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub tool: String,
    /// UTC, RFC 3339
    pub generated_at: String,
    pub config: ScanConfig,
    pub outputs: Vec<PathBuf>,
    pub counts: BTreeMap<String, usize>,
}

impl RunManifest {
    pub fn new(tool: &str, config: &ScanConfig) -> Self {
        Self {
            tool: tool.to_string(),
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            config: config.clone(),
            outputs: Vec::new(),
            counts: BTreeMap::new(),
        }
    }

    pub fn output(&mut self, path: PathBuf) {
        self.outputs.push(path);
    }

    pub fn count(&mut self, key: &str, value: usize) {
        self.counts.insert(key.to_string(), value);
    }

    /// Write `<dir>/<tool>_manifest.json`
    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory: {}", dir.display()))?;
        let path = dir.join(format!("{}_manifest.json", self.tool));
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::Excursion;
    use crate::changepoint::{ChangePoint, SeriesScan};
    use crate::proxy::Proxy;
    use crate::window::{Coverage, WindowStats};

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("speleo_report_{}_{}", name, std::process::id()))
    }

    #[test]
    fn test_changepoint_frame_skips_empty_scans() {
        let cp = ChangePoint {
            index: 3,
            year_ce: 1509.0,
            before_mean: -0.2,
            after_mean: 1.1,
            shift: 1.3,
            recovery_samples: 4,
            recovery_years: 20.0,
            recovered: true,
        };
        let scans = vec![
            EntityScan { entity_id: 1, label: "A".into(), proxy: Proxy::D18O, scan: SeriesScan::default() },
            EntityScan {
                entity_id: 2,
                label: "B".into(),
                proxy: Proxy::D18O,
                scan: SeriesScan { change_points: vec![cp], n_used: 40, failure: None },
            },
        ];

        let df = changepoint_frame(&scans).unwrap();
        assert_eq!(df.height(), 1);
        assert_eq!(df.column("entity_id").unwrap().i64().unwrap().get(0), Some(2));
    }

    #[test]
    fn test_window_frame_marks_missing_windows() {
        let records = vec![
            WindowRecord {
                event: "quake".into(),
                event_year: 1250.0,
                entity_id: 1,
                entity: "A".into(),
                proxy: "d18O".into(),
                distance_km: Some(12.0),
                outcome: WindowOutcome::Data(WindowStats { n_samples: 1, mean: 12.0, z_score: 1.18 }),
                significance: None,
            },
            WindowRecord {
                event: "quake".into(),
                event_year: 1250.0,
                entity_id: 2,
                entity: "B".into(),
                proxy: "d18O".into(),
                distance_km: None,
                outcome: WindowOutcome::NoData(Coverage::BeforeRecord),
                significance: None,
            },
        ];

        let df = window_frame(&records).unwrap();
        assert_eq!(df.shape(), (2, 12));
        let coverage = df.column("coverage").unwrap().str().unwrap();
        assert_eq!(coverage.get(1), Some("before_record"));
        assert_eq!(df.column("z_score").unwrap().f64().unwrap().get(1), None);
    }

    #[test]
    fn test_write_csv_and_manifest() {
        let dir = temp_dir("write");
        let screened = vec![ScreenedExcursion {
            entity_id: 7,
            label: "SO-1".into(),
            excursion: Excursion {
                proxy: Proxy::D13C,
                start_index: 0,
                end_index: 1,
                start_year: 1000.0,
                end_year: 1010.0,
                peak_year: 1010.0,
                peak_z: 2.7,
                n_samples: 2,
            },
            attribution: Attribution::Candidate,
            supporting_proxies: 1,
        }];

        let mut df = excursion_frame(&screened).unwrap();
        let path = write_csv(&mut df, &dir, "excursions.csv").unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("entity_id,entity,proxy"));
        assert_eq!(text.lines().count(), 2);

        let mut manifest = RunManifest::new("find_dark_candidates", &ScanConfig::default());
        manifest.output(path);
        manifest.count("candidates", 1);
        let manifest_path = manifest.write(&dir).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
        assert_eq!(json["counts"]["candidates"], 1);
        assert_eq!(json["config"]["penalty"], 3.0);
        assert!(json["generated_at"].as_str().unwrap().ends_with('Z'));

        fs::remove_dir_all(&dir).ok();
    }
}
