//! End-to-end tests over a small synthetic SISAL snapshot
//!
//! Layout written to a temp directory:
//! - entity 1: four dated d18O samples (the worked window example), one sample
//!   with a junk measurement and one duplicated measurement
//! - entity 2: three samples, below the minimum and dropped
//! - entity 3: dated by lin_reg_age only
//! - entity 4: twenty identical values
//! - no d13C.csv

use approx::assert_relative_eq;
use speleo_scanner::report::{series_frame, write_csv};
use speleo_scanner::{
    load_entity_series, AgeModel, ChangePointScanner, EntitySeries, EventWindow, Proxy, SisalData,
    WindowOutcome,
};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

struct Snapshot {
    dir: PathBuf,
}

impl Snapshot {
    fn create(name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("speleo_pipeline_{}_{}", name, std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let mut sample = String::from("sample_id,entity_id,depth_sample,mineralogy\n");
        let mut chronology = String::from("sample_id,copRa_age,StalAge_age,lin_interp_age,lin_reg_age\n");
        let mut d18o = String::from("sample_id,d18O_measurement\n");

        // Entity 1, rows deliberately out of age order
        for (id, age, value) in [(3, 650.0, "8.0"), (1, 750.0, "9.0"), (4, 600.0, "11.0"), (2, 700.0, "12.0"), (5, 550.0, "junk")] {
            let mineralogy = if id == 2 { "aragonite" } else { "calcite" };
            sample.push_str(&format!("{},1,{},{}\n", id, id as f64 * 1.5, mineralogy));
            if id == 2 {
                chronology.push_str(&format!("{},NA,{},NA,NA\n", id, age));
            } else {
                chronology.push_str(&format!("{},{},NA,NA,NA\n", id, age));
            }
            d18o.push_str(&format!("{},{}\n", id, value));
        }
        // Duplicate measurement for sample 1: mean of 9 and 11
        d18o.push_str("1,11.0\n");

        // Entity 2
        for id in 6..9 {
            sample.push_str(&format!("{},2,{},NA\n", id, id));
            chronology.push_str(&format!("{},{},NA,NA,NA\n", id, 100 * id));
            d18o.push_str(&format!("{},-5.0\n", id));
        }

        // Entity 3, lin_reg only
        for (k, id) in (10..14).enumerate() {
            sample.push_str(&format!("{},3,{},NA\n", id, k));
            chronology.push_str(&format!("{},NA,NA,NA,{}\n", id, 100 * (k + 1)));
            d18o.push_str(&format!("{},{}\n", id, k + 1));
        }

        // Entity 4, flat
        for k in 0..20 {
            let id = 100 + k;
            sample.push_str(&format!("{},4,{},NA\n", id, k));
            chronology.push_str(&format!("{},{},NA,NA,NA\n", id, 1000 + 10 * k));
            d18o.push_str(&format!("{},5.0\n", id));
        }

        fs::write(dir.join("sample.csv"), sample).unwrap();
        fs::write(dir.join("sisal_chronology.csv"), chronology).unwrap();
        fs::write(dir.join("d18O.csv"), d18o).unwrap();
        fs::write(
            dir.join("entity.csv"),
            "entity_id,site_id,entity_name\n1,10,SO-1\n2,10,SO-2\n3,20,KC-3\n4,20,KC-4\n",
        ).unwrap();
        fs::write(
            dir.join("site.csv"),
            "site_id,site_name,latitude,longitude,elevation\n10,Sofular,41.42,31.93,440\n20,Kocain,NA,30.71,NA\n",
        ).unwrap();

        Self { dir }
    }

    fn series(&self) -> (SisalData, BTreeMap<i64, EntitySeries>) {
        let data = SisalData::load(&self.dir, &[Proxy::D18O, Proxy::D13C]).unwrap();
        let series = load_entity_series(&data, &[Proxy::D18O, Proxy::D13C], 4).unwrap();
        (data, series)
    }
}

impl Drop for Snapshot {
    fn drop(&mut self) {
        fs::remove_dir_all(&self.dir).ok();
    }
}

#[test]
fn test_missing_proxy_file_is_skipped() {
    let snapshot = Snapshot::create("proxies");
    let (data, series) = snapshot.series();

    assert_eq!(data.proxies, vec![Proxy::D18O]);
    assert!(series.values().all(|s| s.proxy(Proxy::D13C).is_none()));
}

#[test]
fn test_entities_below_minimum_are_dropped() {
    let snapshot = Snapshot::create("minimum");
    let (_, series) = snapshot.series();

    assert_eq!(series.keys().copied().collect::<Vec<_>>(), vec![1, 3, 4]);
    assert_eq!(series[&1].label(), "SO-1");
    assert_eq!(series[&1].meta.as_ref().unwrap().mineralogy.as_deref(), Some("calcite"));
    assert_eq!(series[&3].meta.as_ref().unwrap().mineralogy, None);
    assert_eq!(series[&1].site.as_ref().unwrap().coordinates(), Some((41.42, 31.93)));
    assert_eq!(series[&3].site.as_ref().unwrap().coordinates(), None);
}

#[test]
fn test_series_ordering_and_measurements() {
    let snapshot = Snapshot::create("ordering");
    let (_, series) = snapshot.series();
    let s = &series[&1];

    // Sample 5 has no valid measurement and stays off the axis
    assert_eq!(s.sample_ids, vec![1, 2, 3, 4]);
    assert_eq!(s.years_ce, vec![1200.0, 1250.0, 1300.0, 1350.0]);
    assert_eq!(s.age_models[1], AgeModel::StalAge);
    assert_eq!(s.age_models[0], AgeModel::CopRa);

    let raw: Vec<f64> = s.proxy(Proxy::D18O).unwrap().raw.iter().map(|v| v.unwrap()).collect();
    assert_eq!(raw, vec![10.0, 12.0, 8.0, 11.0]);
}

#[test]
fn test_lin_reg_only_entity_is_dated() {
    let snapshot = Snapshot::create("linreg");
    let (_, series) = snapshot.series();
    let s = &series[&3];

    assert!(s.age_models.iter().all(|m| *m == AgeModel::LinReg));
    assert_eq!(s.years_ce, vec![1550.0, 1650.0, 1750.0, 1850.0]);
}

#[test]
fn test_zscores_are_standardised() {
    let snapshot = Snapshot::create("zscores");
    let (_, series) = snapshot.series();

    let z: Vec<f64> = series[&1].proxy(Proxy::D18O).unwrap().z.iter().map(|v| v.unwrap()).collect();
    let n = z.len() as f64;
    let mean = z.iter().sum::<f64>() / n;
    let std = (z.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt();
    assert_relative_eq!(mean, 0.0, epsilon = 1e-12);
    assert_relative_eq!(std, 1.0, epsilon = 1e-12);

    let flat = series[&4].proxy(Proxy::D18O).unwrap();
    assert!(flat.z.iter().all(|v| *v == Some(0.0)));
}

#[test]
fn test_event_window_worked_example() {
    let snapshot = Snapshot::create("window");
    let (_, series) = snapshot.series();

    let outcome = series[&1].evaluate(Proxy::D18O, &EventWindow::new(1240.0, 1260.0)).unwrap();
    let WindowOutcome::Data(stats) = outcome else {
        panic!("expected data, got {:?}", outcome);
    };
    assert_eq!(stats.n_samples, 1);
    assert_relative_eq!(stats.mean, 12.0);
    assert_relative_eq!(stats.z_score, 1.183, epsilon = 1e-3);

    let before = series[&1].evaluate(Proxy::D18O, &EventWindow::around(1000.0, 50.0)).unwrap();
    assert_eq!(before.label(), "before_record");
}

#[test]
fn test_flat_entity_has_no_change_points() {
    let snapshot = Snapshot::create("flat");
    let (_, series) = snapshot.series();

    let scans = ChangePointScanner::new(0.5, 2).scan_entities(&series, Proxy::D18O);
    let flat = scans.iter().find(|s| s.entity_id == 4).unwrap();
    assert!(flat.scan.change_points.is_empty());
    assert!(flat.scan.failure.is_none());
    assert_eq!(flat.scan.n_used, 20);
}

#[test]
fn test_series_summary_report() {
    let snapshot = Snapshot::create("report");
    let (_, series) = snapshot.series();

    let out = snapshot.dir.join("out");
    let mut df = series_frame(&series).unwrap();
    assert_eq!(df.height(), 3);

    let path = write_csv(&mut df, &out, "series_summary.csv").unwrap();
    let text = fs::read_to_string(path).unwrap();
    assert!(text.lines().next().unwrap().starts_with("entity_id,entity,site"));
    assert_eq!(text.lines().count(), 4);
}
