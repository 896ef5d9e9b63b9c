//! Regional ionospheric TEC anomalies
//!
//! Averages each TEC map of an IONEX file over the configured region,
//! z-scores the resulting series and lists epochs beyond the screening
//! threshold.
//!
//! Output: regional_tec.csv + ionex_tec_anomalies_manifest.json in OUTPUT_DIR

use anyhow::Context;
use speleo_scanner::ionex::IonexFile;
use speleo_scanner::report::{tec_frame, write_csv, RunManifest};
use speleo_scanner::utils::zscore_series;
use speleo_scanner::ScanConfig;
use std::time::Instant;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speleo_scanner=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ScanConfig::from_env()?;
    let start = Instant::now();

    let path = config.ionex_path.as_ref()
        .context("ionex_path must be set in the config")?;
    let region = config.ionex_region
        .context("ionex_region must be set in the config")?;

    println!("\n{}", "=".repeat(80));
    println!(
        "REGIONAL TEC ({:.1}..{:.1}°N, {:.1}..{:.1}°E)",
        region.min_lat, region.max_lat, region.min_lon, region.max_lon
    );
    println!("{}", "=".repeat(80));

    let file = IonexFile::load(path)?;
    println!("\nMaps: {}", file.maps.len());
    if let Some(epoch) = file.header.first_epoch {
        println!("First epoch: {}", epoch);
    }

    let series = file.regional_series(&region);
    let values: Vec<Option<f64>> = series.iter().map(|(_, v)| *v).collect();
    let (baseline, z) = zscore_series(&values)
        .context("No TEC map has valid values inside the region")?;
    println!("Regional mean {:.2} TECU, std {:.2}", baseline.mean, baseline.std);

    println!("\nEpochs with |z| >= {}:", config.screening.threshold);
    let mut n_anomalies = 0usize;
    for ((epoch, tec), z) in series.iter().zip(&z) {
        let (Some(tec), Some(z)) = (tec, z) else { continue };
        if z.abs() >= config.screening.threshold {
            n_anomalies += 1;
            let when = epoch.map(|e| e.to_string()).unwrap_or_else(|| "-".into());
            println!("  {:<20} {:>7.2} TECU  z={:>+6.2}", when, tec, z);
        }
    }
    if n_anomalies == 0 {
        println!("  (none)");
    }

    let mut manifest = RunManifest::new("ionex_tec_anomalies", &config);
    let mut df = tec_frame(&series, &z)?;
    manifest.output(write_csv(&mut df, &config.output_dir, "regional_tec.csv")?);
    manifest.count("maps", file.maps.len());
    manifest.count("anomalies", n_anomalies);
    let manifest_path = manifest.write(&config.output_dir)?;

    println!("\n{}", "=".repeat(80));
    println!("COMPLETE in {:.1}s", start.elapsed().as_secs_f64());
    println!("  Manifest: {}", manifest_path.display());
    println!("{}", "=".repeat(80));

    Ok(())
}
