//! SISAL snapshot inspection
//!
//! Loads the snapshot named by the run configuration and prints what the
//! analyses will see: table sizes, qualifying entities per proxy, age-model
//! usage and the longest records.
//!
//! Output: series_summary.csv + inspect_sisal_manifest.json in OUTPUT_DIR

use speleo_scanner::report::{series_frame, write_csv, RunManifest};
use speleo_scanner::{load_entity_series, AgeModel, ScanConfig, SisalData};
use std::collections::BTreeMap;
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

    println!("\n{}", "=".repeat(80));
    println!("SISAL SNAPSHOT INSPECTION");
    println!("{}", "=".repeat(80));

    let data = SisalData::load(&config.data_dir, &config.proxies)?;
    println!("\nTables:");
    println!("  Samples (joined): {}", data.samples.height());
    println!("  Entities: {}", data.entities.len());
    println!("  Sites: {}", data.sites.len());
    println!("  Proxies found: {:?}", data.proxies);

    let series = load_entity_series(&data, &config.proxies, config.min_samples)?;
    println!("\nEntities with >= {} dated samples: {}", config.min_samples, series.len());

    println!("\nPer proxy:");
    for proxy in &config.proxies {
        let with_proxy: Vec<_> = series.values().filter_map(|s| s.proxy(*proxy)).collect();
        let values: usize = with_proxy.iter().map(|p| p.valid_count()).sum();
        println!("  {:<6} {:>5} entities, {:>8} values", proxy.to_string(), with_proxy.len(), values);
    }

    let mut models: BTreeMap<AgeModel, usize> = BTreeMap::new();
    for s in series.values() {
        for model in &s.age_models {
            *models.entry(*model).or_default() += 1;
        }
    }
    println!("\nAge models used:");
    for (model, count) in &models {
        println!("  {:<10} {}", model.label(), count);
    }

    let mut longest: Vec<_> = series.values().collect();
    longest.sort_by(|a, b| b.len().cmp(&a.len()).then(a.entity_id.cmp(&b.entity_id)));
    println!("\nLongest records:");
    for s in longest.iter().take(10) {
        let span = match (s.years_ce.first(), s.years_ce.last()) {
            (Some(first), Some(last)) => format!("{:.0} to {:.0} CE", first, last),
            _ => "-".to_string(),
        };
        let site = s.site.as_ref().and_then(|x| x.name.clone()).unwrap_or_default();
        println!("  #{:<6} {:<24} {:<24} n={:<6} {}", s.entity_id, s.label(), site, s.len(), span);
    }

    let mut manifest = RunManifest::new("inspect_sisal", &config);
    let mut df = series_frame(&series)?;
    manifest.output(write_csv(&mut df, &config.output_dir, "series_summary.csv")?);
    manifest.count("samples", data.samples.height());
    manifest.count("entities", series.len());
    let manifest_path = manifest.write(&config.output_dir)?;

    println!("\n{}", "=".repeat(80));
    println!("COMPLETE in {:.1}s", start.elapsed().as_secs_f64());
    println!("  Manifest: {}", manifest_path.display());
    println!("{}", "=".repeat(80));

    Ok(())
}
