//! Dark-earthquake candidate screening
//!
//! Finds |z| excursions in every entity/proxy series and splits them into
//! those explained by a nearby catalogued event and unexplained candidates.
//! Candidates seen in several proxies of one speleothem are listed first.
//!
//! Output: excursions.csv + find_dark_candidates_manifest.json in OUTPUT_DIR

use speleo_scanner::report::{excursion_frame, write_csv, RunManifest};
use speleo_scanner::{load_entity_series, screen_entities, EventCatalog, ScanConfig, SisalData};
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
    let params = config.screening;
    let start = Instant::now();

    println!("\n{}", "=".repeat(80));
    println!(
        "DARK EARTHQUAKE SCREENING (|z| >= {}, ±{} yr, {} km)",
        params.threshold, params.tolerance_years, params.radius_km
    );
    println!("{}", "=".repeat(80));

    let catalog = match &config.catalog_path {
        Some(path) => EventCatalog::load(path)?.with_min_magnitude(config.min_magnitude),
        None => {
            tracing::warn!("No catalog_path configured; every excursion will be a candidate");
            EventCatalog::default()
        }
    };
    println!("\nCatalog events: {}", catalog.len());

    let data = SisalData::load(&config.data_dir, &config.proxies)?;
    let series = load_entity_series(&data, &config.proxies, config.min_samples)?;
    println!("Entities: {}", series.len());

    let screened = screen_entities(&series, &catalog, &params);
    let mut candidates: Vec<_> = screened.iter().filter(|s| s.is_candidate()).collect();
    let documented = screened.len() - candidates.len();

    println!("\nExcursions: {}", screened.len());
    println!("  Documented: {}", documented);
    println!("  Candidates: {}", candidates.len());

    candidates.sort_by(|a, b| {
        b.supporting_proxies.cmp(&a.supporting_proxies)
            .then(b.excursion.peak_z.abs().total_cmp(&a.excursion.peak_z.abs()))
    });

    println!("\nTop candidates:");
    println!("  {:<8} {:<24} {:<6} {:>12} {:>8} {:>8}", "entity", "name", "proxy", "years CE", "peak z", "support");
    for c in candidates.iter().take(25) {
        println!(
            "  {:<8} {:<24} {:<6} {:>5.0}-{:<6.0} {:>+8.2} {:>8}",
            c.entity_id,
            c.label,
            c.excursion.proxy.to_string(),
            c.excursion.start_year,
            c.excursion.end_year,
            c.excursion.peak_z,
            c.supporting_proxies
        );
    }

    let mut manifest = RunManifest::new("find_dark_candidates", &config);
    let mut df = excursion_frame(&screened)?;
    manifest.output(write_csv(&mut df, &config.output_dir, "excursions.csv")?);
    manifest.count("entities", series.len());
    manifest.count("excursions", screened.len());
    manifest.count("documented", documented);
    manifest.count("candidates", candidates.len());
    let manifest_path = manifest.write(&config.output_dir)?;

    println!("\n{}", "=".repeat(80));
    println!("COMPLETE in {:.1}s", start.elapsed().as_secs_f64());
    println!("  Manifest: {}", manifest_path.display());
    println!("{}", "=".repeat(80));

    Ok(())
}
