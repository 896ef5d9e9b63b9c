//! Catalogued events against nearby speleothems
//!
//! For every catalog event at or above the configured magnitude, evaluates
//! the event-year window on each entity within the screening radius and
//! scores it against randomly placed windows of the same width.
//!
//! Output: event_windows.csv + evaluate_event_windows_manifest.json in OUTPUT_DIR

use anyhow::Context;
use rayon::prelude::*;
use speleo_scanner::report::{window_frame, write_csv, RunManifest, WindowRecord};
use speleo_scanner::window::window_significance;
use speleo_scanner::{load_entity_series, EventCatalog, EventWindow, ScanConfig, SisalData};
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

    let catalog_path = config.catalog_path.as_ref()
        .context("catalog_path must be set in the config to evaluate event windows")?;

    println!("\n{}", "=".repeat(80));
    println!("EVENT WINDOW EVALUATION (±{} yr, radius {} km)", config.window_half_width, config.screening.radius_km);
    println!("{}", "=".repeat(80));

    let catalog = EventCatalog::load(catalog_path)?.with_min_magnitude(config.min_magnitude);
    println!("\nEvents (M >= {}): {}", config.min_magnitude, catalog.len());

    let data = SisalData::load(&config.data_dir, &config.proxies)?;
    let series = load_entity_series(&data, &config.proxies, config.min_samples)?;
    println!("Entities: {}", series.len());

    let mut records: Vec<WindowRecord> = catalog.events
        .par_iter()
        .flat_map_iter(|event| {
            let window = EventWindow::around(event.year, config.window_half_width);
            let mut out = Vec::new();
            for s in series.values() {
                let distance_km = s.site.as_ref()
                    .and_then(|site| site.coordinates())
                    .and_then(|(lat, lon)| event.distance_km(lat, lon));
                if distance_km.is_some_and(|d| d > config.screening.radius_km) {
                    continue;
                }

                for (proxy, ps) in &s.proxies {
                    let Some(outcome) = s.evaluate(*proxy, &window) else {
                        continue;
                    };
                    let significance = window_significance(
                        &s.years_ce,
                        &ps.raw,
                        &ps.baseline,
                        &window,
                        config.significance_draws,
                        config.seed,
                    );
                    out.push(WindowRecord {
                        event: event.label(),
                        event_year: event.year,
                        entity_id: s.entity_id,
                        entity: s.label(),
                        proxy: proxy.to_string(),
                        distance_km,
                        outcome,
                        significance,
                    });
                }
            }
            out
        })
        .collect();

    records.sort_by(|a, b| {
        a.event_year.total_cmp(&b.event_year)
            .then(a.entity_id.cmp(&b.entity_id))
            .then(a.proxy.cmp(&b.proxy))
    });

    let with_data: Vec<_> = records.iter().filter(|r| r.outcome.stats().is_some()).collect();
    println!("\nWindows evaluated: {} ({} with data)", records.len(), with_data.len());

    let mut strongest = with_data.clone();
    strongest.sort_by(|a, b| {
        let za = a.outcome.stats().map(|s| s.z_score.abs()).unwrap_or(0.0);
        let zb = b.outcome.stats().map(|s| s.z_score.abs()).unwrap_or(0.0);
        zb.total_cmp(&za)
    });

    println!("\nStrongest responses:");
    for r in strongest.iter().take(20) {
        let Some(stats) = r.outcome.stats() else { continue };
        let p = r.significance.map(|s| format!("p={:.3}", s.p_value)).unwrap_or_else(|| "p=-".into());
        println!(
            "  {:<32} {:<24} {:<6} n={:<3} z={:>+6.2} {}",
            r.event, r.entity, r.proxy, stats.n_samples, stats.z_score, p
        );
    }

    let mut manifest = RunManifest::new("evaluate_event_windows", &config);
    let mut df = window_frame(&records)?;
    manifest.output(write_csv(&mut df, &config.output_dir, "event_windows.csv")?);
    manifest.count("events", catalog.len());
    manifest.count("entities", series.len());
    manifest.count("windows", records.len());
    manifest.count("windows_with_data", with_data.len());
    let manifest_path = manifest.write(&config.output_dir)?;

    println!("\n{}", "=".repeat(80));
    println!("COMPLETE in {:.1}s", start.elapsed().as_secs_f64());
    println!("  Manifest: {}", manifest_path.display());
    println!("{}", "=".repeat(80));

    Ok(())
}
