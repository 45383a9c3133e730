//! CLI for geoslim - reduce GeoJSON feature collections for map delivery.
//!
//! This is a thin wrapper around the geoslim-core library. Invoked with no
//! arguments it processes both datasets from their conventional locations;
//! a failure in one dataset is logged and does not block the other, and the
//! process exits 0 either way (check the log and output files for failures).

use anyhow::Result;
use clap::Parser;
use geoslim_core::{process_dataset, DatasetKind, DatasetStats, PipelineConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "geoslim",
    about = "Reduce fire perimeter and ecoregion GeoJSON for map delivery",
    version
)]
struct Args {
    /// Input fire perimeter GeoJSON
    #[arg(long, default_value = "FireGeoData/California_Fire_Perimeters_(all).geojson")]
    fire_input: PathBuf,

    /// Output path for the reduced fire dataset
    #[arg(long, default_value = "static/data/california_fires_processed.geojson")]
    fire_output: PathBuf,

    /// Input ecoregion GeoJSON
    #[arg(long, default_value = "FireGeoData/USDA_Ecoregion_Sections_California.geojson")]
    eco_input: PathBuf,

    /// Output path for the reduced ecoregion dataset
    #[arg(long, default_value = "static/data/california_ecoregions_processed.geojson")]
    eco_output: PathBuf,

    /// Skip the fire perimeter pass
    #[arg(long)]
    skip_fire: bool,

    /// Skip the ecoregion pass
    #[arg(long)]
    skip_eco: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn run_pass(
    name: &str,
    input: &PathBuf,
    output: &PathBuf,
    kind: DatasetKind,
    config: &PipelineConfig,
) -> Option<DatasetStats> {
    match process_dataset(input, output, kind, config) {
        Ok(stats) => {
            println!(
                "✓ {}: {} features in, {} written ({} -> {} bytes)",
                name,
                stats.features_read,
                stats.features_written,
                stats.bytes_in,
                stats.bytes_out
            );
            Some(stats)
        }
        Err(e) => {
            log::error!("{} pass failed: {}", name, e);
            println!("✗ {}: failed ({})", name, e);
            None
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if !args.skip_fire {
        run_pass(
            "fire perimeters",
            &args.fire_input,
            &args.fire_output,
            DatasetKind::Fire,
            &PipelineConfig::fire(),
        );
    }

    if !args.skip_eco {
        run_pass(
            "ecoregions",
            &args.eco_input,
            &args.eco_output,
            DatasetKind::Ecoregion,
            &PipelineConfig::ecoregion(),
        );
    }

    Ok(())
}
