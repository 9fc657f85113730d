#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the waste map engine.
//!
//! Uses `indicatif-log-bridge` (via [`waste_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod inputs;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use waste_map_analysis::export::{self, AnalysisExport};
use waste_map_analysis::{AnalysisOptions, AnalysisResult, Engine};
use waste_map_cli_utils::{IndicatifProgress, MultiProgress};
use waste_map_config::EngineConfig;
use waste_map_source::ImagerySource;
use waste_map_source::file::FileImagerySource;
use waste_map_source::http::HttpImagerySource;
use waste_map_waste_models::Season;
use waste_map_zone_models::ZoneType;

#[derive(Parser)]
#[command(
    name = "waste_map",
    about = "Population and waste-generation estimates for map zones"
)]
struct Cli {
    /// Engine configuration file (TOML). Missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a single zone
    Analyze {
        /// Zone file: a JSON zone or a `GeoJSON` polygon
        #[arg(long)]
        zone: PathBuf,
        /// Land use for `GeoJSON` zones (e.g. `residential`, `mixed_use`)
        #[arg(long)]
        zone_type: Option<ZoneType>,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Analyse every zone in a JSON array concurrently
    Batch {
        /// JSON file holding an array of zones
        #[arg(long)]
        zones: PathBuf,
        #[command(flatten)]
        run: RunArgs,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args)]
struct RunArgs {
    /// Serve imagery from a JSON fixture instead of the configured service
    #[arg(long)]
    fixture: Option<PathBuf>,
    /// Seasonal adjustment for the waste projection (`wet` or `dry`)
    #[arg(long)]
    season: Option<Season>,
    /// Reference dataset (JSON) to validate against
    #[arg(long)]
    reference: Option<PathBuf>,
    /// Also project collection revenue
    #[arg(long)]
    revenue: bool,
    /// Vegetation tiles (JSON array) for footprints that carry no
    /// differential of their own
    #[arg(long)]
    vegetation: Option<PathBuf>,
    /// Override the footprint confidence threshold (0-1)
    #[arg(long)]
    confidence_threshold: Option<f64>,
    /// Write flat export records instead of full results
    #[arg(long)]
    export: bool,
    /// Write JSON here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

impl RunArgs {
    fn options(&self) -> Result<AnalysisOptions, Box<dyn std::error::Error>> {
        let reference = self
            .reference
            .as_deref()
            .map(inputs::load_reference)
            .transpose()?;
        let vegetation_tiles = self
            .vegetation
            .as_deref()
            .map(inputs::load_vegetation)
            .transpose()?
            .unwrap_or_default();
        Ok(AnalysisOptions {
            confidence_threshold: self.confidence_threshold,
            season: self.season,
            reference,
            include_revenue: self.revenue,
            vegetation_tiles,
            ..AnalysisOptions::default()
        })
    }

    fn write(&self, results: &[AnalysisResult]) -> Result<(), Box<dyn std::error::Error>> {
        let json = if self.export {
            let records: Vec<AnalysisExport> =
                results.iter().map(AnalysisExport::from_result).collect();
            export::to_json(&records)?
        } else if let [single] = results {
            serde_json::to_string_pretty(single)?
        } else {
            serde_json::to_string_pretty(results)?
        };

        match &self.output {
            Some(path) => {
                std::fs::write(path, json)?;
                log::info!("Wrote {} result(s) to {}", results.len(), path.display());
            }
            None => println!("{json}"),
        }
        Ok(())
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    Ok(match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    })
}

async fn build_source(
    fixture: Option<&Path>,
    config: &EngineConfig,
) -> Result<Arc<dyn ImagerySource>, Box<dyn std::error::Error>> {
    Ok(match fixture {
        Some(path) => Arc::new(FileImagerySource::load(path).await?),
        None => {
            log::info!("Using imagery service at {}", config.source.base_url);
            Arc::new(HttpImagerySource::new(&config.source)?)
        }
    })
}

async fn analyze(
    multi: &MultiProgress,
    config: EngineConfig,
    zone_path: &Path,
    zone_type: Option<ZoneType>,
    run: &RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let zone = inputs::load_zone(zone_path, zone_type)?;
    let options = run.options()?;
    let source = build_source(run.fixture.as_deref(), &config).await?;
    let engine = Engine::new(config, source);

    let progress = IndicatifProgress::stages_bar(multi, &zone.id);
    let result = engine
        .analyze_with_progress(&zone, &options, progress.as_ref())
        .await?;
    run.write(&[result])
}

async fn batch(
    multi: &MultiProgress,
    config: EngineConfig,
    zones_path: &Path,
    run: &RunArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let zones = inputs::load_zones(zones_path)?;
    let options = run.options()?;
    let source = build_source(run.fixture.as_deref(), &config).await?;
    log::info!(
        "Analysing {} zones, {} at a time",
        zones.len(),
        config.runtime.batch_concurrency
    );
    let engine = Engine::new(config, source);

    let progress = IndicatifProgress::zones_bar(multi, "Zones", zones.len() as u64);
    let outcomes = engine
        .analyze_batch(&zones, &options, progress.as_ref())
        .await;

    let mut results = Vec::with_capacity(outcomes.len());
    let mut failed = 0;
    for outcome in outcomes {
        match outcome.result {
            Ok(result) => results.push(result),
            Err(e) => {
                log::error!("Zone {}: {e}", outcome.zone_id);
                failed += 1;
            }
        }
    }
    // Completion order is arbitrary; keep the output stable.
    results.sort_by(|a, b| a.zone_id.cmp(&b.zone_id));
    run.write(&results)?;

    if failed > 0 {
        return Err(format!("{failed} of {} zones failed", zones.len()).into());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = waste_map_cli_utils::init_logger();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Analyze {
            zone,
            zone_type,
            run,
        } => analyze(&multi, config, &zone, zone_type, &run).await?,
        Commands::Batch { zones, run } => batch(&multi, config, &zones, &run).await?,
        Commands::Config => print!("{}", config.to_toml_string()?),
    }

    Ok(())
}
