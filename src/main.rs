/// Pipeline entry point.
///
/// Parameterless by design: the scheduler just invokes the binary, and
/// everything configurable lives in `pipeline.toml` next to it. A fatal
/// error exits non-zero without touching the published artifacts.

use chrono::Utc;
use std::error::Error;
use std::path::Path;
use std::time::Duration;

use twl_pipeline::config::load_config;
use twl_pipeline::export;
use twl_pipeline::ingest::{iem, nwm};
use twl_pipeline::logging::{self, LogLevel};
use twl_pipeline::pipeline;

fn main() {
    if let Err(e) = run() {
        eprintln!("Pipeline failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let config = load_config(Path::new("pipeline.toml"))?;
    logging::init_logger(
        LogLevel::from_config(&config.log_level),
        config.log_file.as_deref(),
    );

    println!("============================================================");
    println!("NWM Coastal TWL Forecast Pipeline");
    println!("Run time: {} UTC", Utc::now().format("%Y-%m-%d %H:%M:%S"));
    println!("============================================================");

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(config.http_timeout_secs))
        .build()?;

    let today = Utc::now().date_naive();
    let fetched = nwm::fetch_latest_cycles(&client, &config, today);
    if fetched.is_empty() {
        return Err("no forecast data could be downloaded for any region".into());
    }

    let out_dir = Path::new(&config.output_dir);
    let catalog = iem::load_catalog(
        &client,
        &config.iem_url,
        &out_dir.join(export::CATALOG_CACHE_FILE),
    )?;

    let result = pipeline::run(&fetched, &catalog, Utc::now())?;
    export::write_artifacts(&result, out_dir)?;
    export::write_catalog_cache(&catalog, out_dir);

    logging::log_run_summary(
        result.stations.len(),
        result.unmatched_forecast_codes.len(),
        result.diagnostics.decode_warnings.len(),
    );

    Ok(())
}
