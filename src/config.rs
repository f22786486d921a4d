/// Pipeline configuration.
///
/// Loaded from `pipeline.toml` at the working directory root. Every field
/// has a built-in default matching the production NWM/IEM endpoints, so a
/// missing config file is not an error: scheduled runs typically use the
/// defaults and override only `output_dir` or `log_level`.

use serde::Deserialize;
use std::error::Error;
use std::path::Path;

/// Default IEM network listing: all DCP sites, CSV, no HTML wrapper.
const DEFAULT_IEM_URL: &str =
    "https://mesonet.agron.iastate.edu/sites/networks.php?format=csv&nohtml=&special=alldcp";

/// Public HTTPS mirror of the NWM GCS bucket.
const DEFAULT_NWM_BASE_URL: &str = "https://storage.googleapis.com/national-water-model";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// NWM coastal domains to fetch, e.g. "atlgulf", "pacific".
    pub regions: Vec<String>,
    /// Model cycles to try, newest preferred. Zero-padded UTC hours.
    pub cycles: Vec<String>,
    /// How many days back to look when today's cycle is not published yet.
    pub lookback_days: u32,
    pub nwm_base_url: String,
    pub iem_url: String,
    pub output_dir: String,
    pub http_timeout_secs: u64,
    pub log_level: String,
    pub log_file: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            regions: vec!["atlgulf".to_string()],
            cycles: vec![
                "00".to_string(),
                "06".to_string(),
                "12".to_string(),
                "18".to_string(),
            ],
            lookback_days: 1,
            nwm_base_url: DEFAULT_NWM_BASE_URL.to_string(),
            iem_url: DEFAULT_IEM_URL.to_string(),
            output_dir: "data".to_string(),
            http_timeout_secs: 30,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

/// Loads the pipeline configuration from `path`.
///
/// A missing file yields the defaults; an unreadable or malformed file is
/// an error, since silently ignoring a broken config would run the
/// pipeline against unintended endpoints.
pub fn load_config(path: &Path) -> Result<PipelineConfig, Box<dyn Error>> {
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let config: PipelineConfig = toml::from_str(&contents)?;
    Ok(config)
}
