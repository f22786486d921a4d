/// Core data types for the NWM coastal TWL forecast pipeline.
///
/// This module defines the shared domain model imported by all other modules.
/// It contains no logic beyond conversions and error formatting; decoding,
/// matching, and aggregation live in `ingest` and `analysis`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ---------------------------------------------------------------------------
// Physical elements and units
// ---------------------------------------------------------------------------

/// SHEF physical-element family carried by a forecast value.
///
/// NWM coastal SHEF products encode total water level under the height
/// family (`HM...`); wave height (`HW...`) appears in related coastal
/// products and is decoded rather than dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Parameter {
    WaterLevel,
    WaveHeight,
}

impl Parameter {
    /// Maps a SHEF PE/type-source token (e.g. "HMIFE") to a parameter.
    /// Returns `None` for families this pipeline does not carry.
    pub fn from_pe_code(code: &str) -> Option<Parameter> {
        let code = code.to_ascii_uppercase();
        if code.starts_with("HM") {
            Some(Parameter::WaterLevel)
        } else if code.starts_with("HW") {
            Some(Parameter::WaveHeight)
        } else {
            None
        }
    }
}

/// Unit of a decoded value. The decoder normalizes everything to feet;
/// `Meters` only survives inside the decoder itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    Feet,
    Meters,
}

pub const METERS_TO_FEET: f64 = 3.280_839_895;

impl Unit {
    /// Converts `value` from this unit into feet.
    pub fn to_feet(self, value: f64) -> f64 {
        match self {
            Unit::Feet => value,
            Unit::Meters => value * METERS_TO_FEET,
        }
    }
}

/// Vertical datum a station's water levels are referenced to.
///
/// NWM total water level output is referenced to NAVD88; the catalog may
/// override per station where it carries a datum column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Datum {
    #[serde(rename = "NAVD88")]
    Navd88,
    #[serde(rename = "MLLW")]
    Mllw,
    #[serde(rename = "MSL")]
    Msl,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl Datum {
    /// Lenient parse of a catalog datum field. Unrecognized strings map to
    /// `Unknown` rather than failing the row.
    pub fn parse(s: &str) -> Datum {
        match s.trim().to_ascii_uppercase().as_str() {
            "NAVD88" | "NAVD 88" => Datum::Navd88,
            "MLLW" => Datum::Mllw,
            "MSL" => Datum::Msl,
            _ => Datum::Unknown,
        }
    }
}

// ---------------------------------------------------------------------------
// Record types
// ---------------------------------------------------------------------------

/// A single decoded forecast value for one station at one valid time.
///
/// Produced by the SHEF decoder; immutable once created. `value` is always
/// in feet. Unit conversion happens during decoding, not downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRecord {
    pub station_code: String,
    pub parameter: Parameter,
    pub valid_time: DateTime<Utc>,
    pub value: f64,
    pub unit: Unit,
}

/// Catalog metadata for a single station, loaded once per run from IEM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationMetadata {
    pub station_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub datum: Datum,
}

/// A catalog station together with its forecast records.
///
/// Invariant (after aggregation): `records` are strictly increasing in
/// `valid_time` and all share this station's identifier.
#[derive(Debug, Clone)]
pub struct MatchedStation {
    pub metadata: StationMetadata,
    pub records: Vec<ForecastRecord>,
}

// ---------------------------------------------------------------------------
// Run output
// ---------------------------------------------------------------------------

/// Provenance for one successfully fetched forecast cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadInfo {
    pub date: String,
    pub region: String,
    pub cycle: String,
    pub records: usize,
    pub stations: usize,
}

/// Non-fatal issues accumulated over a run, surfaced in `metadata.json`
/// and the logs rather than aborting the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RunDiagnostics {
    pub decode_warnings: Vec<String>,
    pub duplicates_collapsed: usize,
    pub downloads: Vec<DownloadInfo>,
}

/// Terminal artifact of one pipeline invocation. Written once to the three
/// JSON outputs and then discarded. Nothing persists across runs beyond
/// the output files themselves.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub stations: Vec<MatchedStation>,
    pub unmatched_forecast_codes: BTreeSet<String>,
    pub generated_at: DateTime<Utc>,
    pub diagnostics: RunDiagnostics,
}

impl RunResult {
    /// Total forecast records across all matched stations.
    pub fn record_count(&self) -> usize {
        self.stations.iter().map(|s| s.records.len()).sum()
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Fatal pipeline errors. Any of these aborts the run before output files
/// are touched, so the previous run's published artifacts stay intact.
#[derive(Debug)]
pub enum PipelineError {
    /// Non-empty SHEF input contained no decodable header block.
    Decode { source_name: String, reason: String },
    /// The station metadata source was unreadable or empty.
    CatalogLoad(String),
    /// A station's series could not be restored to strictly increasing
    /// valid times after deduplication.
    Ordering {
        station_id: String,
        valid_time: DateTime<Utc>,
    },
    /// Failed to materialize an output artifact.
    Io(std::io::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Decode { source_name, reason } => {
                write!(f, "Decode error in {}: {}", source_name, reason)
            }
            PipelineError::CatalogLoad(msg) => write!(f, "Catalog load error: {}", msg),
            PipelineError::Ordering { station_id, valid_time } => write!(
                f,
                "Ordering error for station {}: duplicate valid time {} after dedup",
                station_id, valid_time
            ),
            PipelineError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        PipelineError::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pe_code_height_family_maps_to_water_level() {
        assert_eq!(Parameter::from_pe_code("HMIFE"), Some(Parameter::WaterLevel));
        assert_eq!(Parameter::from_pe_code("hmifz"), Some(Parameter::WaterLevel));
        assert_eq!(Parameter::from_pe_code("HWIFE"), Some(Parameter::WaveHeight));
    }

    #[test]
    fn test_unsupported_pe_code_maps_to_none() {
        assert_eq!(Parameter::from_pe_code("QRIFE"), None, "discharge is not carried");
        assert_eq!(Parameter::from_pe_code(""), None);
    }

    #[test]
    fn test_meters_convert_to_feet() {
        let ft = Unit::Meters.to_feet(1.0);
        assert!((ft - 3.280_839_895).abs() < 1e-9);
        assert_eq!(Unit::Feet.to_feet(2.1), 2.1, "feet pass through unchanged");
    }

    #[test]
    fn test_datum_parse_is_lenient() {
        assert_eq!(Datum::parse("NAVD88"), Datum::Navd88);
        assert_eq!(Datum::parse(" navd 88 "), Datum::Navd88);
        assert_eq!(Datum::parse("MLLW"), Datum::Mllw);
        assert_eq!(Datum::parse("something-else"), Datum::Unknown);
    }

    #[test]
    fn test_pipeline_error_display_names_the_station() {
        let err = PipelineError::Ordering {
            station_id: "8443970".to_string(),
            valid_time: chrono::Utc::now(),
        };
        assert!(err.to_string().contains("8443970"));
    }
}
