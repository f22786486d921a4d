/// JSON artifact export.
///
/// Serializes a `RunResult` into the three published artifacts
/// (`stations.json`, `twl_data.json`, `metadata.json`) plus the
/// `stations_cache.json` snapshot used as the catalog fallback on later
/// runs. The three artifacts are written to `.tmp` siblings first and
/// renamed only after every one of them is fully materialized, so a
/// failed run never leaves a partially updated set behind.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ingest::iem::StationCatalog;
use crate::logging::{self, DataSource};
use crate::model::{DownloadInfo, Parameter, PipelineError, RunResult};

/// Bumped whenever a field set changes shape; consumers pin against this.
pub const SCHEMA_VERSION: u32 = 1;

pub const STATIONS_FILE: &str = "stations.json";
pub const TWL_DATA_FILE: &str = "twl_data.json";
pub const METADATA_FILE: &str = "metadata.json";
pub const CATALOG_CACHE_FILE: &str = "stations_cache.json";

// ---------------------------------------------------------------------------
// Artifact schemas
// ---------------------------------------------------------------------------

/// One row of `stations.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationEntry {
    pub station_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub datum: crate::model::Datum,
}

/// One point of a station's series in `twl_data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// ISO 8601 UTC, e.g. "2024-06-01T03:00:00Z".
    pub valid_time: String,
    pub value_ft: f64,
}

/// One row of `twl_data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSeries {
    pub station_id: String,
    pub series: Vec<SeriesPoint>,
}

/// `metadata.json`: run provenance for the downstream client and for
/// monitoring the match rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub schema_version: u32,
    /// ISO 8601 UTC.
    pub generated_at: String,
    pub station_count: usize,
    pub unmatched_count: usize,
    pub record_count: usize,
    pub decode_warning_count: usize,
    pub downloads: Vec<DownloadInfo>,
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// Builds the `stations.json` rows from a run result.
pub fn station_entries(result: &RunResult) -> Vec<StationEntry> {
    result
        .stations
        .iter()
        .map(|s| StationEntry {
            station_id: s.metadata.station_id.clone(),
            name: s.metadata.name.clone(),
            latitude: round_to(s.metadata.latitude, 6),
            longitude: round_to(s.metadata.longitude, 6),
            datum: s.metadata.datum,
        })
        .collect()
}

/// Builds the `twl_data.json` rows. Only water-level records feed the TWL
/// series; a station whose records are all other parameters is present in
/// `stations.json` but has no series row.
pub fn station_series(result: &RunResult) -> Vec<StationSeries> {
    result
        .stations
        .iter()
        .filter_map(|s| {
            let series: Vec<SeriesPoint> = s
                .records
                .iter()
                .filter(|r| r.parameter == Parameter::WaterLevel)
                .map(|r| SeriesPoint {
                    valid_time: r.valid_time.to_rfc3339_opts(SecondsFormat::Secs, true),
                    value_ft: round_to(r.value, 4),
                })
                .collect();
            if series.is_empty() {
                None
            } else {
                Some(StationSeries {
                    station_id: s.metadata.station_id.clone(),
                    series,
                })
            }
        })
        .collect()
}

/// Builds the `metadata.json` document.
pub fn run_metadata(result: &RunResult) -> RunMetadata {
    RunMetadata {
        schema_version: SCHEMA_VERSION,
        generated_at: result.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        station_count: result.stations.len(),
        unmatched_count: result.unmatched_forecast_codes.len(),
        record_count: result.record_count(),
        decode_warning_count: result.diagnostics.decode_warnings.len(),
        downloads: result.diagnostics.downloads.clone(),
    }
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_json_tmp<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<PathBuf, PipelineError> {
    let tmp_path = dir.join(format!("{}.tmp", name));
    let bytes = serde_json::to_vec_pretty(value)
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))?;
    fs::write(&tmp_path, bytes)?;
    Ok(tmp_path)
}

/// Writes the three artifacts.
///
/// All `.tmp` files are fully materialized before the first rename; an
/// error at any point before that leaves the previously published
/// artifacts untouched.
pub fn write_artifacts(result: &RunResult, out_dir: &Path) -> Result<(), PipelineError> {
    fs::create_dir_all(out_dir)?;

    let stations = station_entries(result);
    let series = station_series(result);
    let metadata = run_metadata(result);

    let mut tmp_paths: Vec<(&str, PathBuf)> = Vec::with_capacity(3);
    let staged = (|| -> Result<Vec<(&str, PathBuf)>, PipelineError> {
        Ok(vec![
            (STATIONS_FILE, write_json_tmp(out_dir, STATIONS_FILE, &stations)?),
            (TWL_DATA_FILE, write_json_tmp(out_dir, TWL_DATA_FILE, &series)?),
            (METADATA_FILE, write_json_tmp(out_dir, METADATA_FILE, &metadata)?),
        ])
    })();
    match staged {
        Ok(paths) => tmp_paths.extend(paths),
        Err(e) => {
            // Best-effort cleanup of whatever was staged before the failure.
            for name in [STATIONS_FILE, TWL_DATA_FILE, METADATA_FILE] {
                let _ = fs::remove_file(out_dir.join(format!("{}.tmp", name)));
            }
            return Err(e);
        }
    }

    for (name, tmp) in &tmp_paths {
        fs::rename(tmp, out_dir.join(name))?;
    }

    logging::info(
        DataSource::Export,
        None,
        &format!(
            "wrote {}, {}, {} to {}",
            STATIONS_FILE,
            TWL_DATA_FILE,
            METADATA_FILE,
            out_dir.display()
        ),
    );

    Ok(())
}

/// Snapshots the full catalog for the next run's fallback path. Failure
/// here is logged, not fatal; the published artifacts are already out.
pub fn write_catalog_cache(catalog: &StationCatalog, out_dir: &Path) {
    let stations: Vec<_> = catalog.stations().cloned().collect();
    let write = || -> Result<(), PipelineError> {
        let tmp = write_json_tmp(out_dir, CATALOG_CACHE_FILE, &stations)?;
        fs::rename(tmp, out_dir.join(CATALOG_CACHE_FILE))?;
        Ok(())
    };
    match write() {
        Ok(()) => logging::debug(
            DataSource::Export,
            None,
            &format!("refreshed {} ({} stations)", CATALOG_CACHE_FILE, stations.len()),
        ),
        Err(e) => logging::warn(
            DataSource::Export,
            None,
            &format!("failed to refresh {}: {}", CATALOG_CACHE_FILE, e),
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
