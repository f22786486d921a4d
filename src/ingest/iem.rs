/// IEM (Iowa Environmental Mesonet) station catalog loader.
///
/// Retrieves the IEM network listing (`sites/networks.php`, CSV format)
/// and normalizes it into a lookup from station identifier to metadata.
/// Forecast station codes and catalog identifiers do not always agree on
/// case or zero padding, so both sides of the match go through
/// `normalize_station_id` before keying.
///
/// API Documentation: https://mesonet.agron.iastate.edu/sites/networks.php

use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::path::Path;

use crate::logging::{self, DataSource};
use crate::model::{Datum, PipelineError, StationMetadata};

// ---------------------------------------------------------------------------
// Identifier normalization
// ---------------------------------------------------------------------------

/// Canonical form of a station identifier: ASCII-uppercased with leading
/// zeros stripped. This is the single normalization authority: the
/// matcher must use the same function, or matching silently diverges.
pub fn normalize_station_id(raw: &str) -> String {
    let upper = raw.trim().to_ascii_uppercase();
    let stripped = upper.trim_start_matches('0');
    if stripped.is_empty() {
        // An all-zero identifier still needs a stable key.
        "0".to_string()
    } else {
        stripped.to_string()
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// One row of the IEM network listing. Columns beyond these are ignored;
/// `datum` is absent from the standard listing and optional here.
#[derive(Debug, Deserialize)]
struct IemRow {
    stid: String,
    #[serde(default)]
    station_name: Option<String>,
    lat: f64,
    lon: f64,
    #[serde(default)]
    datum: Option<String>,
}

/// Station metadata keyed by normalized identifier. Built once per run;
/// scoped to that run so there is no cross-run staleness.
#[derive(Debug, Clone, Default)]
pub struct StationCatalog {
    entries: BTreeMap<String, StationMetadata>,
}

impl StationCatalog {
    /// Parses the IEM CSV listing into a catalog.
    ///
    /// Rows with an unparseable latitude/longitude are skipped with a
    /// warning. Duplicate identifiers collapse to the most recently
    /// listed row. An empty result is a `CatalogLoad` error.
    pub fn from_csv(text: &str) -> Result<StationCatalog, PipelineError> {
        let mut entries = BTreeMap::new();
        let mut skipped = 0usize;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(text.as_bytes());

        for row in reader.deserialize::<IemRow>() {
            let row = match row {
                Ok(row) => row,
                Err(e) => {
                    skipped += 1;
                    logging::debug(DataSource::Iem, None, &format!("skipping catalog row: {}", e));
                    continue;
                }
            };

            let station_id = row.stid.trim().to_string();
            if station_id.is_empty() {
                skipped += 1;
                continue;
            }

            let name = match row.station_name {
                Some(ref n) if !n.trim().is_empty() => n.trim().to_string(),
                // The listing occasionally has unnamed sites; fall back to
                // the identifier as the original pipeline did.
                _ => station_id.clone(),
            };

            let metadata = StationMetadata {
                station_id: station_id.clone(),
                name,
                latitude: row.lat,
                longitude: row.lon,
                datum: row.datum.as_deref().map(Datum::parse).unwrap_or(Datum::Navd88),
            };

            let key = normalize_station_id(&station_id);
            if let Some(previous) = entries.insert(key, metadata) {
                logging::warn(
                    DataSource::Iem,
                    Some(&previous.station_id),
                    "duplicate station id in catalog, keeping the later entry",
                );
            }
        }

        if skipped > 0 {
            logging::warn(
                DataSource::Iem,
                None,
                &format!("skipped {} unparseable catalog rows", skipped),
            );
        }

        if entries.is_empty() {
            return Err(PipelineError::CatalogLoad(
                "catalog source yielded zero stations".to_string(),
            ));
        }

        Ok(StationCatalog { entries })
    }

    /// Builds a catalog from already-structured metadata (the cache path).
    pub fn from_entries(stations: Vec<StationMetadata>) -> Result<StationCatalog, PipelineError> {
        let mut entries = BTreeMap::new();
        for metadata in stations {
            entries.insert(normalize_station_id(&metadata.station_id), metadata);
        }
        if entries.is_empty() {
            return Err(PipelineError::CatalogLoad("cached catalog is empty".to_string()));
        }
        Ok(StationCatalog { entries })
    }

    /// Looks up a station by any identifier spelling.
    pub fn lookup(&self, code: &str) -> Option<&StationMetadata> {
        self.entries.get(&normalize_station_id(code))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries in normalized-key order (deterministic).
    pub fn stations(&self) -> impl Iterator<Item = &StationMetadata> {
        self.entries.values()
    }
}

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Fetches the raw catalog CSV from IEM.
pub fn fetch_catalog_csv(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<String, Box<dyn Error>> {
    let response = client.get(url).header("Accept", "text/csv").send()?;

    if !response.status().is_success() {
        return Err(format!("IEM API error: HTTP {}", response.status()).into());
    }

    Ok(response.text()?)
}

/// Loads the station catalog: live IEM listing first, falling back to the
/// cache written by the previous successful run. Only when both paths
/// fail does the run abort with `CatalogLoad`.
pub fn load_catalog(
    client: &reqwest::blocking::Client,
    url: &str,
    cache_path: &Path,
) -> Result<StationCatalog, PipelineError> {
    match fetch_catalog_csv(client, url) {
        Ok(text) => match StationCatalog::from_csv(&text) {
            Ok(catalog) => {
                logging::info(
                    DataSource::Iem,
                    None,
                    &format!("loaded {} stations from IEM", catalog.len()),
                );
                return Ok(catalog);
            }
            Err(e) => logging::log_iem_failure("catalog parse", &e),
        },
        Err(e) => logging::log_iem_failure("catalog fetch", e.as_ref()),
    }

    match load_cached_catalog(cache_path) {
        Ok(catalog) => {
            logging::warn(
                DataSource::Iem,
                None,
                &format!(
                    "using cached station metadata ({} stations) from {}",
                    catalog.len(),
                    cache_path.display()
                ),
            );
            Ok(catalog)
        }
        Err(e) => Err(PipelineError::CatalogLoad(format!(
            "live fetch failed and no usable cache at {}: {}",
            cache_path.display(),
            e
        ))),
    }
}

/// Reads a previously written `stations_cache.json`.
fn load_cached_catalog(path: &Path) -> Result<StationCatalog, Box<dyn Error>> {
    let contents = std::fs::read_to_string(path)?;
    let stations: Vec<StationMetadata> = serde_json::from_str(&contents)?;
    Ok(StationCatalog::from_entries(stations)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
