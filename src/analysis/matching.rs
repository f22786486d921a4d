/// Station matching.
///
/// Partitions decoded forecast records into per-station groups backed by
/// catalog metadata, and collects the forecast codes the catalog does not
/// know about. An unmatched code is not an error (NWM regularly forecasts
/// points the IEM listing lags behind on), but it is surfaced for
/// monitoring rather than silently dropped.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::ingest::iem::{normalize_station_id, StationCatalog};
use crate::logging::{self, DataSource};
use crate::model::{ForecastRecord, MatchedStation};

/// Result of reconciling one run's records against the catalog.
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// Stations with at least one forecast record, ordered by station id.
    pub stations: Vec<MatchedStation>,
    /// Forecast codes (normalized) absent from the catalog.
    pub unmatched_codes: BTreeSet<String>,
}

/// Groups records by normalized station code and joins them with catalog
/// metadata.
///
/// Records keep their arrival order within each group; the aggregator
/// depends on arrival order for its last-wins dedup. Catalog entries with
/// no forecast records simply do not appear.
pub fn match_records(records: Vec<ForecastRecord>, catalog: &StationCatalog) -> MatchOutcome {
    // BTreeMap keyed on the normalized code keeps output order
    // deterministic run to run.
    let mut groups: BTreeMap<String, Vec<ForecastRecord>> = BTreeMap::new();
    for record in records {
        let key = normalize_station_id(&record.station_code);
        groups.entry(key).or_default().push(record);
    }

    let mut outcome = MatchOutcome::default();
    for (key, group) in groups {
        match catalog.lookup(&key) {
            Some(metadata) => {
                outcome.stations.push(MatchedStation {
                    metadata: metadata.clone(),
                    records: group,
                });
            }
            None => {
                logging::debug(
                    DataSource::Iem,
                    Some(&key),
                    &format!("no catalog entry for forecast code ({} records)", group.len()),
                );
                outcome.unmatched_codes.insert(key);
            }
        }
    }

    if !outcome.unmatched_codes.is_empty() {
        logging::warn(
            DataSource::Iem,
            None,
            &format!(
                "{} forecast codes had no catalog entry",
                outcome.unmatched_codes.len()
            ),
        );
    }

    outcome
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
