/// Per-station time-series aggregation.
///
/// Sorts each matched station's records by valid time, collapses exact
/// (valid_time, parameter) collisions keeping the last-seen value (a
/// later source message supersedes an earlier cycle's forecast for the
/// same hour), and verifies the strict-ordering invariant before handing
/// the series to the exporter.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::logging::{self, DataSource};
use crate::model::{ForecastRecord, MatchedStation, Parameter, PipelineError};

/// Aggregation result: the same stations with ordered, deduplicated
/// series, plus how many duplicate slots were collapsed on the way.
#[derive(Debug)]
pub struct AggregateOutcome {
    pub stations: Vec<MatchedStation>,
    pub duplicates_collapsed: usize,
}

/// Orders and deduplicates every station's series.
///
/// Fails with `Ordering` only when dedup cannot restore a strictly
/// increasing series: two records sharing a valid time but not a
/// parameter. That means corrupt upstream data and is reported rather
/// than silently patched.
pub fn aggregate(stations: Vec<MatchedStation>) -> Result<AggregateOutcome, PipelineError> {
    let mut out = Vec::with_capacity(stations.len());
    let mut duplicates_collapsed = 0usize;

    for station in stations {
        let station_id = station.metadata.station_id.clone();
        let before = station.records.len();

        // Arrival order drives the overwrite: the last record seen for a
        // (valid_time, parameter) slot wins.
        let mut slots: BTreeMap<(DateTime<Utc>, Parameter), ForecastRecord> = BTreeMap::new();
        for record in station.records {
            if slots.insert((record.valid_time, record.parameter), record).is_some() {
                duplicates_collapsed += 1;
            }
        }

        let records: Vec<ForecastRecord> = slots.into_values().collect();
        if before != records.len() {
            logging::debug(
                DataSource::System,
                Some(&station_id),
                &format!("collapsed {} duplicate forecast slots", before - records.len()),
            );
        }

        verify_strictly_increasing(&station_id, &records)?;

        out.push(MatchedStation {
            metadata: station.metadata,
            records,
        });
    }

    Ok(AggregateOutcome {
        stations: out,
        duplicates_collapsed,
    })
}

/// The exporter's contract: consecutive records strictly increase in
/// valid time. After (valid_time, parameter) dedup the only way this can
/// fail is two parameters reporting the same instant.
fn verify_strictly_increasing(
    station_id: &str,
    records: &[ForecastRecord],
) -> Result<(), PipelineError> {
    for pair in records.windows(2) {
        if pair[1].valid_time <= pair[0].valid_time {
            return Err(PipelineError::Ordering {
                station_id: station_id.to_string(),
                valid_time: pair[1].valid_time,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
