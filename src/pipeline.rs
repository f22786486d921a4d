/// Run-to-completion pipeline driver.
///
/// One invocation processes one set of fetched forecast files through
/// decode → match → aggregate, producing the `RunResult` that the
/// exporter turns into published artifacts. Every stage is a pure
/// in-memory transform; the clock is injected so tests (and the
/// idempotence guarantee) do not depend on wall time.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use crate::analysis::{matching, series};
use crate::ingest::iem::StationCatalog;
use crate::ingest::nwm::FetchedCycle;
use crate::ingest::shef;
use crate::model::{DownloadInfo, PipelineError, RunDiagnostics, RunResult};

/// Decodes, matches, and aggregates one run's inputs.
///
/// Fatal outcomes (`Decode` on a whole input, `Ordering` after dedup)
/// abort before the caller ever reaches the exporter, so the previous
/// run's artifacts survive untouched.
pub fn run(
    inputs: &[FetchedCycle],
    catalog: &StationCatalog,
    generated_at: DateTime<Utc>,
) -> Result<RunResult, PipelineError> {
    let mut records = Vec::new();
    let mut decode_warnings = Vec::new();
    let mut downloads = Vec::new();

    for input in inputs {
        let decoded = shef::decode(&input.text, &input.source_name)?;

        let station_codes: BTreeSet<&str> = decoded
            .records
            .iter()
            .map(|r| r.station_code.as_str())
            .collect();
        downloads.push(DownloadInfo {
            date: input.date.clone(),
            region: input.region.clone(),
            cycle: input.cycle.clone(),
            records: decoded.records.len(),
            stations: station_codes.len(),
        });

        decode_warnings.extend(decoded.warnings);
        records.extend(decoded.records);
    }

    let matched = matching::match_records(records, catalog);
    let aggregated = series::aggregate(matched.stations)?;

    Ok(RunResult {
        stations: aggregated.stations,
        unmatched_forecast_codes: matched.unmatched_codes,
        generated_at,
        diagnostics: RunDiagnostics {
            decode_warnings,
            duplicates_collapsed: aggregated.duplicates_collapsed,
            downloads,
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn input(text: &str) -> FetchedCycle {
        FetchedCycle {
            text: text.to_string(),
            source_name: "nwm.t00z.short_range_coastal.total_water.atlgulf.shef".to_string(),
            date: "2024-06-01".to_string(),
            region: "atlgulf".to_string(),
            cycle: "00".to_string(),
        }
    }

    fn catalog() -> StationCatalog {
        StationCatalog::from_csv(
            "stid,station_name,lat,lon\n8443970,BOSTON,42.3539,-71.0503\n",
        )
        .expect("test catalog should parse")
    }

    #[test]
    fn test_run_threads_records_through_all_stages() {
        let shef = ".E 8443970 20240601 Z DH00/HMIFE/DIH1/2.1/2.2/2.3\n";
        let generated_at = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();

        let result = run(&[input(shef)], &catalog(), generated_at).expect("run should succeed");

        assert_eq!(result.stations.len(), 1);
        assert_eq!(result.record_count(), 3);
        assert_eq!(result.generated_at, generated_at);
        assert_eq!(result.diagnostics.downloads.len(), 1);
        assert_eq!(result.diagnostics.downloads[0].records, 3);
        assert_eq!(result.diagnostics.downloads[0].stations, 1);
    }

    #[test]
    fn test_decode_error_in_any_input_aborts_the_run() {
        let good = ".E 8443970 20240601 Z DH00/HMIFE/DIH1/2.1\n";
        let headerless = ": comments only\n";

        let generated_at = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();
        let result = run(&[input(good), input(headerless)], &catalog(), generated_at);

        assert!(
            matches!(result, Err(PipelineError::Decode { .. })),
            "a headerless input is fatal for the whole run"
        );
    }

    #[test]
    fn test_multiple_inputs_concatenate_before_matching() {
        // The same station appears in two cycles; the second cycle's value
        // for the shared hour must win.
        let cycle_a = ".E 8443970 20240601 Z DH00/HMIFE/DIH1/2.1/2.2\n";
        let cycle_b = ".E 8443970 20240601 Z DH01/HMIFE/DIH1/9.9\n";
        let generated_at = Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap();

        let result =
            run(&[input(cycle_a), input(cycle_b)], &catalog(), generated_at).expect("should run");

        let records = &result.stations[0].records;
        assert_eq!(records.len(), 2, "the duplicate hour collapses");
        assert_eq!(records[1].value, 9.9, "the later cycle supersedes");
        assert_eq!(result.diagnostics.duplicates_collapsed, 1);
    }
}
