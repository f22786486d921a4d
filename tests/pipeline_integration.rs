/// End-to-end pipeline tests over fixture data.
///
/// These run the full in-memory pipeline (decode, match, aggregate,
/// export) against a pinned SHEF fixture and a synthetic catalog: no
/// network, no clock. Live-endpoint checks live in
/// `data_source_verification.rs` and are `#[ignore]`d.

use chrono::{TimeZone, Utc};
use std::fs;
use std::path::PathBuf;

use twl_pipeline::export::{self, RunMetadata, StationEntry, StationSeries};
use twl_pipeline::ingest::iem::StationCatalog;
use twl_pipeline::ingest::nwm::FetchedCycle;
use twl_pipeline::pipeline;

/// Three stations, hourly values starting at 01Z; 8726520 is deliberately
/// kept out of the default test catalog to exercise the unmatched path.
const FIXTURE: &str = include_str!("../fixtures/nwm_sample.shef");

const CATALOG_CSV: &str = "\
stid,station_name,lat,lon,elev,begints,iem_network
8443970,BOSTON,42.3539,-71.0503,2.0,1921-05-03,NOS
8447930,WOODS HOLE,41.5236,-70.6711,1.9,1932-06-15,NOS
";

fn fixture_input() -> FetchedCycle {
    FetchedCycle {
        text: FIXTURE.to_string(),
        source_name: "nwm.t00z.short_range_coastal.total_water.atlgulf.shef".to_string(),
        date: "2024-06-01".to_string(),
        region: "atlgulf".to_string(),
        cycle: "00".to_string(),
    }
}

fn catalog() -> StationCatalog {
    StationCatalog::from_csv(CATALOG_CSV).expect("fixture catalog should parse")
}

fn generated_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap()
}

fn temp_out(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("twl_pipeline_it_{}_{}", tag, std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

// ---------------------------------------------------------------------------
// Matching behavior
// ---------------------------------------------------------------------------

#[test]
fn test_matched_station_appears_with_catalog_metadata() {
    let result = pipeline::run(&[fixture_input()], &catalog(), generated_at())
        .expect("fixture should run clean");

    let boston = result
        .stations
        .iter()
        .find(|s| s.metadata.station_id == "8443970")
        .expect("Boston should be matched");
    assert_eq!(boston.metadata.name, "BOSTON");
    assert_eq!(boston.records.len(), 6);
}

#[test]
fn test_unknown_forecast_code_is_surfaced_not_exported() {
    let out = temp_out("unmatched");
    let result = pipeline::run(&[fixture_input()], &catalog(), generated_at())
        .expect("fixture should run clean");
    export::write_artifacts(&result, &out).expect("export should succeed");

    assert!(
        result.unmatched_forecast_codes.contains("8726520"),
        "the code missing from the catalog is surfaced"
    );

    let stations: Vec<StationEntry> =
        serde_json::from_str(&fs::read_to_string(out.join(export::STATIONS_FILE)).unwrap())
            .expect("stations.json should parse");
    assert!(
        stations.iter().all(|s| s.station_id != "8726520"),
        "unmatched codes never reach stations.json"
    );

    let metadata: RunMetadata =
        serde_json::from_str(&fs::read_to_string(out.join(export::METADATA_FILE)).unwrap())
            .expect("metadata.json should parse");
    assert_eq!(metadata.unmatched_count, 1);
    assert_eq!(metadata.station_count, 2);

    let _ = fs::remove_dir_all(&out);
}

#[test]
fn test_station_absent_from_catalog_entirely() {
    // Same forecast input, but the catalog knows nothing at all.
    let lone_catalog =
        StationCatalog::from_csv("stid,station_name,lat,lon\n9999999,NOWHERE,0.0,0.0\n")
            .expect("catalog should parse");

    let result = pipeline::run(&[fixture_input()], &lone_catalog, generated_at())
        .expect("an all-unmatched run is still a successful run");

    assert!(result.stations.is_empty());
    assert_eq!(result.unmatched_forecast_codes.len(), 3);
}

// ---------------------------------------------------------------------------
// Decode → export value fidelity
// ---------------------------------------------------------------------------

#[test]
fn test_offsets_resolve_against_the_base_date() {
    let result = pipeline::run(&[fixture_input()], &catalog(), generated_at())
        .expect("fixture should run clean");

    let boston = result
        .stations
        .iter()
        .find(|s| s.metadata.station_id == "8443970")
        .unwrap();

    // Fixture: base date 2024-06-01, DH01, hourly interval.
    assert_eq!(
        boston.records[0].valid_time,
        Utc.with_ymd_and_hms(2024, 6, 1, 1, 0, 0).unwrap()
    );
    assert_eq!(
        boston.records[5].valid_time,
        Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap()
    );
}

#[test]
fn test_missing_sentinel_leaves_a_gap_in_the_series() {
    let result = pipeline::run(&[fixture_input()], &catalog(), generated_at())
        .expect("fixture should run clean");

    let woods_hole = result
        .stations
        .iter()
        .find(|s| s.metadata.station_id == "8447930")
        .unwrap();

    // Four tokens, one `M`: three records, and the slot after the gap
    // still lands on its own hour.
    assert_eq!(woods_hole.records.len(), 3);
    assert_eq!(
        woods_hole.records[2].valid_time,
        Utc.with_ymd_and_hms(2024, 6, 1, 4, 0, 0).unwrap()
    );
}

#[test]
fn test_exported_series_parses_back_to_the_same_points() {
    let out = temp_out("roundtrip");
    let result = pipeline::run(&[fixture_input()], &catalog(), generated_at())
        .expect("fixture should run clean");
    export::write_artifacts(&result, &out).expect("export should succeed");

    let parsed: Vec<StationSeries> =
        serde_json::from_str(&fs::read_to_string(out.join(export::TWL_DATA_FILE)).unwrap())
            .expect("twl_data.json should parse");

    let mut exported: Vec<(String, String, f64)> = parsed
        .iter()
        .flat_map(|s| {
            s.series
                .iter()
                .map(|p| (s.station_id.clone(), p.valid_time.clone(), p.value_ft))
        })
        .collect();
    exported.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    let mut in_memory: Vec<(String, String, f64)> = result
        .stations
        .iter()
        .flat_map(|s| {
            s.records.iter().map(|r| {
                (
                    s.metadata.station_id.clone(),
                    r.valid_time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
                    r.value,
                )
            })
        })
        .collect();
    in_memory.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));

    assert_eq!(exported, in_memory, "the exported shape is lossless");

    let _ = fs::remove_dir_all(&out);
}

#[test]
fn test_series_is_strictly_ordered_in_the_artifact() {
    let out = temp_out("ordered");
    let result = pipeline::run(&[fixture_input()], &catalog(), generated_at())
        .expect("fixture should run clean");
    export::write_artifacts(&result, &out).expect("export should succeed");

    let parsed: Vec<StationSeries> =
        serde_json::from_str(&fs::read_to_string(out.join(export::TWL_DATA_FILE)).unwrap())
            .expect("twl_data.json should parse");

    for station in &parsed {
        for pair in station.series.windows(2) {
            assert!(
                pair[0].valid_time < pair[1].valid_time,
                "series for {} must strictly increase ({} then {})",
                station.station_id,
                pair[0].valid_time,
                pair[1].valid_time
            );
        }
    }

    let _ = fs::remove_dir_all(&out);
}

// ---------------------------------------------------------------------------
// Idempotence
// ---------------------------------------------------------------------------

#[test]
fn test_identical_inputs_produce_byte_identical_artifacts() {
    let out_a = temp_out("idem_a");
    let out_b = temp_out("idem_b");

    for out in [&out_a, &out_b] {
        let result = pipeline::run(&[fixture_input()], &catalog(), generated_at())
            .expect("fixture should run clean");
        export::write_artifacts(&result, out).expect("export should succeed");
    }

    for name in [
        export::STATIONS_FILE,
        export::TWL_DATA_FILE,
        export::METADATA_FILE,
    ] {
        let a = fs::read(out_a.join(name)).unwrap();
        let b = fs::read(out_b.join(name)).unwrap();
        assert_eq!(a, b, "{} must be byte-identical across identical runs", name);
    }

    let _ = fs::remove_dir_all(&out_a);
    let _ = fs::remove_dir_all(&out_b);
}

#[test]
fn test_only_metadata_changes_when_the_clock_moves() {
    let out_a = temp_out("clock_a");
    let out_b = temp_out("clock_b");

    let first = pipeline::run(&[fixture_input()], &catalog(), generated_at())
        .expect("fixture should run clean");
    export::write_artifacts(&first, &out_a).expect("export should succeed");

    let later = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let second =
        pipeline::run(&[fixture_input()], &catalog(), later).expect("fixture should run clean");
    export::write_artifacts(&second, &out_b).expect("export should succeed");

    for name in [export::STATIONS_FILE, export::TWL_DATA_FILE] {
        assert_eq!(
            fs::read(out_a.join(name)).unwrap(),
            fs::read(out_b.join(name)).unwrap(),
            "{} does not depend on the run clock",
            name
        );
    }
    assert_ne!(
        fs::read(out_a.join(export::METADATA_FILE)).unwrap(),
        fs::read(out_b.join(export::METADATA_FILE)).unwrap(),
        "generated_at lives in metadata.json"
    );

    let _ = fs::remove_dir_all(&out_a);
    let _ = fs::remove_dir_all(&out_b);
}

// ---------------------------------------------------------------------------
// Known-answer scenarios
// ---------------------------------------------------------------------------

#[test]
fn test_boston_single_point_scenario() {
    // Header for 8443970, base date 2024-06-01, one value at +3h of 2.1 ft.
    let shef = ".E 8443970 20240601 Z DH03/HMIFE/DIH1/2.1\n";
    let input = FetchedCycle {
        text: shef.to_string(),
        source_name: "scenario.shef".to_string(),
        date: "2024-06-01".to_string(),
        region: "atlgulf".to_string(),
        cycle: "00".to_string(),
    };

    let result =
        pipeline::run(&[input], &catalog(), generated_at()).expect("scenario should run");

    assert_eq!(result.stations.len(), 1);
    let station = &result.stations[0];
    assert_eq!(station.metadata.station_id, "8443970");
    assert_eq!(station.metadata.name, "BOSTON");
    assert_eq!(station.records.len(), 1);
    assert_eq!(
        station.records[0].valid_time,
        Utc.with_ymd_and_hms(2024, 6, 1, 3, 0, 0).unwrap()
    );
    assert_eq!(station.records[0].value, 2.1);
}

#[test]
fn test_boston_unmatched_scenario() {
    let shef = ".E 8443970 20240601 Z DH03/HMIFE/DIH1/2.1\n";
    let input = FetchedCycle {
        text: shef.to_string(),
        source_name: "scenario.shef".to_string(),
        date: "2024-06-01".to_string(),
        region: "atlgulf".to_string(),
        cycle: "00".to_string(),
    };
    let no_boston = StationCatalog::from_csv("stid,station_name,lat,lon\n8447930,WOODS HOLE,41.5,-70.7\n")
        .expect("catalog should parse");

    let out = temp_out("no_boston");
    let result = pipeline::run(&[input], &no_boston, generated_at()).expect("should run");
    export::write_artifacts(&result, &out).expect("export should succeed");

    let stations: Vec<StationEntry> =
        serde_json::from_str(&fs::read_to_string(out.join(export::STATIONS_FILE)).unwrap())
            .unwrap();
    assert!(stations.is_empty(), "8443970 must not appear without catalog metadata");

    let metadata: RunMetadata =
        serde_json::from_str(&fs::read_to_string(out.join(export::METADATA_FILE)).unwrap())
            .unwrap();
    assert_eq!(metadata.unmatched_count, 1);

    let _ = fs::remove_dir_all(&out);
}
