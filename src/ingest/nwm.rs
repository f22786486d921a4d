/// NWM forecast file retrieval.
///
/// Downloads SHEF total-water-level products from the public National
/// Water Model bucket over plain HTTPS. A cycle that has not been
/// published yet is routine: the fetch loop walks candidates newest
/// first (today before yesterday, late cycles before early ones) and
/// stops at the first hit per region.

use chrono::{Duration, NaiveDate};
use std::error::Error;

use crate::config::PipelineConfig;
use crate::logging::{self, DataSource};

/// One successfully downloaded forecast file, with its provenance.
#[derive(Debug, Clone)]
pub struct FetchedCycle {
    pub text: String,
    /// Object filename, used in decode diagnostics.
    pub source_name: String,
    pub date: String,
    pub region: String,
    pub cycle: String,
}

/// Object filename for a (cycle, region), e.g.
/// `nwm.t00z.short_range_coastal.total_water.atlgulf.shef`.
pub fn object_filename(region: &str, cycle: &str) -> String {
    format!(
        "nwm.t{}z.short_range_coastal.total_water.{}.shef",
        cycle, region
    )
}

/// Full object URL within the bucket's per-day layout.
pub fn build_object_url(base_url: &str, date: NaiveDate, region: &str, cycle: &str) -> String {
    format!(
        "{}/nwm.{}/short_range_coastal/{}",
        base_url.trim_end_matches('/'),
        date.format("%Y%m%d"),
        object_filename(region, cycle)
    )
}

/// Dates to try, newest first: today, then up to `lookback_days` back.
/// NWM data may not be available immediately, so the previous day is a
/// normal fallback rather than an error.
pub fn candidate_dates(today: NaiveDate, lookback_days: u32) -> Vec<NaiveDate> {
    (0..=lookback_days as i64)
        .map(|offset| today - Duration::days(offset))
        .collect()
}

/// Fetches one object. `Ok(None)` means the object does not exist (the
/// cycle is not published); any other non-success status is an error.
pub fn fetch_object(
    client: &reqwest::blocking::Client,
    url: &str,
) -> Result<Option<String>, Box<dyn Error>> {
    let response = client.get(url).send()?;

    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(format!("NWM bucket error: HTTP {}", response.status()).into());
    }

    Ok(Some(response.text()?))
}

/// Fetches the most recent available cycle for every configured region.
///
/// Regions are independent: a miss in one region never blocks another.
/// An empty result means no region had any published cycle in the
/// lookback window; the driver treats that as fatal.
pub fn fetch_latest_cycles(
    client: &reqwest::blocking::Client,
    config: &PipelineConfig,
    today: NaiveDate,
) -> Vec<FetchedCycle> {
    let mut fetched = Vec::new();

    for region in &config.regions {
        'region: for date in candidate_dates(today, config.lookback_days) {
            // Latest model cycle first.
            for cycle in config.cycles.iter().rev() {
                let url = build_object_url(&config.nwm_base_url, date, region, cycle);
                let name = object_filename(region, cycle);
                logging::debug(DataSource::Nwm, Some(region), &format!("trying {}", url));

                match fetch_object(client, &url) {
                    Ok(Some(text)) => {
                        logging::info(
                            DataSource::Nwm,
                            Some(region),
                            &format!("downloaded {} ({} bytes)", name, text.len()),
                        );
                        fetched.push(FetchedCycle {
                            text,
                            source_name: name,
                            date: date.format("%Y-%m-%d").to_string(),
                            region: region.clone(),
                            cycle: cycle.clone(),
                        });
                        break 'region;
                    }
                    Ok(None) => {
                        logging::debug(
                            DataSource::Nwm,
                            Some(region),
                            &format!("object not found: {}", name),
                        );
                    }
                    Err(e) => {
                        logging::log_nwm_failure(&name, "fetch", e.as_ref());
                    }
                }
            }
        }
    }

    fetched
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
