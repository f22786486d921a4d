/// SHEF (Standard Hydrologic Exchange Format) decoder.
///
/// Decodes the `.E` (evenly spaced time series) dialect emitted by NWM
/// coastal products such as
/// `nwm.t00z.short_range_coastal.total_water.atlgulf.shef`:
///
/// ```text
/// : NWM TOTAL WATER LEVEL FORECAST
/// .E 8443970 20240601 Z DC202406010045/DH00/HMIFE/DIH1
/// .E1 2.10/ 2.25/ 2.31
/// ```
///
/// Each message declares a station, a base date, a start-of-series time
/// (`DH`), a physical element code, and a fixed interval (`DIH`/`DIN`/
/// `DID`); the slash-separated values that follow, on the header line and
/// on `.E1`/`.E2`... continuation lines, occupy consecutive time slots:
///
///   valid_time(k) = base_date + DH + k * interval
///
/// Error policy: a malformed value token is skipped and recorded as a
/// decode warning; a malformed header aborts only its own message block;
/// non-empty input with no valid header at all is a fatal `Decode` error.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::logging::{self, DataSource};
use crate::model::{ForecastRecord, Parameter, PipelineError, Unit};

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// One physical line of a SHEF product, keyed on its leading token.
///
/// Keeping the classification exhaustive (rather than sniffing tokens
/// inline) makes the malformed-input handling testable on its own.
#[derive(Debug, PartialEq, Eq)]
pub enum ShefLine<'a> {
    /// `.E` / `.ER` — starts a new evenly spaced time series message.
    Header(&'a str),
    /// `.E1`, `.E2`, ... — continues the current message's data string.
    Continuation(&'a str),
    /// `:`-prefixed free text.
    Comment,
    Blank,
    /// Anything else, including message formats this decoder does not
    /// carry (`.A`, `.B`).
    Unsupported(&'a str),
}

/// Classifies a raw line by its leading token.
pub fn classify_line(line: &str) -> ShefLine<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ShefLine::Blank;
    }
    if trimmed.starts_with(':') {
        return ShefLine::Comment;
    }
    if trimmed.starts_with('.') {
        let keyword = trimmed.split_whitespace().next().unwrap_or(trimmed);
        let upper = keyword.to_ascii_uppercase();
        if upper == ".E" || upper == ".ER" {
            return ShefLine::Header(trimmed);
        }
        let tail = upper.strip_prefix(".ER").or_else(|| upper.strip_prefix(".E"));
        if let Some(digits) = tail {
            if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
                return ShefLine::Continuation(trimmed);
            }
        }
    }
    ShefLine::Unsupported(trimmed)
}

// ---------------------------------------------------------------------------
// Message context
// ---------------------------------------------------------------------------

/// Decoded header state for the message block currently being read.
struct MessageContext {
    station: String,
    parameter: Parameter,
    /// base_date + DH, the valid time of slot 0.
    series_start: DateTime<Utc>,
    interval: Duration,
    unit: Unit,
    /// Next time slot to be filled; advances on every value token,
    /// including missing-value sentinels.
    next_slot: i64,
}

impl MessageContext {
    fn slot_time(&self) -> DateTime<Utc> {
        self.series_start + self.interval * self.next_slot as i32
    }
}

/// Decoder output: the records plus the non-fatal issues hit on the way.
#[derive(Debug, Default)]
pub struct ShefDecode {
    pub records: Vec<ForecastRecord>,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decodes one SHEF text blob into forecast records.
///
/// `source_name` is only used for diagnostics (warnings and errors name
/// the file they came from). The decode is a pure function of its input:
/// calling it again on the same blob restarts from the beginning.
pub fn decode(text: &str, source_name: &str) -> Result<ShefDecode, PipelineError> {
    let mut out = ShefDecode::default();
    let mut ctx: Option<MessageContext> = None;
    let mut saw_content = false;
    let mut valid_headers = 0usize;

    for (idx, raw) in text.lines().enumerate() {
        let lineno = idx + 1;
        match classify_line(raw) {
            ShefLine::Blank => continue,
            ShefLine::Comment => {
                saw_content = true;
            }
            ShefLine::Header(line) => {
                saw_content = true;
                match parse_header(line) {
                    Ok((new_ctx, value_tokens)) => {
                        valid_headers += 1;
                        let mut new_ctx = new_ctx;
                        for token in value_tokens {
                            consume_value(&mut new_ctx, &token, source_name, lineno, &mut out);
                        }
                        ctx = Some(new_ctx);
                    }
                    Err(reason) => {
                        warn_line(&mut out, source_name, lineno, &reason);
                        ctx = None;
                    }
                }
            }
            ShefLine::Continuation(line) => {
                saw_content = true;
                match ctx.as_mut() {
                    Some(c) => {
                        for token in data_fields(line) {
                            consume_value(c, &token, source_name, lineno, &mut out);
                        }
                    }
                    None => {
                        warn_line(&mut out, source_name, lineno, "continuation without a preceding valid header");
                    }
                }
            }
            ShefLine::Unsupported(line) => {
                saw_content = true;
                let keyword = line.split_whitespace().next().unwrap_or(line);
                warn_line(
                    &mut out,
                    source_name,
                    lineno,
                    &format!("unsupported SHEF line '{}'", keyword),
                );
                ctx = None;
            }
        }
    }

    if saw_content && valid_headers == 0 {
        return Err(PipelineError::Decode {
            source_name: source_name.to_string(),
            reason: "no valid SHEF header found".to_string(),
        });
    }

    Ok(out)
}

fn warn_line(out: &mut ShefDecode, source_name: &str, lineno: usize, reason: &str) {
    let message = format!("{} line {}: {}", source_name, lineno, reason);
    logging::warn(DataSource::Shef, None, &message);
    out.warnings.push(message);
}

// ---------------------------------------------------------------------------
// Header parsing
// ---------------------------------------------------------------------------

/// Parses a `.E` header line into a message context plus any data values
/// that trail the positional fields on the same line.
fn parse_header(line: &str) -> Result<(MessageContext, Vec<String>), String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err("header has fewer than 4 positional tokens".to_string());
    }

    let keyword = tokens[0].to_ascii_uppercase();
    if keyword != ".E" && keyword != ".ER" {
        return Err(format!("unsupported message type '{}'", tokens[0]));
    }

    let station = tokens[1];
    if station.is_empty() || !station.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("invalid station code '{}'", station));
    }

    let base_date = parse_shef_date(tokens[2])?;

    if !tokens[3].eq_ignore_ascii_case("Z") {
        return Err(format!("unsupported time zone code '{}'", tokens[3]));
    }

    let mut start_offset: Option<Duration> = None;
    let mut interval: Option<Duration> = None;
    let mut unit = Unit::Feet;
    let mut parameter: Option<Parameter> = None;
    let mut values: Vec<String> = Vec::new();

    let rest = tokens[4..].join(" ");
    for field in rest.split('/') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let upper = field.to_ascii_uppercase();

        if let Some(digits) = upper.strip_prefix("DH") {
            start_offset = Some(parse_dh(digits)?);
        } else if let Some(spec) = upper.strip_prefix("DI") {
            interval = Some(parse_di(spec)?);
        } else if upper == "DUS" {
            unit = Unit::Meters;
        } else if upper == "DUE" {
            unit = Unit::Feet;
        } else if let Some(digits) = upper.strip_prefix("DC") {
            // Creation time is diagnostic only; a bad one never sinks the message.
            match parse_dc(digits) {
                Some(created) => logging::debug(
                    DataSource::Shef,
                    Some(station),
                    &format!("model creation time {}", created),
                ),
                None => logging::debug(
                    DataSource::Shef,
                    Some(station),
                    &format!("ignoring unparseable DC field '{}'", field),
                ),
            }
        } else if upper.starts_with('D')
            && upper.chars().nth(1).is_some_and(|c| c.is_ascii_alphabetic())
        {
            logging::debug(
                DataSource::Shef,
                Some(station),
                &format!("skipping unrecognized data definition '{}'", field),
            );
        } else if parameter.is_none()
            && field.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        {
            match Parameter::from_pe_code(field) {
                Some(p) => parameter = Some(p),
                None => return Err(format!("unsupported physical element code '{}'", field)),
            }
        } else {
            values.push(field.to_string());
        }
    }

    let parameter = parameter.ok_or("header declares no physical element code")?;
    let interval = interval.ok_or("header declares no DI interval")?;
    let start_offset = start_offset.unwrap_or_else(Duration::zero);

    let series_start = Utc
        .from_utc_datetime(&base_date.and_time(NaiveTime::MIN))
        + start_offset;

    Ok((
        MessageContext {
            station: station.to_string(),
            parameter,
            series_start,
            interval,
            unit,
            next_slot: 0,
        },
        values,
    ))
}

/// SHEF dates are `ccyymmdd` or `yymmdd`; two-digit years pivot at 70.
fn parse_shef_date(token: &str) -> Result<NaiveDate, String> {
    if !token.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("invalid date token '{}'", token));
    }
    let full = match token.len() {
        8 => token.to_string(),
        6 => {
            let yy: u32 = token[0..2].parse().map_err(|_| "bad year".to_string())?;
            let century = if yy >= 70 { "19" } else { "20" };
            format!("{}{}", century, token)
        }
        _ => return Err(format!("invalid date token '{}'", token)),
    };
    NaiveDate::parse_from_str(&full, "%Y%m%d").map_err(|e| format!("invalid date '{}': {}", token, e))
}

/// `DH` start-of-series: `DHhh` or `DHhhmm`. `DH24` means end of day.
fn parse_dh(digits: &str) -> Result<Duration, String> {
    let (hh, mm) = match digits.len() {
        2 => (digits, "0"),
        4 => (&digits[0..2], &digits[2..4]),
        _ => return Err(format!("invalid DH field 'DH{}'", digits)),
    };
    let hours: i64 = hh.parse().map_err(|_| format!("invalid DH field 'DH{}'", digits))?;
    let minutes: i64 = mm.parse().map_err(|_| format!("invalid DH field 'DH{}'", digits))?;
    if hours > 24 || minutes > 59 || (hours == 24 && minutes != 0) {
        return Err(format!("invalid DH field 'DH{}'", digits));
    }
    Ok(Duration::hours(hours) + Duration::minutes(minutes))
}

/// Interval field: `DIH<n>` hours, `DIN<n>` minutes, `DID<n>` days.
fn parse_di(spec: &str) -> Result<Duration, String> {
    if spec.is_empty() {
        return Err("empty DI interval field".to_string());
    }
    let (unit_char, digits) = spec.split_at(1);
    let n: i64 = digits
        .parse()
        .map_err(|_| format!("invalid interval 'DI{}'", spec))?;
    if n == 0 {
        return Err(format!("zero interval 'DI{}'", spec));
    }
    match unit_char {
        "H" => Ok(Duration::hours(n)),
        "N" => Ok(Duration::minutes(n)),
        "D" => Ok(Duration::days(n)),
        _ => Err(format!("invalid interval 'DI{}'", spec)),
    }
}

/// Creation time: `DCccyymmddhhmm` or `DCyymmddhhmm`. Best-effort only.
fn parse_dc(digits: &str) -> Option<DateTime<Utc>> {
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let full = match digits.len() {
        12 => digits.to_string(),
        10 => {
            let yy: u32 = digits[0..2].parse().ok()?;
            let century = if yy >= 70 { "19" } else { "20" };
            format!("{}{}", century, digits)
        }
        _ => return None,
    };
    let naive = chrono::NaiveDateTime::parse_from_str(&full, "%Y%m%d%H%M").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

// ---------------------------------------------------------------------------
// Data values
// ---------------------------------------------------------------------------

/// Extracts the slash-separated value tokens from a continuation line.
fn data_fields(line: &str) -> Vec<String> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let rest = tokens[1..].join(" ");
    rest.split('/')
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

/// SHEF missing-value sentinels. A sentinel occupies its time slot but
/// produces no record and no warning.
fn is_missing_sentinel(token: &str) -> bool {
    let upper = token.to_ascii_uppercase();
    upper == "M" || upper == "MM" || upper == "+" || upper == "-9999" || upper == "-9999.0"
}

/// Consumes one data token: advances the time slot, emits a record when
/// the token parses, and records a warning when it does not.
fn consume_value(
    ctx: &mut MessageContext,
    token: &str,
    source_name: &str,
    lineno: usize,
    out: &mut ShefDecode,
) {
    let valid_time = ctx.slot_time();
    ctx.next_slot += 1;

    if is_missing_sentinel(token) {
        logging::debug(
            DataSource::Shef,
            Some(&ctx.station),
            &format!("missing value at {}", valid_time),
        );
        return;
    }

    match token.parse::<f64>() {
        Ok(raw) => {
            out.records.push(ForecastRecord {
                station_code: ctx.station.clone(),
                parameter: ctx.parameter,
                valid_time,
                value: ctx.unit.to_feet(raw),
                unit: Unit::Feet,
            });
        }
        Err(_) => {
            warn_line(
                out,
                source_name,
                lineno,
                &format!("malformed value token '{}' for station {}", token, ctx.station),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
