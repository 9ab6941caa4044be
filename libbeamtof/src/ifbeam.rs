use fxhash::FxHashMap;
use std::io::Read;
use std::time::Duration;

use super::config::{AnalysisWindow, Config};
use super::constants::*;
use super::error::IfBeamError;
use super::timestamp::DeviceTimestamps;

/// Anything that can answer an IFBeam variable query with the CSV text of the response.
///
/// The HTTP client is the production implementation; the trait exists so that
/// analyses can run against recorded data.
pub trait BeamDataSource {
    fn fetch(&mut self, var: &str, t0: &str, t1: &str) -> Result<String, IfBeamError>;
}

/// Blocking HTTP client for the IFBeam data service
#[derive(Debug)]
pub struct IfBeamClient {
    agent: ureq::Agent,
    url: String,
    event: String,
}

impl IfBeamClient {
    pub fn new(url: &str, event: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            url: url.to_string(),
            event: event.to_string(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.ifbeam_url,
            &config.event,
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

impl BeamDataSource for IfBeamClient {
    fn fetch(&mut self, var: &str, t0: &str, t1: &str) -> Result<String, IfBeamError> {
        let response = match self
            .agent
            .get(&self.url)
            .query("e", &self.event)
            .query("v", var)
            .query("t0", t0)
            .query("t1", t1)
            .query("f", IFBEAM_FORMAT)
            .call()
        {
            Ok(r) => r,
            Err(ureq::Error::Status(status, _)) => {
                return Err(IfBeamError::BadStatus {
                    var: var.to_string(),
                    status,
                })
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(IfBeamError::Transport {
                    var: var.to_string(),
                    message: t.to_string(),
                })
            }
        };

        // Avoid the size cap of into_string, long windows easily exceed it
        let mut body = String::new();
        response
            .into_reader()
            .read_to_string(&mut body)
            .map_err(|e| IfBeamError::BadBody(var.to_string(), e))?;
        log::debug!(
            "Fetched {} for {var}",
            human_bytes::human_bytes(body.len() as f64)
        );
        Ok(body)
    }
}

/// A source answering from a fixed table of variable name to CSV text, for replaying
/// recorded responses. The time range is ignored.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    responses: FxHashMap<String, String>,
    pub n_requests: usize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var: &str, csv: &str) {
        self.responses.insert(var.to_string(), csv.to_string());
    }
}

impl BeamDataSource for MemorySource {
    fn fetch(&mut self, var: &str, _t0: &str, _t1: &str) -> Result<String, IfBeamError> {
        self.n_requests += 1;
        self.responses
            .get(var)
            .cloned()
            .ok_or_else(|| IfBeamError::MissingVariable(var.to_string()))
    }
}

/// Split a response into the field lists of its data rows, dropping the header and
/// rows too short to be valid
fn data_rows(text: &str) -> impl Iterator<Item = Vec<&str>> {
    text.lines()
        .skip(1)
        .map(|row| row.trim().split(',').collect::<Vec<&str>>())
        .filter(|parts| parts.len() >= CSV_MIN_FIELDS)
}

/// Extract the numeric values (column 5 onward) of an IFBeam CSV response.
///
/// The first line is the header. Rows with less than 4 fields are skipped. Values are
/// taken in order until one fails to parse, at which point the rest of that row is
/// dropped.
pub fn parse_csv_floats(text: &str) -> Vec<f64> {
    let mut values = Vec::new();
    for parts in data_rows(text) {
        for field in parts.iter().skip(CSV_FIRST_VALUE_COLUMN) {
            match field.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => values.push(v),
                _ => break,
            }
        }
    }
    values
}

/// Same as parse_csv_floats, with every value truncated toward zero to an integer
pub fn parse_csv_values(text: &str) -> Vec<i64> {
    parse_csv_floats(text)
        .into_iter()
        .map(|v| v.trunc() as i64)
        .collect()
}

/// Extract the clock column (column 3) of an IFBeam CSV response
pub fn parse_clock_column(text: &str) -> Vec<String> {
    data_rows(text)
        .map(|parts| parts[CSV_CLOCK_COLUMN].trim().to_string())
        .collect()
}

pub fn fetch_values<S: BeamDataSource + ?Sized>(
    source: &mut S,
    var: &str,
    window: &AnalysisWindow,
) -> Result<Vec<i64>, IfBeamError> {
    let text = source.fetch(var, &window.t0, &window.t1)?;
    Ok(parse_csv_values(&text))
}

pub fn fetch_floats<S: BeamDataSource + ?Sized>(
    source: &mut S,
    var: &str,
    window: &AnalysisWindow,
) -> Result<Vec<f64>, IfBeamError> {
    let text = source.fetch(var, &window.t0, &window.t1)?;
    Ok(parse_csv_floats(&text))
}

/// Fetch the seconds[], coarse[], frac[] and timestampCount variables of a TDC device
pub fn fetch_device_timestamps<S: BeamDataSource + ?Sized>(
    source: &mut S,
    prefix: &str,
    window: &AnalysisWindow,
) -> Result<DeviceTimestamps, IfBeamError> {
    let seconds = fetch_values(source, &format!("{prefix}{SECONDS_VAR}"), window)?;
    let coarse = fetch_values(source, &format!("{prefix}{COARSE_VAR}"), window)?;
    let frac = fetch_values(source, &format!("{prefix}{FRAC_VAR}"), window)?;
    let counts = fetch_values(source, &format!("{prefix}{COUNT_VAR}"), window)?;
    log::debug!(
        "{prefix}: {} seconds words, {} coarse, {} frac",
        seconds.len(),
        coarse.len(),
        frac.len()
    );
    Ok(DeviceTimestamps::from_raw(&seconds, &coarse, &frac).with_counts(counts))
}

/// The clock columns of a device's seconds[], coarse[] and frac[] variables
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceClocks {
    pub seconds: Vec<String>,
    pub coarse: Vec<String>,
    pub frac: Vec<String>,
}

impl DeviceClocks {
    /// Number of rows needed to hold all three columns
    pub fn n_rows(&self) -> usize {
        self.seconds.len().max(self.coarse.len()).max(self.frac.len())
    }
}

pub fn fetch_device_clocks<S: BeamDataSource + ?Sized>(
    source: &mut S,
    prefix: &str,
    t0: &str,
    t1: &str,
) -> Result<DeviceClocks, IfBeamError> {
    Ok(DeviceClocks {
        seconds: parse_clock_column(&source.fetch(&format!("{prefix}{SECONDS_VAR}"), t0, t1)?),
        coarse: parse_clock_column(&source.fetch(&format!("{prefix}{COARSE_VAR}"), t0, t1)?),
        frac: parse_clock_column(&source.fetch(&format!("{prefix}{FRAC_VAR}"), t0, t1)?),
    })
}
