use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use time_tz::{timezones, OffsetDateTimeExt};

use super::error::TimberError;

/// Unit of the timestamps of a logged series. The logging service hands out plain
/// numbers, so the unit is inferred from their magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Nanoseconds,
    Milliseconds,
    Seconds,
}

impl TimeUnit {
    pub fn detect(max_timestamp: f64) -> Result<Self, TimberError> {
        if max_timestamp > 1e18 {
            Ok(Self::Nanoseconds)
        } else if max_timestamp > 1e12 {
            Ok(Self::Milliseconds)
        } else if max_timestamp > 1e9 {
            Ok(Self::Seconds)
        } else {
            Err(TimberError::UnknownUnit(max_timestamp))
        }
    }

    pub fn to_seconds(&self, timestamp: f64) -> f64 {
        match self {
            Self::Nanoseconds => timestamp / 1e9,
            Self::Milliseconds => timestamp / 1e3,
            Self::Seconds => timestamp,
        }
    }

    pub fn to_unix_nanos(&self, timestamp: f64) -> i128 {
        match self {
            Self::Nanoseconds => timestamp as i128,
            Self::Milliseconds => (timestamp * 1e6) as i128,
            Self::Seconds => (timestamp * 1e9) as i128,
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nanoseconds => write!(f, "ns"),
            Self::Milliseconds => write!(f, "ms"),
            Self::Seconds => write!(f, "s"),
        }
    }
}

/// A (time, value) series of one logged variable, sorted by time
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedSeries {
    pub name: String,
    pub samples: Vec<(f64, f64)>,
}

impl LoggedSeries {
    pub fn new(name: &str, mut samples: Vec<(f64, f64)>) -> Self {
        samples.sort_by(|a, b| a.0.total_cmp(&b.0));
        Self {
            name: name.to_string(),
            samples,
        }
    }

    /// Parse a `timestamp,value` export. The header and malformed rows are skipped
    pub fn parse(name: &str, text: &str) -> Self {
        let samples = text
            .lines()
            .skip(1)
            .filter_map(|line| {
                let mut fields = line.trim().split(',');
                let time = fields.next()?.trim().parse::<f64>().ok()?;
                let value = fields.next()?.trim().parse::<f64>().ok()?;
                Some((time, value))
            })
            .collect();
        Self::new(name, samples)
    }

    pub fn read_csv(name: &str, path: &Path) -> Result<Self, TimberError> {
        let reader = BufReader::new(File::open(path)?);
        let mut text = String::new();
        for line in reader.lines() {
            text.push_str(&line?);
            text.push('\n');
        }
        Ok(Self::parse(name, &text))
    }

    pub fn max_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.0)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The sample nearest in time; ties go to the earlier sample
    pub fn nearest(&self, time: f64) -> Option<(f64, f64)> {
        let after = self.samples.partition_point(|s| s.0 <= time);
        let backward = after.checked_sub(1).map(|idx| self.samples[idx]);
        let forward = self.samples.get(after).copied();
        match (backward, forward) {
            (Some(b), Some(f)) => {
                if time - b.0 <= f.0 - time {
                    Some(b)
                } else {
                    Some(f)
                }
            }
            (Some(b), None) => Some(b),
            (None, f) => f,
        }
    }
}

/// One primary sample with the secondary value nearest to it in time
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSample {
    pub time: f64,
    pub primary: f64,
    pub secondary: Option<f64>,
}

/// Attach to each primary sample the secondary sample nearest in time
pub fn align_nearest(primary: &LoggedSeries, secondary: &LoggedSeries) -> Vec<AlignedSample> {
    primary
        .samples
        .iter()
        .map(|(time, value)| AlignedSample {
            time: *time,
            primary: *value,
            secondary: secondary.nearest(*time).map(|s| s.1),
        })
        .collect()
}

/// A row of the aligned output table
#[derive(Debug, Clone, PartialEq)]
pub struct TimberRow {
    pub log_timestamp: f64,
    pub secondary: Option<f64>,
    pub primary: f64,
    pub utc_date: String,
    pub local_date: String,
}

/// Align two series and convert the primary timestamps to seconds and dates.
///
/// The unit is detected from the primary series. Local dates are in the named IANA
/// time zone (e.g. Europe/Zurich), including its daylight saving changes.
pub fn build_rows(
    primary: &LoggedSeries,
    secondary: &LoggedSeries,
    timezone: &str,
) -> Result<(TimeUnit, Vec<TimberRow>), TimberError> {
    let tz = timezones::get_by_name(timezone)
        .ok_or_else(|| TimberError::UnknownTimezone(timezone.to_string()))?;
    let max_time = primary
        .max_time()
        .ok_or_else(|| TimberError::EmptySeries(primary.name.clone()))?;
    let unit = TimeUnit::detect(max_time)?;
    log::info!("Detected time unit: {unit}");

    let mut rows = Vec::with_capacity(primary.samples.len());
    for sample in align_nearest(primary, secondary) {
        let nanos = unit.to_unix_nanos(sample.time);
        let utc = OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map_err(|_| TimberError::BadTimestamp(nanos))?;
        rows.push(TimberRow {
            log_timestamp: unit.to_seconds(sample.time),
            secondary: sample.secondary,
            primary: sample.primary,
            utc_date: utc.format(&Rfc3339)?,
            local_date: utc.to_timezone(tz).format(&Rfc3339)?,
        });
    }
    Ok((unit, rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_unit() {
        assert_eq!(TimeUnit::detect(1.76e18 + 1.0).unwrap(), TimeUnit::Nanoseconds);
        assert_eq!(TimeUnit::detect(1.76e12).unwrap(), TimeUnit::Milliseconds);
        assert_eq!(TimeUnit::detect(1.76e9).unwrap(), TimeUnit::Seconds);
        assert!(matches!(
            TimeUnit::detect(12.0),
            Err(TimberError::UnknownUnit(_))
        ));
    }

    #[test]
    fn test_parse_skips_bad_rows() {
        let series = LoggedSeries::parse("int", "TIME,VALUE\n3,30\nbad,row\n1,10\n\n2\n");
        assert_eq!(series.samples, vec![(1.0, 10.0), (3.0, 30.0)]);
    }

    #[test]
    fn test_nearest() {
        let series = LoggedSeries::new("x", vec![(10.0, 1.0), (20.0, 2.0), (30.0, 3.0)]);
        assert_eq!(series.nearest(0.0), Some((10.0, 1.0)));
        assert_eq!(series.nearest(14.0), Some((10.0, 1.0)));
        // tie goes backward
        assert_eq!(series.nearest(15.0), Some((10.0, 1.0)));
        assert_eq!(series.nearest(16.0), Some((20.0, 2.0)));
        assert_eq!(series.nearest(20.0), Some((20.0, 2.0)));
        assert_eq!(series.nearest(99.0), Some((30.0, 3.0)));
        assert_eq!(LoggedSeries::new("e", vec![]).nearest(1.0), None);
    }

    #[test]
    fn test_build_rows() {
        // 2025-10-17 19:00:00 UTC in ms
        let t = 1_760_727_600_000.0;
        let primary = LoggedSeries::new("SPS.T2:INTENSITY", vec![(t, 5.0)]);
        let secondary = LoggedSeries::new("XTIM", vec![(t - 100.0, 7.0), (t + 5000.0, 8.0)]);
        let (unit, rows) = build_rows(&primary, &secondary, "Europe/Zurich").unwrap();
        assert_eq!(unit, TimeUnit::Milliseconds);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].log_timestamp, 1_760_727_600.0);
        assert_eq!(rows[0].secondary, Some(7.0));
        assert_eq!(rows[0].utc_date, "2025-10-17T19:00:00Z");
        assert_eq!(rows[0].local_date, "2025-10-17T21:00:00+02:00");
    }

    #[test]
    fn test_build_rows_winter_time() {
        // 2025-12-01 12:00:00 UTC in ms, Zurich is on CET
        let t = 1_764_590_400_000.0;
        let primary = LoggedSeries::new("SPS.T2:INTENSITY", vec![(t, 5.0)]);
        let secondary = LoggedSeries::new("XTIM", vec![(t, 1.0)]);
        let (_, rows) = build_rows(&primary, &secondary, "Europe/Zurich").unwrap();
        assert_eq!(rows[0].utc_date, "2025-12-01T12:00:00Z");
        assert_eq!(rows[0].local_date, "2025-12-01T13:00:00+01:00");
    }

    #[test]
    fn test_build_rows_unknown_timezone() {
        let primary = LoggedSeries::new("p", vec![(1_764_590_400_000.0, 5.0)]);
        assert!(matches!(
            build_rows(&primary, &primary, "Europe/Atlantis"),
            Err(TimberError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn test_build_rows_empty_primary() {
        let empty = LoggedSeries::new("p", vec![]);
        assert!(matches!(
            build_rows(&empty, &empty, "Europe/Zurich"),
            Err(TimberError::EmptySeries(_))
        ));
    }
}
