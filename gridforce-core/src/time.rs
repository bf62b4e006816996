//! Reference-time codec and time-axis ingestion.
//!
//! Time axes in the input data carry a CF-style units attribute such as
//! `days since 2000-01-01`. [`ReferenceTime`] encodes the epoch and the
//! unit and converts between absolute unix timestamps and the small
//! integer offsets used as [`ForcingSeries`](crate::forcing::ForcingSeries)
//! keys. Two reference times are compatible when their units match; the
//! epochs may differ since re-keying goes through absolute time.

use crate::errors::{GridForceError, GridForceResult};
use crate::raster::RasterSource;
use chrono::{DateTime, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unit of a time axis, i.e. the accuracy of its integer offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Seconds represented by one offset step.
    pub fn seconds_per_unit(self) -> i64 {
        match self {
            TimeUnit::Seconds => 1,
            TimeUnit::Minutes => 60,
            TimeUnit::Hours => 60 * 60,
            TimeUnit::Days => 24 * 60 * 60,
        }
    }

    fn from_word(word: &str) -> Option<Self> {
        match word {
            "second" | "seconds" | "s" => Some(TimeUnit::Seconds),
            "minute" | "minutes" | "min" => Some(TimeUnit::Minutes),
            "hour" | "hours" | "h" | "hr" => Some(TimeUnit::Hours),
            "day" | "days" | "d" => Some(TimeUnit::Days),
            _ => None,
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeUnit::Seconds => write!(f, "seconds"),
            TimeUnit::Minutes => write!(f, "minutes"),
            TimeUnit::Hours => write!(f, "hours"),
            TimeUnit::Days => write!(f, "days"),
        }
    }
}

/// Calendar epoch plus unit accuracy for integer time offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceTime {
    /// Epoch as unix seconds (UTC).
    epoch: i64,
    unit: TimeUnit,
}

impl ReferenceTime {
    pub fn new(epoch: i64, unit: TimeUnit) -> Self {
        Self { epoch, unit }
    }

    /// Unix timestamp of January 1st, 00:00 UTC of the given year.
    pub fn year_start(year: i32) -> i64 {
        NaiveDate::from_ymd_opt(year, 1, 1)
            .expect("January 1st exists in every year")
            .and_hms_opt(0, 0, 0)
            .expect("midnight exists on every day")
            .and_utc()
            .timestamp()
    }

    /// Parse a CF-style units attribute, e.g. `days since 2000-01-01` or
    /// `seconds since 1970-01-01 00:00:00`.
    ///
    /// Date components do not need to be zero-padded. Fails with
    /// [`GridForceError::UnknownTimeReference`] for anything else.
    pub fn parse(units: &str) -> GridForceResult<Self> {
        let unknown = || GridForceError::UnknownTimeReference(units.to_string());
        let trimmed = units.trim();
        // byte-preserving lowercase so offsets into the original are valid
        let lower = trimmed.to_ascii_lowercase();
        let split_at = lower.find(" since ").ok_or_else(unknown)?;
        let unit = TimeUnit::from_word(lower[..split_at].trim()).ok_or_else(unknown)?;
        let epoch = parse_datetime(trimmed[split_at + 7..].trim()).ok_or_else(unknown)?;
        Ok(Self { epoch, unit })
    }

    /// Canonical CF units attribute for this reference time, suitable for
    /// the output writer.
    pub fn to_units_attribute(&self) -> String {
        let datetime = DateTime::from_timestamp(self.epoch, 0)
            .expect("epoch is within the representable range")
            .naive_utc();
        match self.unit {
            TimeUnit::Seconds => format!("seconds since {}", datetime.format("%Y-%m-%d %H:%M:%S")),
            TimeUnit::Minutes => format!("minutes since {}", datetime.format("%Y-%m-%d %H:%M")),
            TimeUnit::Hours => format!("hours since {}", datetime.format("%Y-%m-%d %H:00")),
            TimeUnit::Days => format!("days since {}", datetime.format("%Y-%m-%d")),
        }
    }

    /// Offset of an absolute unix timestamp under this reference.
    pub fn reference(&self, time: i64) -> i64 {
        (time - self.epoch) / self.unit.seconds_per_unit()
    }

    /// Absolute unix timestamp of an integer offset.
    pub fn unreference(&self, offset: i64) -> i64 {
        offset * self.unit.seconds_per_unit() + self.epoch
    }

    /// Reference times are compatible when their units match.
    pub fn compatible_with(&self, other: &ReferenceTime) -> bool {
        self.unit == other.unit
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn epoch(&self) -> i64 {
        self.epoch
    }
}

fn parse_datetime(text: &str) -> Option<i64> {
    let text = text.replace('T', " ");
    let mut parts = text.split_whitespace();
    let date = parts.next()?;
    let mut date_parts = date.split('-');
    let year: i32 = date_parts.next()?.parse().ok()?;
    let month: u32 = date_parts.next()?.parse().ok()?;
    let day: u32 = date_parts.next()?.parse().ok()?;
    if date_parts.next().is_some() {
        return None;
    }
    let (hour, minute, second) = match parts.next() {
        Some(time) => {
            let time = time.trim_end_matches('Z');
            let mut time_parts = time.split(':');
            let hour: u32 = time_parts.next()?.parse().ok()?;
            let minute: u32 = time_parts.next().unwrap_or("0").parse().ok()?;
            let second: u32 = match time_parts.next() {
                Some(s) => s.parse::<f64>().ok()? as u32,
                None => 0,
            };
            (hour, minute, second)
        }
        None => (0, 0, 0),
    };
    Some(
        NaiveDate::from_ymd_opt(year, month, day)?
            .and_hms_opt(hour, minute, second)?
            .and_utc()
            .timestamp(),
    )
}

/// Time axis of a hazard dataset: absolute unix timestamps per step plus
/// the reference time they were encoded under.
#[derive(Debug, Clone)]
pub struct TimeAxis {
    reference: ReferenceTime,
    pub times: Vec<i64>,
}

impl TimeAxis {
    pub fn new(times: Vec<i64>, reference: ReferenceTime) -> Self {
        Self { reference, times }
    }

    /// Read the `time` axis and its units attribute from a source.
    ///
    /// `time_shift` is added to the stored offsets before decoding,
    /// shifting the whole axis by whole units.
    pub fn from_source(source: &dyn RasterSource, time_shift: i64) -> GridForceResult<Self> {
        let values = source
            .axis("time")
            .ok_or_else(|| GridForceError::AxisNotFound {
                file: source.label().to_string(),
                axis: "time".to_string(),
            })?;
        let units = source
            .attribute("time", "units")
            .ok_or_else(|| GridForceError::Format {
                file: source.label().to_string(),
                variable: "time".to_string(),
                message: "missing 'units' attribute".to_string(),
            })?;
        let reference = ReferenceTime::parse(&units)?;
        let times = values
            .iter()
            .map(|&value| reference.unreference(value as i64 + time_shift))
            .collect();
        Ok(Self { reference, times })
    }

    pub fn reference(&self) -> ReferenceTime {
        self.reference
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::MemorySource;

    #[test]
    fn parse_days() {
        let reference = ReferenceTime::parse("days since 2000-01-01").unwrap();
        assert_eq!(reference.unit(), TimeUnit::Days);
        assert_eq!(reference.epoch(), ReferenceTime::year_start(2000));
    }

    #[test]
    fn parse_unpadded_date() {
        let reference = ReferenceTime::parse("days since 2000-1-1").unwrap();
        assert_eq!(reference.epoch(), ReferenceTime::year_start(2000));
    }

    #[test]
    fn parse_all_units() {
        for (units, seconds) in [
            ("seconds since 1970-01-01 00:00:00", 1),
            ("minutes since 1970-01-01 00:00", 60),
            ("hours since 1970-01-01 00:00", 3600),
            ("days since 1970-01-01", 86400),
        ] {
            let reference = ReferenceTime::parse(units).unwrap();
            assert_eq!(reference.unit().seconds_per_unit(), seconds);
            assert_eq!(reference.epoch(), 0);
        }
    }

    #[test]
    fn parse_unknown() {
        assert!(matches!(
            ReferenceTime::parse("fortnights since 2000-01-01"),
            Err(GridForceError::UnknownTimeReference(_))
        ));
        assert!(ReferenceTime::parse("days after 2000-01-01").is_err());
        assert!(ReferenceTime::parse("days since yesterday").is_err());
    }

    #[test]
    fn units_attribute_round_trip() {
        for units in [
            "seconds since 2001-02-03 04:05:06",
            "minutes since 2001-02-03 04:05",
            "hours since 2001-02-03 04:00",
            "days since 2001-02-03",
        ] {
            let reference = ReferenceTime::parse(units).unwrap();
            assert_eq!(reference.to_units_attribute(), units);
        }
    }

    #[test]
    fn offset_codec() {
        let reference = ReferenceTime::new(ReferenceTime::year_start(2000), TimeUnit::Days);
        let time = ReferenceTime::year_start(2000) + 5 * 86400;
        assert_eq!(reference.reference(time), 5);
        assert_eq!(reference.unreference(5), time);
    }

    #[test]
    fn compatibility_ignores_epoch() {
        let a = ReferenceTime::new(ReferenceTime::year_start(2000), TimeUnit::Days);
        let b = ReferenceTime::new(ReferenceTime::year_start(1970), TimeUnit::Days);
        let c = ReferenceTime::new(ReferenceTime::year_start(2000), TimeUnit::Hours);
        assert!(a.compatible_with(&b));
        assert!(b.compatible_with(&a));
        assert!(!a.compatible_with(&c));
    }

    #[test]
    fn time_axis_from_source() {
        let source = MemorySource::new("forcing.nc")
            .with_axis("time", vec![0.0, 1.0, 2.0])
            .with_attribute("time", "units", "days since 2000-01-01");
        let axis = TimeAxis::from_source(&source, 0).unwrap();
        assert_eq!(axis.len(), 3);
        let epoch = ReferenceTime::year_start(2000);
        assert_eq!(axis.times, vec![epoch, epoch + 86400, epoch + 2 * 86400]);
    }

    #[test]
    fn time_axis_shift() {
        let source = MemorySource::new("forcing.nc")
            .with_axis("time", vec![0.0, 1.0])
            .with_attribute("time", "units", "days since 2000-01-01");
        let shifted = TimeAxis::from_source(&source, 365).unwrap();
        let epoch = ReferenceTime::year_start(2000);
        assert_eq!(shifted.times[0], epoch + 365 * 86400);
    }

    #[test]
    fn time_axis_requires_units() {
        let source = MemorySource::new("forcing.nc").with_axis("time", vec![0.0]);
        assert!(matches!(
            TimeAxis::from_source(&source, 0),
            Err(GridForceError::Format { .. })
        ));
        let source = MemorySource::new("forcing.nc");
        assert!(matches!(
            TimeAxis::from_source(&source, 0),
            Err(GridForceError::AxisNotFound { .. })
        ));
    }
}
