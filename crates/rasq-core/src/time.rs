//! Timestamps, validity intervals and calendar-aware time steps.
//!
//! Times are whole seconds since the Unix epoch (UTC). Intervals are
//! half-open: `[t1, t2)`.

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub type Timestamp = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemporalExtent {
    pub t1: Timestamp,
    pub t2: Timestamp,
}

impl TemporalExtent {
    pub fn new(t1: Timestamp, t2: Timestamp) -> Result<Self> {
        if t1 > t2 {
            return Err(Error::Config(format!(
                "temporal extent starts after it ends ({t1} > {t2})"
            )));
        }
        Ok(Self { t1, t2 })
    }

    pub fn duration(&self) -> i64 {
        self.t2 - self.t1
    }

    pub fn contains(&self, t: Timestamp) -> bool {
        self.t1 <= t && t < self.t2
    }

    pub fn overlaps(&self, other: &TemporalExtent) -> bool {
        self.t1 < other.t2 && other.t1 < self.t2
    }

    pub fn intersection(&self, other: &TemporalExtent) -> Option<TemporalExtent> {
        if !self.overlaps(other) {
            return None;
        }
        Some(TemporalExtent {
            t1: self.t1.max(other.t1),
            t2: self.t2.min(other.t2),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    #[serde(alias = "seconds")]
    Second,
    #[serde(alias = "minutes")]
    Minute,
    #[serde(alias = "hours")]
    Hour,
    #[serde(alias = "days")]
    Day,
    #[serde(alias = "months")]
    Month,
    #[serde(alias = "years")]
    Year,
}

impl TimeUnit {
    /// Fixed length in seconds, `None` for calendar units.
    pub fn seconds(self) -> Option<i64> {
        match self {
            TimeUnit::Second => Some(1),
            TimeUnit::Minute => Some(60),
            TimeUnit::Hour => Some(3_600),
            TimeUnit::Day => Some(86_400),
            TimeUnit::Month | TimeUnit::Year => None,
        }
    }
}

fn default_length() -> u32 {
    1
}

/// A time-bucket width such as "3 hours" or "1 month".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeStep {
    pub unit: TimeUnit,
    #[serde(default = "default_length")]
    pub length: u32,
}

impl TimeStep {
    pub const fn new(unit: TimeUnit, length: u32) -> Self {
        Self { unit, length }
    }

    pub fn validate(&self) -> Result<()> {
        if self.length == 0 {
            return Err(Error::Config("time step length must be positive".into()));
        }
        Ok(())
    }

    /// `t` plus one step. Month and year steps follow the calendar and clamp
    /// to the last day of shorter months.
    pub fn advance(&self, t: Timestamp) -> Result<Timestamp> {
        self.validate()?;
        if let Some(secs) = self.unit.seconds() {
            return t
                .checked_add(secs * i64::from(self.length))
                .ok_or_else(|| Error::Config(format!("time step overflows after {t}")));
        }
        let months = match self.unit {
            TimeUnit::Year => self.length.saturating_mul(12),
            _ => self.length,
        };
        let dt = DateTime::<Utc>::from_timestamp(t, 0)
            .ok_or_else(|| Error::Config(format!("timestamp {t} out of calendar range")))?;
        dt.checked_add_months(Months::new(months))
            .map(|d| d.timestamp())
            .ok_or_else(|| Error::Config(format!("time step overflows after {t}")))
    }
}

/// Parse an integer epoch, an RFC 3339 date-time, `YYYY-MM-DDTHH:MM:SS`
/// (taken as UTC) or a bare `YYYY-MM-DD` date.
pub fn parse_timestamp(s: &str) -> Result<Timestamp> {
    let s = s.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Ok(v);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(dt.and_utc().timestamp());
    }
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = d.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp());
        }
    }
    Err(Error::Config(format!("cannot parse '{s}' as a time")))
}

/// Serde helper for timestamp fields written either as epoch seconds or as
/// text accepted by [`parse_timestamp`].
pub fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<Timestamp, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Epoch(i64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Epoch(t) => Ok(t),
        Raw::Text(s) => parse_timestamp(&s).map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn month_steps_follow_the_calendar() {
        let jan31 = parse_timestamp("2021-01-31").unwrap();
        let feb28 = parse_timestamp("2021-02-28").unwrap();
        let step = TimeStep::new(TimeUnit::Month, 1);
        assert_eq!(step.advance(jan31).unwrap(), feb28);

        let year = TimeStep::new(TimeUnit::Year, 1);
        assert_eq!(
            year.advance(parse_timestamp("2020-03-01").unwrap()).unwrap(),
            parse_timestamp("2021-03-01").unwrap()
        );
    }

    #[test]
    fn fixed_steps_are_plain_arithmetic() {
        let step = TimeStep::new(TimeUnit::Hour, 3);
        assert_eq!(step.advance(100).unwrap(), 100 + 3 * 3600);
        assert!(TimeStep::new(TimeUnit::Day, 0).advance(0).is_err());
    }

    #[test]
    fn timestamps_deserialize_from_numbers_and_dates() {
        #[derive(Deserialize)]
        struct Window {
            #[serde(deserialize_with = "deserialize_timestamp")]
            start: Timestamp,
            #[serde(deserialize_with = "deserialize_timestamp")]
            end: Timestamp,
        }
        let w: Window = serde_json::from_str(r#"{"start": 60, "end": "1970-01-02"}"#).unwrap();
        assert_eq!(w.start, 60);
        assert_eq!(w.end, 86_400);
    }

    #[test]
    fn overlap_and_intersection() {
        let a = TemporalExtent::new(0, 10).unwrap();
        let b = TemporalExtent::new(5, 15).unwrap();
        let c = TemporalExtent::new(10, 20).unwrap();
        assert_eq!(a.intersection(&b), Some(TemporalExtent { t1: 5, t2: 10 }));
        assert!(!a.overlaps(&c));
        assert!(TemporalExtent::new(3, 2).is_err());
    }

    #[test]
    fn parses_several_time_formats() {
        assert_eq!(parse_timestamp("86400").unwrap(), 86_400);
        assert_eq!(parse_timestamp("1970-01-02").unwrap(), 86_400);
        assert_eq!(parse_timestamp("1970-01-01T01:00:00Z").unwrap(), 3_600);
        assert_eq!(parse_timestamp("1970-01-01T00:01:00").unwrap(), 60);
        assert!(parse_timestamp("yesterday").is_err());
    }
}
