//! Mapping between wall-clock timestamps and discrete simulation steps.

use chrono::{NaiveDateTime, TimeDelta};

use crate::error::{Error, Result};

/// Format of every timestamp in a scenario (`2012-01-01 00:00:00`).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses a scenario timestamp.
///
/// # Errors
///
/// Returns [`Error::SchemaValidation`] for `field` if `value` does not match
/// [`TIMESTAMP_FORMAT`].
pub fn parse_timestamp(field: &str, value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|e| {
        Error::schema(
            field,
            format!("\"{value}\" is not a `YYYY-MM-DD HH:MM:SS` timestamp ({e})"),
        )
    })
}

/// Formats a timestamp the way scenarios write them.
pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Number of whole steps of `resolution` seconds between `start` and `end`.
///
/// A trailing partial step is dropped.
///
/// # Errors
///
/// Returns [`Error::InvalidTimeRange`] if `end` is not after `start`, if
/// `resolution` is zero, or if the window holds no whole step.
pub fn step_count(start: NaiveDateTime, end: NaiveDateTime, resolution: u64) -> Result<u64> {
    if resolution == 0 {
        return Err(Error::InvalidTimeRange(
            "time_resolution must be > 0".to_string(),
        ));
    }
    if end <= start {
        return Err(Error::InvalidTimeRange(format!(
            "end_time {} is not after start_time {}",
            format_timestamp(end),
            format_timestamp(start)
        )));
    }
    let elapsed = (end - start).num_seconds().unsigned_abs();
    match elapsed / resolution {
        0 => Err(Error::InvalidTimeRange(format!(
            "{elapsed} s between start_time and end_time is shorter than one {resolution} s step"
        ))),
        steps => Ok(steps),
    }
}

/// Converts simulation steps to timestamps for a fixed start and resolution.
///
/// # Examples
///
/// ```
/// use illuminator::sim::clock::{SimClock, parse_timestamp};
///
/// let start = parse_timestamp("start", "2012-01-01 00:00:00").unwrap();
/// let clock = SimClock::new(start, 900);
/// assert_eq!(clock.label(4), "2012-01-01 01:00:00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimClock {
    start: NaiveDateTime,
    /// Seconds per step.
    resolution: u64,
}

impl SimClock {
    pub fn new(start: NaiveDateTime, resolution: u64) -> Self {
        Self { start, resolution }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn resolution(&self) -> u64 {
        self.resolution
    }

    /// Duration of one step in hours.
    pub fn dt_hours(&self) -> f64 {
        self.resolution as f64 / 3600.0
    }

    /// Timestamp of `step`, or `None` if it does not fit the calendar.
    pub fn timestamp_at(&self, step: u64) -> Option<NaiveDateTime> {
        let secs = i64::try_from(step.checked_mul(self.resolution)?).ok()?;
        self.start.checked_add_signed(TimeDelta::try_seconds(secs)?)
    }

    /// Formatted timestamp of `step`; falls back to the raw step number.
    pub fn label(&self, step: u64) -> String {
        self.timestamp_at(step)
            .map(format_timestamp)
            .unwrap_or_else(|| step.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp("t", s).expect("valid timestamp")
    }

    #[test]
    fn one_hour_at_fifteen_minutes_is_four_steps() {
        let n = step_count(ts("2012-01-01 00:00:00"), ts("2012-01-01 01:00:00"), 900);
        assert_eq!(n.ok(), Some(4));
    }

    #[test]
    fn partial_step_is_truncated() {
        let n = step_count(ts("2012-01-01 00:00:00"), ts("2012-01-01 00:29:59"), 900);
        assert_eq!(n.ok(), Some(1));
    }

    #[test]
    fn equal_or_reversed_range_fails() {
        let a = ts("2012-01-01 00:00:00");
        let b = ts("2011-12-31 23:00:00");
        assert!(matches!(step_count(a, a, 900), Err(Error::InvalidTimeRange(_))));
        assert!(matches!(step_count(a, b, 900), Err(Error::InvalidTimeRange(_))));
    }

    #[test]
    fn window_shorter_than_one_step_fails() {
        let n = step_count(ts("2012-01-01 00:00:00"), ts("2012-01-01 00:14:59"), 900);
        assert!(matches!(n, Err(Error::InvalidTimeRange(_))));
    }

    #[test]
    fn malformed_timestamp_names_field() {
        let err = parse_timestamp("scenario.end_time", "2012-01-01T00:00").expect_err("must fail");
        assert!(matches!(err, Error::SchemaValidation { ref field, .. } if field == "scenario.end_time"));
    }

    #[test]
    fn clock_maps_steps_to_timestamps() {
        let clock = SimClock::new(ts("2012-01-01 00:00:00"), 3600);
        assert_eq!(clock.timestamp_at(25), Some(ts("2012-01-02 01:00:00")));
        assert_eq!(clock.dt_hours(), 1.0);
    }
}
