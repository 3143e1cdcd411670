//! Source timestamp normalization.
//!
//! The normalized frame is the wall clock as written by the source, shifted
//! by a fixed number of hours, with any zone designator dropped.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use serde_json::Value;

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%d %H:%M:%S%.f%z"];

#[derive(Debug, Clone, Copy)]
pub struct TimestampNormalizer {
    offset: Duration,
}

impl TimestampNormalizer {
    #[must_use]
    pub fn new(offset_hours: i64) -> Self {
        Self {
            offset: Duration::hours(offset_hours),
        }
    }

    /// Parse and shift; `None` when the text is not a recognized timestamp.
    #[must_use]
    pub fn normalize(&self, raw: &str) -> Option<NaiveDateTime> {
        parse_wall_clock(raw.trim()).map(|ts| ts + self.offset)
    }

    #[must_use]
    pub fn normalize_value(&self, value: Option<&Value>) -> Option<NaiveDateTime> {
        match value {
            Some(Value::String(s)) => self.normalize(s),
            _ => None,
        }
    }
}

fn parse_wall_clock(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local());
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
