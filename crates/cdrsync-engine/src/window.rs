//! Watermark-bounded fetch window.
//!
//! The source API cannot filter by time, so every run downloads all pages
//! and keeps only the records this window admits.

use chrono::{Duration, NaiveDateTime, Utc};
use serde::Serialize;

/// Local filter applied to normalized record timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FetchWindow {
    /// Oldest admitted timestamp (inclusive).
    pub lower_bound: NaiveDateTime,
    /// Newest persisted timestamp; admitted records must be strictly newer.
    pub watermark: Option<NaiveDateTime>,
}

impl FetchWindow {
    /// `now - lookback_days` without a watermark, `watermark - overlap_days`
    /// with one.
    #[must_use]
    pub fn new(
        now: NaiveDateTime,
        watermark: Option<NaiveDateTime>,
        lookback_days: i64,
        overlap_days: i64,
    ) -> Self {
        let lower_bound = match watermark {
            Some(w) => w - Duration::days(overlap_days),
            None => now - Duration::days(lookback_days),
        };
        Self {
            lower_bound,
            watermark,
        }
    }

    #[must_use]
    pub fn admits(&self, ts: NaiveDateTime) -> bool {
        ts >= self.lower_bound && self.watermark.map_or(true, |w| ts > w)
    }
}

/// Current wall clock in the normalized frame: UTC shifted by
/// `offset_hours`, without zone.
#[must_use]
pub fn normalized_now(offset_hours: i64) -> NaiveDateTime {
    (Utc::now() + Duration::hours(offset_hours)).naive_utc()
}
