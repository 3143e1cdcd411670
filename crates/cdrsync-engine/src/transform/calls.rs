//! Source record -> [`CallRecord`] pipeline for the call table.

use cdrsync_types::CallRecord;
use source_cdr_api::RawRecord;
use tracing::{debug, warn};

use super::calltype::CallTypeRules;
use super::filter::BusinessFilters;
use super::timestamp::TimestampNormalizer;
use super::value::{coerce_duration, scalar_text};
use super::{dedupe_keep_last, TransformStats};
use crate::window::FetchWindow;

/// Source field carrying the call start time.
pub const CALLDATE_FIELD: &str = "calldate";
/// Source field carrying the source-native call id.
pub const UNIQUEID_FIELD: &str = "uniqueid";

pub struct CallTransform<'a> {
    pub normalizer: TimestampNormalizer,
    pub filters: &'a BusinessFilters,
    pub rules: &'a CallTypeRules,
}

fn text(record: &RawRecord, field: &str) -> Option<String> {
    record.get(field).and_then(scalar_text)
}

impl CallTransform<'_> {
    /// Window, filter, dedupe, and classify a downloaded batch.
    ///
    /// Records keep their source order; for a repeated `uniqueid` the last
    /// occurrence wins.
    #[must_use]
    pub fn apply(&self, records: Vec<RawRecord>, window: &FetchWindow) -> (Vec<CallRecord>, TransformStats) {
        let mut stats = TransformStats {
            input: records.len(),
            ..TransformStats::default()
        };

        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            let Some(ts) = self.normalizer.normalize_value(record.get(CALLDATE_FIELD)) else {
                stats.bad_timestamp += 1;
                continue;
            };
            if !window.admits(ts) {
                stats.outside_window += 1;
                continue;
            }
            if let Some(field) = self.filters.rejection(&record) {
                debug!(field, "record excluded by business filter");
                stats.filtered += 1;
                continue;
            }
            let Some(uniqueid) = text(&record, UNIQUEID_FIELD).filter(|s| !s.trim().is_empty()) else {
                stats.missing_key += 1;
                continue;
            };
            kept.push((uniqueid, ts, record));
        }

        let before = kept.len();
        let kept = dedupe_keep_last(kept, |(id, _, _)| id.clone());
        stats.duplicates = before - kept.len();

        let calls: Vec<CallRecord> = kept
            .into_iter()
            .map(|(uniqueid, ts, record)| self.build(uniqueid, ts, &record))
            .collect();
        stats.output = calls.len();

        if stats.bad_timestamp > 0 {
            warn!(count = stats.bad_timestamp, "dropped records with missing or unparseable calldate");
        }
        if stats.missing_key > 0 {
            warn!(count = stats.missing_key, "dropped records without uniqueid");
        }
        (calls, stats)
    }

    fn build(&self, uniqueid: String, ts: chrono::NaiveDateTime, record: &RawRecord) -> CallRecord {
        let channel = text(record, "channel");
        let dstchannel = text(record, "dstchannel");
        let calltype = self.rules.classify(channel.as_deref(), dstchannel.as_deref());
        CallRecord {
            call_timestamp: ts,
            clid: text(record, "clid"),
            src: text(record, "src"),
            dst: text(record, "dst"),
            dcontext: text(record, "dcontext"),
            channel,
            dstchannel,
            lastapp: text(record, "lastapp"),
            duration: coerce_duration(record.get("duration")),
            disposition: text(record, "disposition"),
            uniqueid,
            calltype,
        }
    }
}
