//! Normalized call record and its derived fields.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Canonical text form of `date` values.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Canonical text form of the time-of-day column.
pub const HOUR_FORMAT: &str = "%H:%M:%S";
/// Canonical text form of `timestamp` values.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Direction of a call derived from its channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallType {
    Inbound,
    Outbound,
    Internal,
}

impl CallType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "INBOUND",
            Self::Outbound => "OUTBOUND",
            Self::Internal => "INTERNAL",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call after normalization, ready for the call table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRecord {
    pub call_timestamp: NaiveDateTime,
    pub clid: Option<String>,
    pub src: Option<String>,
    pub dst: Option<String>,
    pub dcontext: Option<String>,
    pub channel: Option<String>,
    pub dstchannel: Option<String>,
    pub lastapp: Option<String>,
    pub duration: i64,
    pub disposition: Option<String>,
    pub uniqueid: String,
    pub calltype: CallType,
}

impl CallRecord {
    #[must_use]
    pub fn call_date(&self) -> NaiveDate {
        self.call_timestamp.date()
    }

    #[must_use]
    pub fn call_hour(&self) -> String {
        self.call_timestamp.format(HOUR_FORMAT).to_string()
    }

    /// Merge pivot: `{call_date}_{uniqueid}`.
    #[must_use]
    pub fn unique_key(&self) -> String {
        composite_key(self.call_date(), &self.uniqueid)
    }

    /// Row in [`call_table_schema`](crate::schema::call_table_schema) order.
    #[must_use]
    pub fn to_row(&self) -> Vec<Option<String>> {
        vec![
            Some(self.call_date().format(DATE_FORMAT).to_string()),
            Some(self.call_hour()),
            Some(self.call_timestamp.format(TIMESTAMP_FORMAT).to_string()),
            self.clid.clone(),
            self.src.clone(),
            self.dst.clone(),
            self.dcontext.clone(),
            self.channel.clone(),
            self.dstchannel.clone(),
            self.lastapp.clone(),
            Some(self.duration.to_string()),
            self.disposition.clone(),
            Some(self.uniqueid.clone()),
            Some(self.calltype.as_str().to_string()),
            Some(self.unique_key()),
        ]
    }
}

/// Build the composite key from a call date and the source id.
#[must_use]
pub fn composite_key(call_date: NaiveDate, uniqueid: &str) -> String {
    format!("{}_{}", call_date.format(DATE_FORMAT), uniqueid)
}
