//! Shared types for the cdrsync jobs: the normalized call record, table
//! schema descriptors, and the structured error model.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod record;
pub mod schema;
pub mod secret;

pub use error::{ErrorCategory, MergeStage, SyncError};
pub use record::{composite_key, CallRecord, CallType};
pub use schema::{call_table_schema, ColumnSpec, ColumnType, TableSchema};
pub use secret::SensitiveString;
