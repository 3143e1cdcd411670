//! Job orchestration for cdrsync: config loading, record transforms, the
//! fetch window, and the three jobs built on the connector crates.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod orchestrator;
pub mod result;
pub mod transform;
pub mod window;

pub use orchestrator::{check, run_call_sync, run_export, run_raw_sync, ExportOptions};
pub use result::{CheckReport, ExportReport, SyncReport, SyncStatus};
