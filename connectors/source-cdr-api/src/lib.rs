//! Source connector for the paginated CDR REST API.
//!
//! The API exposes `GET {url}?page=N` returning `{ total, totalPages, data }`
//! and has no server-side time filter, so every job downloads all pages and
//! windows the records locally.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod fetch;

pub use client::{CdrApiClient, Page, PageError, RawRecord};
pub use config::{AuthConfig, Config, RequestDefaults};
pub use fetch::{fetch_all, FetchOutcome};
