//! Structured error model shared by the connectors and the engine.
//!
//! [`SyncError`] carries a category, a stable machine code, and a message.
//! Construct via the category-specific factory methods.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad classification of a job error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid or missing configuration.
    Config,
    /// Authentication rejected by the source API or object store.
    Auth,
    /// Network failure or non-success HTTP status.
    TransientNetwork,
    /// Database statement or connection failure.
    TransientDb,
    /// Invalid or undecodable data.
    Data,
    /// Destination schema mismatch.
    Schema,
    /// Object storage failure.
    Storage,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Auth => "auth",
            Self::TransientNetwork => "transient_network",
            Self::TransientDb => "transient_db",
            Self::Data => "data",
            Self::Schema => "schema",
            Self::Storage => "storage",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// Step of the staging-and-merge protocol an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStage {
    Sweep,
    Provision,
    Load,
    Converge,
    Cleanup,
}

impl fmt::Display for MergeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sweep => "sweep",
            Self::Provision => "provision",
            Self::Load => "load",
            Self::Converge => "converge",
            Self::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

/// Structured error from a job operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("[{category}] {code}: {message}")]
pub struct SyncError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<MergeStage>,
    /// Whether the staging table was dropped before the error surfaced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staging_dropped: Option<bool>,
}

impl SyncError {
    fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            stage: None,
            staging_dropped: None,
        }
    }

    #[must_use]
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Config, code, message)
    }

    #[must_use]
    pub fn auth(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Auth, code, message)
    }

    #[must_use]
    pub fn transient_network(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TransientNetwork, code, message)
    }

    #[must_use]
    pub fn transient_db(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::TransientDb, code, message)
    }

    #[must_use]
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Data, code, message)
    }

    #[must_use]
    pub fn schema(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Schema, code, message)
    }

    #[must_use]
    pub fn storage(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Storage, code, message)
    }

    #[must_use]
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Internal, code, message)
    }

    /// Tag the error with the merge step that produced it.
    #[must_use]
    pub fn at_stage(mut self, stage: MergeStage) -> Self {
        self.stage = Some(stage);
        self
    }

    /// Record whether the run's staging table was cleaned up.
    #[must_use]
    pub fn with_staging_dropped(mut self, dropped: bool) -> Self {
        self.staging_dropped = Some(dropped);
        self
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, SyncError>;
