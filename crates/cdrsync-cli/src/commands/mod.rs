pub mod check;
pub mod export;
pub mod sync;

use std::path::Path;

use anyhow::{Context, Result};
use cdrsync_engine::config::{self, JobConfig};

/// Parse and validate a job file.
pub(crate) fn load(path: &Path) -> Result<JobConfig> {
    let job = config::parse_config(path)
        .with_context(|| format!("Failed to parse job config: {}", path.display()))?;
    config::validate_config(&job)?;
    Ok(job)
}

/// Prefix of the machine-readable summary line on stdout.
pub(crate) const SUMMARY_MARKER: &str = "@@CDRSYNC_JSON@@";

pub(crate) fn print_summary<T: serde::Serialize>(report: &T) -> Result<()> {
    let json = serde_json::to_string(report).context("Failed to serialize run summary")?;
    println!("{SUMMARY_MARKER}{json}");
    Ok(())
}

pub(crate) fn format_bytes(bytes: u64) -> String {
    #[allow(clippy::cast_precision_loss)]
    let b = bytes as f64;
    if bytes >= 1_073_741_824 {
        format!("{:.2} GB", b / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.2} MB", b / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.2} KB", b / 1024.0)
    } else {
        format!("{bytes} B")
    }
}
