use std::path::Path;

use anyhow::{Context, Result};
use cdrsync_engine::config;

/// Execute the `check` command: validate config and probe every configured
/// endpoint.
pub async fn execute(config_path: &Path) -> Result<()> {
    let job = config::parse_config(config_path)
        .with_context(|| format!("Failed to parse job config: {}", config_path.display()))?;

    let report = cdrsync_engine::check(&job).await;
    for item in &report.items {
        let status = if item.ok { "OK" } else { "FAILED" };
        println!("{:18} {status}", format!("{}:", item.name));
        if !item.detail.is_empty() {
            println!("  {}", item.detail);
        }
    }

    if report.all_ok() {
        println!("\nAll checks passed.");
        Ok(())
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
