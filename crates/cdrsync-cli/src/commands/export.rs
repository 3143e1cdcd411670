use std::path::{Path, PathBuf};

use anyhow::Result;
use cdrsync_engine::{run_export, ExportOptions};

/// Execute the `export` command.
pub async fn execute(config_path: &Path, dry_run: bool, output: Option<PathBuf>) -> Result<()> {
    let job = super::load(config_path)?;
    let report = run_export(&job, &ExportOptions { dry_run, output }).await?;

    if report.skipped_empty {
        println!("Export of {} skipped: table is empty.", report.table);
        return super::print_summary(&report);
    }

    println!("Export of {} completed.", report.table);
    println!("  Rows:            {}", report.rows);
    println!("  Columns:         {}", report.columns);
    println!("  File size:       {}", super::format_bytes(report.bytes));
    println!("  Read:            {:.2}s", report.read_secs);
    println!("  Write:           {:.2}s", report.write_secs);
    if let Some(path) = &report.output {
        println!("  Local copy:      {path}");
    }
    match &report.publish {
        Some(publish) => {
            println!("  Uploaded:        {}", publish.key);
            println!(
                "    Old versions:  {} found, {} deleted",
                publish.versions_found, publish.versions_deleted
            );
            if publish.version_failures > 0 {
                println!("    Not deleted:   {}", publish.version_failures);
            }
            if publish.listing_failed {
                println!("    Version listing failed; uploaded without purge");
            }
        }
        None if report.dry_run => println!("  Upload:          skipped (dry run)"),
        None => {}
    }
    println!("  Duration:        {:.2}s", report.duration_secs);

    super::print_summary(&report)
}
