use std::path::Path;

use anyhow::Result;
use cdrsync_engine::{run_call_sync, run_raw_sync, SyncReport, SyncStatus};

/// Execute the `sync-calls` command.
pub async fn execute_calls(config_path: &Path) -> Result<()> {
    let job = super::load(config_path)?;
    let report = run_call_sync(&job).await?;
    print_report(&report);
    super::print_summary(&report)
}

/// Execute the `sync-raw` command.
pub async fn execute_raw(config_path: &Path) -> Result<()> {
    let job = super::load(config_path)?;
    let report = run_raw_sync(&job).await?;
    print_report(&report);
    super::print_summary(&report)
}

fn print_report(report: &SyncReport) {
    let outcome = match &report.status {
        SyncStatus::SourceEmpty => "source empty, nothing to do",
        SyncStatus::NothingNew => "no new records",
        SyncStatus::Merged(_) => "merged",
    };
    println!("{} into {}: {outcome}", report.job, report.table);
    println!(
        "  Window:          > {} (from {})",
        report
            .window
            .watermark
            .map_or_else(|| "none".to_string(), |w| w.to_string()),
        report.window.lower_bound
    );
    println!(
        "  Pages:           {}/{}",
        report.fetch.pages_fetched, report.fetch.total_pages
    );
    if let Some(stopped) = &report.fetch.stopped_early {
        println!("    Stopped early: {stopped}");
    }
    println!("  Records fetched: {}", report.fetch.records);

    let t = &report.transform;
    println!("  Records kept:    {}", t.output);
    if t.outside_window > 0 {
        println!("    Outside window: {}", t.outside_window);
    }
    if t.filtered > 0 {
        println!("    Filtered:       {}", t.filtered);
    }
    if t.bad_timestamp + t.missing_key + t.rejected > 0 {
        println!(
            "    Invalid:        {}",
            t.bad_timestamp + t.missing_key + t.rejected
        );
    }
    if t.duplicates > 0 {
        println!("    Duplicates:     {}", t.duplicates);
    }
    if report.degraded_layout {
        println!("  Layout:          inferred (all text)");
    }
    if report.created_table {
        println!("  Table:           created");
    }
    if !report.migrated_columns.is_empty() {
        println!("  Migrated:        {}", report.migrated_columns.join(", "));
    }
    if !report.swept.is_empty() {
        println!("  Swept staging:   {}", report.swept.len());
    }
    if let SyncStatus::Merged(outcome) = &report.status {
        println!("  Rows merged:     {}", outcome.merged_rows);
        println!("  Table rows:      {}", outcome.table_rows);
        println!(
            "  Load:            {:.3}s ({} chunk(s))",
            outcome.load_secs, outcome.chunks
        );
        println!("  Merge:           {:.3}s", outcome.merge_secs);
    }
    println!("  Fetch:           {:.2}s", report.fetch.duration_secs);
    println!("  Duration:        {:.2}s", report.duration_secs);
}
