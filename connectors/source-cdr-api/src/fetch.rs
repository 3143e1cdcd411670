//! Full download of every page the API reports.

use std::time::Instant;

use cdrsync_types::SyncError;
use tracing::{info, warn};

use crate::client::{CdrApiClient, PageError, RawRecord};

/// Result of walking every page of the API.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    pub records: Vec<RawRecord>,
    /// `total` as reported by page 1.
    pub reported_total: u64,
    pub total_pages: u32,
    pub pages_fetched: u32,
    /// Set when a page after the first failed; the pages before it are kept.
    pub stopped_early: Option<PageError>,
    pub elapsed_secs: f64,
}

impl FetchOutcome {
    /// The source reports no records at all.
    #[must_use]
    pub fn is_source_empty(&self) -> bool {
        self.reported_total == 0
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stopped_early.is_none()
    }
}

/// Download page 1, then pages `2..=totalPages` in order.
///
/// # Errors
///
/// Only a page-1 failure is an error. A later failure ends pagination and is
/// reported through [`FetchOutcome::stopped_early`].
pub async fn fetch_all(client: &CdrApiClient) -> Result<FetchOutcome, SyncError> {
    let started = Instant::now();
    let first = client
        .fetch_page(1)
        .await
        .map_err(PageError::into_sync_error)?;

    let reported_total = first.total;
    let total_pages = first.total_pages.max(1);
    let mut records = first.data;
    let mut pages_fetched = 1;
    let mut stopped_early = None;

    if reported_total == 0 {
        info!(url = client.url(), "CDR API reports no records");
        return Ok(FetchOutcome {
            records,
            reported_total,
            total_pages,
            pages_fetched,
            stopped_early,
            elapsed_secs: started.elapsed().as_secs_f64(),
        });
    }

    info!(
        total = reported_total,
        total_pages, "downloading CDR pages"
    );

    let delay = client.page_delay();
    for page in 2..=total_pages {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match client.fetch_page(page).await {
            Ok(body) => {
                records.extend(body.data);
                pages_fetched += 1;
                if page % 10 == 0 {
                    info!(page, total_pages, records = records.len(), "download progress");
                }
            }
            Err(e) => {
                warn!(
                    page,
                    total_pages,
                    kept = records.len(),
                    error = %e,
                    "page request failed, stopping pagination with partial data"
                );
                stopped_early = Some(e);
                break;
            }
        }
    }

    let elapsed_secs = started.elapsed().as_secs_f64();
    info!(
        records = records.len(),
        pages_fetched,
        total_pages,
        elapsed_secs,
        "download finished"
    );

    Ok(FetchOutcome {
        records,
        reported_total,
        total_pages,
        pages_fetched,
        stopped_early,
        elapsed_secs,
    })
}
