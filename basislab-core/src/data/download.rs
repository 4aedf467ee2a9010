//! Download orchestrator — walks every day of one or more requests.

use super::loader::ArchiveLoader;
use super::provider::{ArchiveTransport, FetchError, FetchOutcome};
use super::request::ArchiveRequest;
use chrono::NaiveDate;
use tracing::info;

/// Fetch every daily file of `request`, continuing past failures.
pub fn download_all<T: ArchiveTransport>(
    loader: &ArchiveLoader<'_, T>,
    request: &ArchiveRequest,
) -> DownloadSummary {
    let mut summary = DownloadSummary::default();

    for file in request.files() {
        summary.total += 1;
        match loader.ensure_local(file) {
            Ok(FetchOutcome::CacheHit(_)) => summary.cache_hits += 1,
            Ok(FetchOutcome::Downloaded { bytes, .. }) => {
                summary.downloaded += 1;
                summary.bytes += bytes;
            }
            Err(e) if e.is_not_found() => summary.not_found.push(file.date),
            Err(e) => summary.failures.push((file.date, e)),
        }
    }

    info!(
        symbol = request.symbol(),
        total = summary.total,
        cached = summary.cache_hits,
        downloaded = summary.downloaded,
        not_found = summary.not_found.len(),
        failed = summary.failures.len(),
        "download finished"
    );
    summary
}

/// Download several requests in sequence, merging their summaries.
pub fn download_requests<T: ArchiveTransport>(
    loader: &ArchiveLoader<'_, T>,
    requests: &[ArchiveRequest],
) -> DownloadSummary {
    requests
        .iter()
        .map(|request| download_all(loader, request))
        .fold(DownloadSummary::default(), DownloadSummary::merge)
}

/// Outcome counts of a batch download.
#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub total: usize,
    pub cache_hits: usize,
    pub downloaded: usize,
    pub bytes: u64,
    pub not_found: Vec<NaiveDate>,
    pub failures: Vec<(NaiveDate, FetchError)>,
}

impl DownloadSummary {
    /// True when no day failed for a reason other than not being published.
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Days now present in the cache.
    pub fn available(&self) -> usize {
        self.cache_hits + self.downloaded
    }

    fn merge(mut self, other: DownloadSummary) -> Self {
        self.total += other.total;
        self.cache_hits += other.cache_hits;
        self.downloaded += other.downloaded;
        self.bytes += other.bytes;
        self.not_found.extend(other.not_found);
        self.failures.extend(other.failures);
        self
    }
}
