//! Crawl entry point: run the crawl, then fold its StreamLog into the store.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::models::{CrawlRequest, DedupPolicy, MergeMode};
use crate::scrapers::{CrawlController, CrawlOutcome, SessionFactory, TerminalState};
use crate::storage::{stream_log_path, MergeError, MergeReconciler, MergeSummary, StreamLogWriter};

/// Everything a caller learns about a finished run.
#[derive(Debug, Clone)]
pub struct CompletionSummary {
    pub store_path: PathBuf,
    pub crawl: CrawlOutcome,
    /// Present when the merge ran and succeeded.
    pub merge: Option<MergeSummary>,
    pub merge_error: Option<String>,
}

impl CompletionSummary {
    /// True unless the crawl ended Fatal or the merge failed.
    pub fn is_success(&self) -> bool {
        self.crawl.terminal != TerminalState::Fatal && self.merge_error.is_none()
    }
}

/// Run `request` through `controller` and merge the result into the store.
///
/// The merge runs after Done, Cancelled, and Fatal alike so partial output
/// is kept. A run that failed before emitting anything leaves the store
/// untouched.
pub async fn run_pipeline<F: SessionFactory>(
    controller: &CrawlController<F>,
    reconciler: &MergeReconciler,
    request: &CrawlRequest,
) -> CompletionSummary {
    let store = request.store_path().to_path_buf();
    let crawl = controller.run_crawl(request).await;

    let mut summary = CompletionSummary {
        store_path: store.clone(),
        crawl,
        merge: None,
        merge_error: None,
    };

    let Some(log) = summary.crawl.stream_log.clone() else {
        return summary;
    };

    if summary.crawl.terminal == TerminalState::Fatal && summary.crawl.records_emitted == 0 {
        info!("Nothing was extracted; leaving {} untouched", store.display());
        if let Err(e) = StreamLogWriter::discard(&log).await {
            warn!("Could not remove empty stream log {}: {}", log.display(), e);
        }
        return summary;
    }

    match reconciler
        .merge(&store, &log, request.mode(), request.dedup())
        .await
    {
        Ok(merge) => summary.merge = Some(merge),
        Err(e) => {
            warn!("Merge failed, stream log kept at {}: {}", log.display(), e);
            summary.merge_error = Some(e.to_string());
        }
    }
    summary
}

/// Merge a StreamLog left behind by an interrupted run into `store`.
///
/// Returns `Ok(None)` when there is nothing to recover.
pub async fn recover(
    reconciler: &MergeReconciler,
    store: &Path,
    mode: MergeMode,
    dedup: DedupPolicy,
) -> Result<Option<MergeSummary>, MergeError> {
    let log = stream_log_path(store);
    let exists = tokio::fs::try_exists(&log)
        .await
        .map_err(|source| MergeError::ReadStream {
            path: log.clone(),
            source,
        })?;
    if !exists {
        return Ok(None);
    }

    info!("Recovering {} into {}", log.display(), store.display());
    reconciler.merge(store, &log, mode, dedup).await.map(Some)
}
