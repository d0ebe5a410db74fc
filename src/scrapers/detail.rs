//! Per-row document extraction in an isolated detail context.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use super::browser::{normalize_body_text, BrowsingSession, RowRef, SessionError};
use super::config::WaitTimeouts;
use crate::models::DocumentRecord;

/// Failure confined to a single result row.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("row has no document link")]
    MissingLink,

    #[error("could not open detail view: {0}")]
    Open(#[source] SessionError),

    #[error("could not read document frame: {0}")]
    Frame(#[source] SessionError),
}

/// Run `fut` with an upper bound, mapping expiry to [`SessionError::Timeout`].
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::timeout(what, limit)),
    }
}

/// Opens a row's document, reads the body text, and always releases the
/// detail context before returning.
#[derive(Debug, Clone, Copy)]
pub struct DetailExtractor {
    waits: WaitTimeouts,
}

impl DetailExtractor {
    pub fn new(waits: WaitTimeouts) -> Self {
        Self { waits }
    }

    /// Extract the document behind `row`.
    ///
    /// Focus is handed back to the listing exactly once per call, whatever
    /// the outcome.
    pub async fn extract<S: BrowsingSession>(
        &self,
        session: &mut S,
        row: &RowRef,
        search_term: Option<&str>,
    ) -> Result<DocumentRecord, RowError> {
        let outcome = self.extract_in_detail(session, row, search_term).await;

        if let Err(e) = bounded(self.waits.wait, "listing focus", session.focus_listing()).await {
            warn!("Could not refocus listing after \"{}\": {}", row.title, e);
        }

        outcome
    }

    async fn extract_in_detail<S: BrowsingSession>(
        &self,
        session: &mut S,
        row: &RowRef,
        search_term: Option<&str>,
    ) -> Result<DocumentRecord, RowError> {
        let url = row.href.as_deref().ok_or(RowError::MissingLink)?;

        let detail = bounded(self.waits.wait, "detail context", session.open_detail(url))
            .await
            .map_err(RowError::Open)?;

        // Navigation and frame reads run while the handle is held.
        let html = match bounded(self.waits.wait, "detail page", session.load_detail(&detail)).await {
            Ok(()) => bounded(self.waits.wait, "document frame", session.frame_html(&detail))
                .await
                .map_err(RowError::Frame),
            Err(e) => Err(RowError::Open(e)),
        };

        // The handle moves into close_detail on every path.
        if let Err(e) = bounded(self.waits.wait, "detail close", session.close_detail(detail)).await
        {
            warn!("Failed to close detail view for {}: {}", url, e);
        }

        let html = html?;
        let text = normalize_body_text(&html);
        if text.is_empty() {
            warn!("Document frame for {} has no text", url);
        }
        debug!("Extracted {} chars from {}", text.len(), url);

        Ok(DocumentRecord::new(url, row.title.trim(), text, search_term))
    }
}
