//! Search session state machine: submit, list, extract rows, paginate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use super::browser::{BrowsingSession, NextControl, RowRef, SessionError};
use super::config::WaitTimeouts;
use super::detail::{bounded, DetailExtractor};
use crate::models::{CategoryForm, CrawlRequest, DocumentRecord};
use crate::storage::SinkError;

/// Downstream consumer of emitted records.
#[async_trait]
pub trait RecordSink: Send {
    async fn accept(&mut self, record: DocumentRecord) -> Result<(), SinkError>;
}

#[async_trait]
impl RecordSink for Vec<DocumentRecord> {
    async fn accept(&mut self, record: DocumentRecord) -> Result<(), SinkError> {
        self.push(record);
        Ok(())
    }
}

/// Cooperative cancellation flag shared between a run and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Progress notifications published during a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    SearchSubmitted,
    PageListed { page: usize, rows: usize },
    RecordEmitted { page: usize, position: usize, title: String },
    RowFailed { page: usize, position: usize, title: String, error: String },
}

/// Session-level failure that ends a walk.
#[derive(Debug, Error)]
pub enum WalkError {
    #[error("search form never resolved: {0}")]
    Submit(#[source] SessionError),

    #[error("result table for page {page} never appeared: {source}")]
    Listing {
        page: usize,
        #[source]
        source: SessionError,
    },

    #[error("could not advance past page {page}: {source}")]
    PageAdvance {
        page: usize,
        #[source]
        source: SessionError,
    },

    #[error("could not persist record: {0}")]
    Sink(#[from] SinkError),
}

/// States of a search session.
#[derive(Debug)]
pub enum WalkState {
    Submitting,
    ListingReady,
    ProcessingRow(usize),
    PageAdvance,
    Done,
    Fatal(WalkError),
    Cancelled,
}

impl WalkState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Fatal(_) | Self::Cancelled)
    }
}

/// How a walk ended.
#[derive(Debug)]
pub enum WalkEnd {
    Done,
    Fatal(WalkError),
    Cancelled,
}

/// Counters and terminal state of one walk.
#[derive(Debug)]
pub struct WalkReport {
    pub pages: usize,
    pub rows_seen: usize,
    pub emitted: usize,
    pub failed_rows: usize,
    pub end: WalkEnd,
}

/// Drives one search session over every result page.
pub struct PageWalker<'a> {
    form: &'a CategoryForm,
    request: &'a CrawlRequest,
    waits: WaitTimeouts,
    extractor: DetailExtractor,
    cancel: CancelFlag,
    events: Option<UnboundedSender<CrawlEvent>>,
}

/// Mutable bookkeeping carried across transitions.
#[derive(Default)]
struct Cursor {
    page: usize,
    rows: Vec<RowRef>,
    rows_seen: usize,
    emitted: usize,
    failed_rows: usize,
}

impl<'a> PageWalker<'a> {
    pub fn new(form: &'a CategoryForm, request: &'a CrawlRequest, waits: WaitTimeouts) -> Self {
        Self {
            form,
            request,
            waits,
            extractor: DetailExtractor::new(waits),
            cancel: CancelFlag::new(),
            events: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: Option<UnboundedSender<CrawlEvent>>) -> Self {
        self.events = events;
        self
    }

    fn publish(&self, event: CrawlEvent) {
        if let Some(ref tx) = self.events {
            let _ = tx.send(event);
        }
    }

    /// Walk the session to a terminal state, pushing records into `sink`
    /// in registry order.
    pub async fn run<S, K>(&self, session: &mut S, sink: &mut K) -> WalkReport
    where
        S: BrowsingSession,
        K: RecordSink,
    {
        let mut cursor = Cursor::default();
        let mut state = WalkState::Submitting;

        while !state.is_terminal() {
            debug!("Walk state: {:?}", state);
            state = match state {
                WalkState::Submitting => self.submit(session).await,
                WalkState::ListingReady => self.list(session, &mut cursor).await,
                WalkState::ProcessingRow(i) => self.process_row(session, sink, &mut cursor, i).await,
                WalkState::PageAdvance => self.advance(session, &cursor).await,
                terminal => terminal,
            };
        }

        let end = match state {
            WalkState::Fatal(e) => {
                error!("Crawl stopped: {}", e);
                WalkEnd::Fatal(e)
            }
            WalkState::Cancelled => {
                warn!("Crawl cancelled after {} records", cursor.emitted);
                WalkEnd::Cancelled
            }
            _ => WalkEnd::Done,
        };

        WalkReport {
            pages: cursor.page,
            rows_seen: cursor.rows_seen,
            emitted: cursor.emitted,
            failed_rows: cursor.failed_rows,
            end,
        }
    }

    async fn submit<S: BrowsingSession>(&self, session: &mut S) -> WalkState {
        let submitted = bounded(
            self.waits.wait,
            "search form",
            session.submit_search(self.form, self.request),
        )
        .await;
        if let Err(e) = submitted {
            return WalkState::Fatal(WalkError::Submit(e));
        }

        if let Err(e) = bounded(self.waits.wait, "loading indicator", session.wait_until_loaded()).await {
            return WalkState::Fatal(WalkError::Submit(e));
        }

        self.publish(CrawlEvent::SearchSubmitted);
        settle(self.waits.search_settle).await;
        WalkState::ListingReady
    }

    async fn list<S: BrowsingSession>(&self, session: &mut S, cursor: &mut Cursor) -> WalkState {
        cursor.page += 1;
        let page = cursor.page;

        match bounded(self.waits.wait, "result table", session.result_rows()).await {
            Ok(rows) if rows.is_empty() => {
                info!("Page {} has no results", page);
                cursor.rows.clear();
                WalkState::Done
            }
            Ok(rows) => {
                info!("Page {}: {} rows", page, rows.len());
                self.publish(CrawlEvent::PageListed {
                    page,
                    rows: rows.len(),
                });
                cursor.rows_seen += rows.len();
                cursor.rows = rows;
                WalkState::ProcessingRow(0)
            }
            Err(source) => WalkState::Fatal(WalkError::Listing { page, source }),
        }
    }

    async fn process_row<S, K>(
        &self,
        session: &mut S,
        sink: &mut K,
        cursor: &mut Cursor,
        index: usize,
    ) -> WalkState
    where
        S: BrowsingSession,
        K: RecordSink,
    {
        let Some(row) = cursor.rows.get(index).cloned() else {
            return WalkState::PageAdvance;
        };
        if self.cancel.is_cancelled() {
            return WalkState::Cancelled;
        }

        info!("Processing: {}", row.title);
        match self
            .extractor
            .extract(session, &row, self.request.search_term())
            .await
        {
            Ok(record) => {
                if let Err(e) = sink.accept(record).await {
                    return WalkState::Fatal(WalkError::Sink(e));
                }
                cursor.emitted += 1;
                self.publish(CrawlEvent::RecordEmitted {
                    page: cursor.page,
                    position: row.position,
                    title: row.title,
                });
            }
            Err(e) => {
                warn!("Skipping \"{}\": {}", row.title, e);
                cursor.failed_rows += 1;
                self.publish(CrawlEvent::RowFailed {
                    page: cursor.page,
                    position: row.position,
                    title: row.title,
                    error: e.to_string(),
                });
            }
        }

        WalkState::ProcessingRow(index + 1)
    }

    async fn advance<S: BrowsingSession>(&self, session: &mut S, cursor: &Cursor) -> WalkState {
        if self.cancel.is_cancelled() {
            return WalkState::Cancelled;
        }

        let page = cursor.page;
        let control = match bounded(self.waits.wait, "next page control", session.next_control()).await
        {
            Ok(control) => control,
            Err(e) => {
                warn!("Next page control unreadable on page {}, stopping: {}", page, e);
                return WalkState::Done;
            }
        };

        match control {
            NextControl::Absent | NextControl::Disabled => {
                info!("Last page reached ({})", page);
                WalkState::Done
            }
            NextControl::Enabled => {
                if let Err(source) = bounded(self.waits.wait, "next page click", session.click_next()).await {
                    return WalkState::Fatal(WalkError::PageAdvance { page, source });
                }
                if let Err(source) =
                    bounded(self.waits.wait, "loading indicator", session.wait_until_loaded()).await
                {
                    return WalkState::Fatal(WalkError::PageAdvance { page, source });
                }
                settle(self.waits.page_settle).await;
                WalkState::ListingReady
            }
        }
    }
}

async fn settle(pause: std::time::Duration) {
    if !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }
}
