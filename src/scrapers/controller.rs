//! Crawl session lifecycle: acquire the browser, walk, stream, tear down.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{error, info, warn};

use super::browser::{BrowsingSession, SessionError};
use super::config::WaitTimeouts;
use super::walker::{CancelFlag, CrawlEvent, PageWalker, WalkEnd, WalkReport};
use crate::models::{CategoryTable, CrawlRequest};
use crate::storage::{stream_log_path, StalePolicy, StreamLogWriter};

/// Starts browsing sessions. One session is started per run.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: BrowsingSession;

    async fn start(&self) -> Result<Self::Session, SessionError>;
}

/// Terminal state of a crawl run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Done,
    Fatal,
    Cancelled,
}

impl std::fmt::Display for TerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Done => "done",
            Self::Fatal => "fatal",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Result of one crawl run, before merging.
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub records_emitted: usize,
    pub rows_failed: usize,
    pub pages_visited: usize,
    pub terminal: TerminalState,
    pub error: Option<String>,
    /// StreamLog written by this run, if one was opened.
    pub stream_log: Option<PathBuf>,
}

impl CrawlOutcome {
    fn fatal_before_walk(error: String, stream_log: Option<PathBuf>) -> Self {
        Self {
            records_emitted: 0,
            rows_failed: 0,
            pages_visited: 0,
            terminal: TerminalState::Fatal,
            error: Some(error),
            stream_log,
        }
    }
}

/// Owns a run's browsing session and StreamLog.
pub struct CrawlController<F> {
    factory: F,
    categories: CategoryTable,
    waits: WaitTimeouts,
    stale_policy: StalePolicy,
    cancel: CancelFlag,
    events: Option<UnboundedSender<CrawlEvent>>,
}

impl<F: SessionFactory> CrawlController<F> {
    pub fn new(factory: F, categories: CategoryTable, waits: WaitTimeouts) -> Self {
        Self {
            factory,
            categories,
            waits,
            stale_policy: StalePolicy::Refuse,
            cancel: CancelFlag::new(),
            events: None,
        }
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<CrawlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run one crawl to completion, streaming records to the request's
    /// StreamLog. The session is shut down exactly once.
    pub async fn run_crawl(&self, request: &CrawlRequest) -> CrawlOutcome {
        let category = request.category();
        let Some(form) = self.categories.form(category) else {
            let msg = format!("no search form configured for {}", category);
            error!("{}", msg);
            return CrawlOutcome::fatal_before_walk(msg, None);
        };

        let log_path = stream_log_path(request.store_path());
        let mut writer = match StreamLogWriter::create(&log_path, self.stale_policy).await {
            Ok(writer) => writer,
            Err(e) => {
                error!("Cannot open stream log: {}", e);
                return CrawlOutcome::fatal_before_walk(e.to_string(), None);
            }
        };

        info!(
            "Crawling {} (term: {}, years: {:?}..{:?})",
            category,
            request.search_term().unwrap_or("-"),
            request.years().start,
            request.years().end
        );

        let mut session = match self.factory.start().await {
            Ok(session) => session,
            Err(e) => {
                error!("Browser session failed to start: {}", e);
                if let Err(e) = writer.finish().await {
                    warn!("Failed to close stream log: {}", e);
                }
                return CrawlOutcome::fatal_before_walk(e.to_string(), Some(log_path));
            }
        };

        let walker = PageWalker::new(form, request, self.waits)
            .with_cancel(self.cancel.clone())
            .with_events(self.events.clone());
        let report = walker.run(&mut session, &mut writer).await;

        if let Err(e) = session.shutdown().await {
            warn!("Browser shutdown reported an error: {}", e);
        }

        let mut outcome = outcome_from(report, log_path);
        if let Err(e) = writer.finish().await {
            error!("Failed to flush stream log: {}", e);
            if outcome.error.is_none() {
                outcome.terminal = TerminalState::Fatal;
                outcome.error = Some(e.to_string());
            }
        }

        info!(
            "Crawl finished ({}): {} records, {} failed rows, {} pages",
            outcome.terminal, outcome.records_emitted, outcome.rows_failed, outcome.pages_visited
        );
        outcome
    }
}

fn outcome_from(report: WalkReport, stream_log: PathBuf) -> CrawlOutcome {
    let (terminal, error) = match report.end {
        WalkEnd::Done => (TerminalState::Done, None),
        WalkEnd::Cancelled => (TerminalState::Cancelled, None),
        WalkEnd::Fatal(e) => (TerminalState::Fatal, Some(e.to_string())),
    };
    CrawlOutcome {
        records_emitted: report.emitted,
        rows_failed: report.failed_rows,
        pages_visited: report.pages,
        terminal,
        error,
        stream_log: Some(stream_log),
    }
}

/// Launches a [`ChromeSession`](super::browser::ChromeSession) per run.
#[cfg(feature = "browser")]
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    pub browser: super::browser::BrowserEngineConfig,
    pub layout: super::config::RegistryLayout,
    pub poll_interval: std::time::Duration,
}

#[cfg(feature = "browser")]
#[async_trait]
impl SessionFactory for ChromeLauncher {
    type Session = super::browser::ChromeSession;

    async fn start(&self) -> Result<Self::Session, SessionError> {
        super::browser::ChromeSession::start(&self.browser, self.layout.clone(), self.poll_interval)
            .await
    }
}
