//! Registry crawling: browsing sessions, detail extraction, pagination, and
//! the per-run controller that ties them together.

pub mod browser;
pub mod config;
pub mod controller;
pub mod detail;
pub mod walker;

#[cfg(feature = "browser")]
pub use browser::ChromeSession;
pub use browser::{BrowserEngineConfig, BrowsingSession, NextControl, RowRef, SessionError};
pub use config::{RegistryLayout, TimeoutConfig, WaitTimeouts};
#[cfg(feature = "browser")]
pub use controller::ChromeLauncher;
pub use controller::{CrawlController, CrawlOutcome, SessionFactory, TerminalState};
pub use detail::{DetailExtractor, RowError};
pub use walker::{
    CancelFlag, CrawlEvent, PageWalker, RecordSink, WalkEnd, WalkError, WalkReport, WalkState,
};
