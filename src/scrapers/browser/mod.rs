//! Interactive browsing session used to drive the registry's search UI.
//!
//! The crawl only ever talks to [`BrowsingSession`]. The chromiumoxide-backed
//! [`ChromeSession`] implements it for real runs; tests script their own.

mod config;
#[cfg(feature = "browser")]
mod chrome;
mod text;

pub use config::{default_headless, BrowserEngineConfig};
#[cfg(feature = "browser")]
pub use chrome::{ChromeSession, DetailPage};
pub use text::normalize_body_text;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{CategoryForm, CrawlRequest};

/// Errors reported by a browsing session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Timed out after {secs}s waiting for {what}")]
    Timeout { what: String, secs: u64 },

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Content frame unavailable: {0}")]
    FrameUnavailable(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser launch failed: {0}")]
    Launch(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Browser support not compiled. Rebuild with: cargo build --features browser")]
    NotCompiled,
}

impl SessionError {
    pub fn timeout(what: impl Into<String>, limit: std::time::Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            secs: limit.as_secs(),
        }
    }
}

/// One row of the result table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRef {
    /// Zero-based position among the page's data rows.
    pub position: usize,
    /// Display title of the row's document link.
    pub title: String,
    /// Absolute detail URL, if the row carries a link.
    pub href: Option<String>,
}

/// Interactive state of the "next page" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    /// No control on the page.
    Absent,
    /// Control present but marked disabled (last page).
    Disabled,
    /// Control can be clicked.
    Enabled,
}

/// A single interactive session: one listing context plus, transiently,
/// one detail context.
///
/// Implementations may block indefinitely while polling for a page
/// condition; callers bound every call with their own timeout.
#[async_trait]
pub trait BrowsingSession: Send {
    /// Handle to an open detail context.
    type Detail: Send + Sync;

    /// Open the category's form, fill in the fields the request carries and
    /// submit it.
    async fn submit_search(
        &mut self,
        form: &CategoryForm,
        request: &CrawlRequest,
    ) -> Result<(), SessionError>;

    /// Wait for the loading indicator to clear.
    async fn wait_until_loaded(&mut self) -> Result<(), SessionError>;

    /// Wait for the result table and read its data rows (header excluded).
    async fn result_rows(&mut self) -> Result<Vec<RowRef>, SessionError>;

    /// Inspect the "next page" control without touching it.
    async fn next_control(&mut self) -> Result<NextControl, SessionError>;

    /// Click the "next page" control.
    async fn click_next(&mut self) -> Result<(), SessionError>;

    /// Open a blank context for `url`, isolated from the listing. Must
    /// return promptly; navigation happens in [`load_detail`](Self::load_detail).
    async fn open_detail(&mut self, url: &str) -> Result<Self::Detail, SessionError>;

    /// Navigate an open detail context to its document.
    async fn load_detail(&mut self, detail: &Self::Detail) -> Result<(), SessionError>;

    /// Wait for the content frame inside a detail context and return the
    /// HTML of its body.
    async fn frame_html(&mut self, detail: &Self::Detail) -> Result<String, SessionError>;

    /// Close a detail context. Consumes the handle.
    async fn close_detail(&mut self, detail: Self::Detail) -> Result<(), SessionError>;

    /// Return focus to the listing context.
    async fn focus_listing(&mut self) -> Result<(), SessionError>;

    /// Tear the session down.
    async fn shutdown(&mut self) -> Result<(), SessionError>;
}
