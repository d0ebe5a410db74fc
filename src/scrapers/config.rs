//! Registry page layout and wait budgets.
//!
//! These structs describe where things live on the registry's pages and how
//! long each bounded wait may take. Both are configurable from the config
//! file so selector drift on the site does not require a rebuild.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Page-wide selectors of the registry, shared by every category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryLayout {
    /// Landing page that hosts the category navigation.
    pub base_url: String,
    /// Free-text search field inside a category form.
    pub search_field: String,
    /// Start-year field inside a category form.
    pub start_year_field: String,
    /// End-year field inside a category form.
    pub end_year_field: String,
    /// Submit button inside a category form.
    pub search_button: String,
    /// Loading overlay shown while results are fetched.
    pub loader: String,
    /// Result table.
    pub result_table: String,
    /// Row selector within the result table. The first match is the header.
    pub result_row: String,
    /// Document link within a result row.
    pub row_link: String,
    /// Placeholder cell the table renders when a search has no matches.
    pub empty_row: String,
    /// "Next page" pagination control.
    pub next_button: String,
    /// Class the next control carries on the last page.
    pub disabled_class: String,
    /// Frame on the detail page hosting the document body.
    pub detail_frame: String,
}

impl Default for RegistryLayout {
    fn default() -> Self {
        Self {
            base_url: "https://www.mevzuat.gov.tr".to_string(),
            search_field: "#AranacakIfade".to_string(),
            start_year_field: "#BaslangicTarihi".to_string(),
            end_year_field: "#BitisTarihi".to_string(),
            search_button: "#btnSearch".to_string(),
            loader: "#loaderContainer".to_string(),
            result_table: "#DataTables_Table_0".to_string(),
            result_row: "tr".to_string(),
            row_link: "td a".to_string(),
            empty_row: "td.dataTables_empty".to_string(),
            next_button: "li.paginate_button.page-item.active + li.paginate_button.page-item"
                .to_string(),
            disabled_class: "disabled".to_string(),
            detail_frame: "#mevzuatDetayIframe".to_string(),
        }
    }
}

/// Timeouts as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upper bound for any single wait (form, loader, table, frame).
    pub wait_secs: u64,
    /// Pause after a search submission before reading results.
    pub search_settle_ms: u64,
    /// Pause after moving to the next page before reading results.
    pub page_settle_ms: u64,
    /// Interval between polls while waiting for a page condition.
    pub poll_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            wait_secs: 20,
            search_settle_ms: 10_000,
            page_settle_ms: 3_000,
            poll_interval_ms: 250,
        }
    }
}

impl TimeoutConfig {
    pub fn to_waits(&self) -> WaitTimeouts {
        WaitTimeouts {
            wait: Duration::from_secs(self.wait_secs),
            search_settle: Duration::from_millis(self.search_settle_ms),
            page_settle: Duration::from_millis(self.page_settle_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
        }
    }
}

/// Resolved wait budgets used by the walker and extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitTimeouts {
    pub wait: Duration,
    pub search_settle: Duration,
    pub page_settle: Duration,
    pub poll_interval: Duration,
}

impl Default for WaitTimeouts {
    fn default() -> Self {
        TimeoutConfig::default().to_waits()
    }
}

impl WaitTimeouts {
    /// Short budgets with no settle pauses, for scripted sessions.
    pub fn immediate(wait: Duration) -> Self {
        Self {
            wait,
            search_settle: Duration::ZERO,
            page_settle: Duration::ZERO,
            poll_interval: Duration::from_millis(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_layout_keeps_defaults() {
        let layout: RegistryLayout =
            toml::from_str("detail_frame = \"#frame2\"").expect("layout parses");
        assert_eq!(layout.detail_frame, "#frame2");
        assert_eq!(layout.result_table, "#DataTables_Table_0");
    }

    #[test]
    fn test_timeouts_to_waits() {
        let waits = TimeoutConfig {
            wait_secs: 5,
            search_settle_ms: 0,
            page_settle_ms: 1500,
            poll_interval_ms: 0,
        }
        .to_waits();
        assert_eq!(waits.wait, Duration::from_secs(5));
        assert_eq!(waits.page_settle, Duration::from_millis(1500));
        assert_eq!(waits.poll_interval, Duration::from_millis(10));
    }
}
