//! Extracted legislation records and their line-delimited stream encoding.
//!
//! Each record travels through the StreamLog as one JSON object per line.
//! Non-ASCII text (Turkish titles and bodies) is written raw, never escaped.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Search term recorded when a crawl ran without a term filter.
pub const UNFILTERED_TERM: &str = "Tümü";

/// One document extracted from the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Detail page URL the text was extracted from.
    pub url: String,
    /// Display title from the result row.
    #[serde(rename = "kanun_adi")]
    pub title: String,
    /// Normalized plain-text body of the document.
    pub full_text: String,
    /// Term that produced this record, or [`UNFILTERED_TERM`].
    pub search_term: String,
}

impl DocumentRecord {
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        full_text: impl Into<String>,
        search_term: Option<&str>,
    ) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            full_text: full_text.into(),
            search_term: search_term.unwrap_or(UNFILTERED_TERM).to_string(),
        }
    }

    /// True when the record came from a crawl without a term filter.
    pub fn is_unfiltered(&self) -> bool {
        self.search_term == UNFILTERED_TERM
    }

    /// Serialize to a single stream line, newline included.
    pub fn to_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one stream line.
    ///
    /// Blank lines and lines that do not decode to a record yield `None`
    /// with a warning, so a single bad line never aborts a stream read.
    pub fn from_line(line: &str, line_no: usize) -> Option<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str(trimmed) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Skipping malformed stream line {}: {}", line_no, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_keeps_raw_unicode() {
        let record = DocumentRecord::new(
            "https://www.mevzuat.gov.tr/mevzuat?MevzuatNo=5237",
            "TÜRK CEZA KANUNU",
            "Amaç Madde 1 – Ceza Kanununun amacı",
            Some("5237"),
        );
        let line = record.to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert!(line.contains("TÜRK CEZA KANUNU"));
        assert!(!line.contains("\\u"));
        assert!(line.contains("\"kanun_adi\""));
    }

    #[test]
    fn test_missing_term_uses_sentinel() {
        let record = DocumentRecord::new("u", "t", "x", None);
        assert_eq!(record.search_term, "Tümü");
        assert!(record.is_unfiltered());
    }

    #[test]
    fn test_from_line_parses_record() {
        let line = r#"{"url":"a","kanun_adi":"X","full_text":"...","search_term":"Tümü"}"#;
        let record = DocumentRecord::from_line(line, 1).unwrap();
        assert_eq!(record.url, "a");
        assert_eq!(record.title, "X");
        assert!(record.is_unfiltered());
    }

    #[test]
    fn test_from_line_skips_garbage() {
        assert!(DocumentRecord::from_line("{\"url\": \"a\", ", 3).is_none());
        assert!(DocumentRecord::from_line("   ", 4).is_none());
        assert!(DocumentRecord::from_line(r#"{"url":"a"}"#, 5).is_none());
    }
}
