//! Crawl request parameters and their validation.

use std::path::{Path, PathBuf};

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::category::Category;

/// Earliest year the registry's year filter accepts.
pub const MIN_YEAR: i32 = 1900;

/// Errors raised while building a crawl request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Full text is not available for \"{0}\"; only metadata is published")]
    FullTextUnsupported(String),

    #[error("Start year {0} is before {MIN_YEAR}")]
    YearTooEarly(i32),

    #[error("End year {end} is after the current year {current}")]
    YearInFuture { end: i32, current: i32 },

    #[error("Start year {start} is after end year {end}")]
    YearRangeInverted { start: i32, end: i32 },
}

/// How a run's records are reconciled into the store.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum MergeMode {
    /// Overwrite the store with this run's records.
    #[default]
    Replace,
    /// Add this run's records after the existing ones.
    Append,
}

/// Duplicate handling when appending to an existing store.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    /// Append every record, even if its URL is already stored.
    #[default]
    None,
    /// Skip records whose URL is already in the store.
    Url,
}

/// Optional year filter. Either bound may be left open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub start: Option<i32>,
    pub end: Option<i32>,
}

impl YearRange {
    pub fn new(start: Option<i32>, end: Option<i32>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    /// Check bounds against a given current year.
    pub fn validate(&self, current_year: i32) -> Result<(), RequestError> {
        if let Some(start) = self.start {
            if start < MIN_YEAR {
                return Err(RequestError::YearTooEarly(start));
            }
        }
        if let Some(end) = self.end {
            if end > current_year {
                return Err(RequestError::YearInFuture {
                    end,
                    current: current_year,
                });
            }
            if end < MIN_YEAR {
                return Err(RequestError::YearTooEarly(end));
            }
        }
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start > end {
                return Err(RequestError::YearRangeInverted { start, end });
            }
        }
        Ok(())
    }
}

/// Immutable parameters for one crawl run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlRequest {
    category: Category,
    search_term: Option<String>,
    years: YearRange,
    store_path: PathBuf,
    mode: MergeMode,
    dedup: DedupPolicy,
}

impl CrawlRequest {
    pub fn builder(category: Category, store_path: impl Into<PathBuf>) -> CrawlRequestBuilder {
        CrawlRequestBuilder {
            category,
            store_path: store_path.into(),
            search_term: None,
            years: YearRange::default(),
            mode: MergeMode::default(),
            dedup: DedupPolicy::default(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search_term.as_deref()
    }

    pub fn years(&self) -> YearRange {
        self.years
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn mode(&self) -> MergeMode {
        self.mode
    }

    pub fn dedup(&self) -> DedupPolicy {
        self.dedup
    }
}

/// Builder that validates a [`CrawlRequest`] once, at construction.
#[derive(Debug, Clone)]
pub struct CrawlRequestBuilder {
    category: Category,
    store_path: PathBuf,
    search_term: Option<String>,
    years: YearRange,
    mode: MergeMode,
    dedup: DedupPolicy,
}

impl CrawlRequestBuilder {
    pub fn search_term(mut self, term: Option<&str>) -> Self {
        self.search_term = term
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        self
    }

    pub fn years(mut self, start: Option<i32>, end: Option<i32>) -> Self {
        self.years = YearRange::new(start, end);
        self
    }

    pub fn mode(mut self, mode: MergeMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn dedup(mut self, dedup: DedupPolicy) -> Self {
        self.dedup = dedup;
        self
    }

    /// Validate against today's year.
    pub fn build(self) -> Result<CrawlRequest, RequestError> {
        self.build_for_year(chrono::Local::now().year())
    }

    pub fn build_for_year(self, current_year: i32) -> Result<CrawlRequest, RequestError> {
        self.years.validate(current_year)?;
        Ok(CrawlRequest {
            category: self.category,
            search_term: self.search_term,
            years: self.years,
            store_path: self.store_path,
            mode: self.mode,
            dedup: self.dedup,
        })
    }
}
