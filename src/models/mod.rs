//! Data models for the legislation crawler.

mod category;
mod record;
mod request;

pub use category::{Category, CategoryForm, CategoryFormOverride, CategoryTable};
pub use record::{DocumentRecord, UNFILTERED_TERM};
pub use request::{
    CrawlRequest, CrawlRequestBuilder, DedupPolicy, MergeMode, RequestError, YearRange, MIN_YEAR,
};
