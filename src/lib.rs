//! mevzuat - full-text legislation crawler for mevzuat.gov.tr.
//!
//! Drives the registry's search UI through a browser, streams every document
//! it finds to an append-only log, and merges that log into a JSON store.

pub mod cli;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod scrapers;
pub mod storage;
