//! Shared output helpers for CLI commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::Settings;
use crate::storage::{normalize_store_path, MergeSummary};

/// Store path from `--output`, falling back to the configured default.
pub fn resolve_store(settings: &Settings, output: Option<PathBuf>) -> PathBuf {
    match output {
        Some(path) => normalize_store_path(path),
        None => settings.store_path.clone(),
    }
}

/// Green spinner with a message, ticking until finished.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn print_merge(store: &Path, merge: &MergeSummary) {
    println!(
        "{} {} records written to {} ({} in store)",
        style("✓").green(),
        merge.appended,
        style(store.display()).cyan(),
        merge.store_records
    );
    if merge.malformed_lines > 0 {
        println!(
            "  {} {} malformed stream lines skipped",
            style("!").yellow(),
            merge.malformed_lines
        );
    }
    if merge.duplicates_skipped > 0 {
        println!(
            "  {} {} duplicate URLs skipped",
            style("→").dim(),
            merge.duplicates_skipped
        );
    }
    if !merge.stream_log_removed {
        println!(
            "  {} stream log could not be removed; delete it before the next run",
            style("!").yellow()
        );
    }
}
