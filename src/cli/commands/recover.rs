//! Merge a stream log left behind by an interrupted crawl.

use std::path::PathBuf;

use console::style;

use crate::config::Settings;
use crate::models::{DedupPolicy, MergeMode};
use crate::pipeline::recover;
use crate::storage::MergeReconciler;

use super::helpers::{print_merge, resolve_store};

pub async fn cmd_recover(
    settings: &Settings,
    output: Option<PathBuf>,
    replace: bool,
    dedup: Option<DedupPolicy>,
) -> anyhow::Result<()> {
    let store = resolve_store(settings, output);
    let mode = if replace {
        MergeMode::Replace
    } else {
        MergeMode::Append
    };

    let reconciler = MergeReconciler::new();
    match recover(&reconciler, &store, mode, dedup.unwrap_or(settings.dedup)).await? {
        Some(merge) => print_merge(&store, &merge),
        None => println!(
            "{} No interrupted run found for {}",
            style("!").yellow(),
            style(store.display()).cyan()
        ),
    }
    Ok(())
}
