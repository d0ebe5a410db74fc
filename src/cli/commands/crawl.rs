//! The crawl command: search, stream, merge, report.

use std::path::PathBuf;

use anyhow::Context;
use console::style;
use indicatif::ProgressBar;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::models::{Category, CrawlRequest, DedupPolicy, MergeMode};
use crate::pipeline::{run_pipeline, CompletionSummary};
use crate::scrapers::{CancelFlag, CrawlController, CrawlEvent, TerminalState};
use crate::storage::{MergeReconciler, StalePolicy};

use super::helpers::{print_merge, resolve_store, spinner};

/// Arguments of `mevzuat crawl`.
pub struct CrawlArgs {
    pub category: String,
    pub search: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub output: Option<PathBuf>,
    pub append: bool,
    pub dedup: Option<DedupPolicy>,
    pub discard_stale: bool,
}

/// Run one crawl and merge it into the store.
pub async fn cmd_crawl(settings: &Settings, args: CrawlArgs) -> anyhow::Result<()> {
    let category: Category = args.category.parse()?;
    let mode = if args.append {
        MergeMode::Append
    } else {
        MergeMode::Replace
    };
    let request = CrawlRequest::builder(category, resolve_store(settings, args.output))
        .search_term(args.search.as_deref())
        .years(args.start_year, args.end_year)
        .mode(mode)
        .dedup(args.dedup.unwrap_or(settings.dedup))
        .build()
        .context("Invalid crawl request")?;

    println!(
        "{} Crawling {} into {}",
        style("→").cyan(),
        style(category.display_name()).bold(),
        style(request.store_path().display()).cyan()
    );

    let summary = crawl_with_browser(settings, &request, args.discard_stale).await?;
    report(&summary)
}

#[cfg(feature = "browser")]
async fn crawl_with_browser(
    settings: &Settings,
    request: &CrawlRequest,
    discard_stale: bool,
) -> anyhow::Result<CompletionSummary> {
    use crate::scrapers::ChromeLauncher;

    let waits = settings.timeouts.to_waits();
    let launcher = ChromeLauncher {
        browser: settings.browser.clone(),
        layout: settings.layout.clone(),
        poll_interval: waits.poll_interval,
    };

    let cancel = CancelFlag::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let stale = if discard_stale {
        StalePolicy::Discard
    } else {
        StalePolicy::Refuse
    };
    let controller = CrawlController::new(launcher, settings.categories.clone(), waits)
        .with_stale_policy(stale)
        .with_cancel(cancel.clone())
        .with_events(tx);

    let pb = spinner("Submitting search...");
    let progress = tokio::spawn(follow_events(rx, pb.clone()));
    let signal = tokio::spawn(cancel_on_ctrl_c(cancel, pb.clone()));

    let summary = run_pipeline(&controller, &MergeReconciler::new(), request).await;

    signal.abort();
    drop(controller);
    let _ = progress.await;
    pb.finish_and_clear();
    Ok(summary)
}

#[cfg(not(feature = "browser"))]
async fn crawl_with_browser(
    _settings: &Settings,
    _request: &CrawlRequest,
    _discard_stale: bool,
) -> anyhow::Result<CompletionSummary> {
    Err(crate::scrapers::SessionError::NotCompiled.into())
}

/// Mirror crawl events onto the spinner until the sender is dropped.
async fn follow_events(mut rx: mpsc::UnboundedReceiver<CrawlEvent>, pb: ProgressBar) {
    let mut page_rows = 0;
    let mut emitted = 0;
    while let Some(event) = rx.recv().await {
        match event {
            CrawlEvent::SearchSubmitted => pb.set_message("Waiting for results..."),
            CrawlEvent::PageListed { page, rows } => {
                page_rows = rows;
                pb.set_message(format!("Page {}: {} rows", page, rows));
            }
            CrawlEvent::RecordEmitted {
                page,
                position,
                title,
            } => {
                emitted += 1;
                pb.set_message(format!(
                    "Page {} [{}/{}] {} ({} saved)",
                    page,
                    position + 1,
                    page_rows,
                    title,
                    emitted
                ));
            }
            CrawlEvent::RowFailed {
                position, title, ..
            } => {
                pb.println(format!(
                    "  {} row {} skipped: {}",
                    style("✗").red(),
                    position + 1,
                    title
                ));
            }
        }
    }
}

async fn cancel_on_ctrl_c(cancel: CancelFlag, pb: ProgressBar) {
    if tokio::signal::ctrl_c().await.is_ok() {
        cancel.cancel();
        pb.set_message("Stopping after the current document...");
    }
}

fn report(summary: &CompletionSummary) -> anyhow::Result<()> {
    let crawl = &summary.crawl;
    let state = match crawl.terminal {
        TerminalState::Done => style("done").green(),
        TerminalState::Cancelled => style("cancelled").yellow(),
        TerminalState::Fatal => style("failed").red(),
    };
    println!(
        "\nCrawl {}: {} records, {} failed rows, {} pages",
        state, crawl.records_emitted, crawl.rows_failed, crawl.pages_visited
    );
    if let Some(ref error) = crawl.error {
        println!("  {} {}", style("✗").red(), error);
    }

    if let Some(ref merge) = summary.merge {
        print_merge(&summary.store_path, merge);
    }
    if let Some(ref error) = summary.merge_error {
        println!("  {} Merge failed: {}", style("✗").red(), error);
        if let Some(ref log) = crawl.stream_log {
            println!(
                "  {} Records are kept in {}; run `mevzuat recover` once the store is writable",
                style("→").dim(),
                log.display()
            );
        }
    }

    if summary.is_success() {
        Ok(())
    } else {
        anyhow::bail!("crawl did not complete")
    }
}
