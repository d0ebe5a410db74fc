//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod categories;
mod crawl;
mod helpers;
mod recover;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};
use crate::models::DedupPolicy;

#[derive(Parser)]
#[command(name = "mevzuat")]
#[command(about = "Crawl full-text legislation from mevzuat.gov.tr into a JSON store")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Search a category and merge every document found into the store
    Crawl {
        /// Category slug or registry label (see `categories`)
        #[arg(short = 'k', long)]
        category: String,
        /// Search term (all documents when omitted)
        #[arg(short, long)]
        search: Option<String>,
        /// First year to include
        #[arg(long)]
        start_year: Option<i32>,
        /// Last year to include
        #[arg(long)]
        end_year: Option<i32>,
        /// Store file (a .json extension is enforced)
        #[arg(short, long, env = "MEVZUAT_STORE")]
        output: Option<PathBuf>,
        /// Append to the store instead of replacing it
        #[arg(short, long)]
        append: bool,
        /// Duplicate handling when appending
        #[arg(long, value_enum)]
        dedup: Option<DedupPolicy>,
        /// Delete a stream log left by an interrupted run instead of refusing to start
        #[arg(long)]
        discard_stale: bool,
    },

    /// Merge a stream log left by an interrupted run into its store
    Recover {
        /// Store file the interrupted run was writing to
        #[arg(short, long, env = "MEVZUAT_STORE")]
        output: Option<PathBuf>,
        /// Replace the store with the recovered records instead of appending
        #[arg(long)]
        replace: bool,
        /// Duplicate handling when appending
        #[arg(long, value_enum)]
        dedup: Option<DedupPolicy>,
    },

    /// List crawlable categories
    Categories,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
    };
    let (settings, _config) = load_settings(options).await?;

    match cli.command {
        Commands::Crawl {
            category,
            search,
            start_year,
            end_year,
            output,
            append,
            dedup,
            discard_stale,
        } => {
            crawl::cmd_crawl(
                &settings,
                crawl::CrawlArgs {
                    category,
                    search,
                    start_year,
                    end_year,
                    output,
                    append,
                    dedup,
                    discard_stale,
                },
            )
            .await
        }
        Commands::Recover {
            output,
            replace,
            dedup,
        } => recover::cmd_recover(&settings, output, replace, dedup).await,
        Commands::Categories => categories::cmd_categories(&settings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crawl_command() {
        let cli = Cli::try_parse_from([
            "mevzuat",
            "-v",
            "crawl",
            "--category",
            "statute",
            "--search",
            "5237",
            "--start-year",
            "2004",
            "--append",
            "--dedup",
            "url",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Crawl {
                category,
                search,
                start_year,
                end_year,
                append,
                dedup,
                discard_stale,
                ..
            } => {
                assert_eq!(category, "statute");
                assert_eq!(search.as_deref(), Some("5237"));
                assert_eq!(start_year, Some(2004));
                assert_eq!(end_year, None);
                assert!(append);
                assert_eq!(dedup, Some(DedupPolicy::Url));
                assert!(!discard_stale);
            }
            _ => panic!("expected crawl"),
        }
    }

    #[test]
    fn test_crawl_requires_category() {
        assert!(Cli::try_parse_from(["mevzuat", "crawl"]).is_err());
    }

    #[test]
    fn test_parse_recover_command() {
        let cli = Cli::try_parse_from(["mevzuat", "recover", "--replace", "-o", "x.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Recover { replace: true, .. }
        ));
    }
}
