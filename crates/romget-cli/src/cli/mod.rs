//! CLI for romget.

mod commands;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use romget_core::catalog::{load_listing_file, Catalog};
use romget_core::config::{self, AppConfig};
use std::path::PathBuf;

use commands::{run_config, run_get, run_search};

/// Top-level CLI for romget.
#[derive(Debug, Parser)]
#[command(name = "romget")]
#[command(about = "romget: search a file catalog and download matches in parallel", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

/// Where the catalog comes from and how to filter it.
#[derive(Debug, Args)]
pub struct ListingArgs {
    /// Listing file: one `name<TAB>url` or bare href per line.
    #[arg(long, value_name = "FILE")]
    pub listing: PathBuf,

    /// Base URL that bare hrefs are resolved against.
    #[arg(long, value_name = "URL", conflicts_with = "platform")]
    pub base_url: Option<String>,

    /// Take the base URL from the `[platforms]` table of the config.
    #[arg(long, value_name = "NAME")]
    pub platform: Option<String>,

    /// Preferred region tag, e.g. "USA". Overrides the config.
    #[arg(long)]
    pub region: Option<String>,

    /// Keep only entries with this extension. Overrides the config.
    #[arg(long, value_name = "EXT")]
    pub extension: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Search the catalog and print matching entries.
    Search {
        /// Title to look for (case-insensitive, typo tolerant).
        query: String,

        #[command(flatten)]
        listing: ListingArgs,
    },

    /// Download every title that resolves to exactly one entry.
    Get {
        /// Comma-separated titles, e.g. "tetris, dr mario".
        titles: String,

        #[command(flatten)]
        listing: ListingArgs,

        /// Destination folder. Defaults to `download_dir` from the config.
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,

        /// Run up to N downloads concurrently. Defaults to the config value.
        #[arg(long, value_name = "N")]
        jobs: Option<usize>,

        /// Print task events as JSON lines instead of progress text.
        #[arg(long)]
        json: bool,
    },

    /// Show the config file path and the loaded values.
    Config,
}

impl ListingArgs {
    /// Region from the command line, else from the config.
    pub fn region(&self, cfg: &AppConfig) -> Option<String> {
        self.region.clone().or_else(|| cfg.region.clone())
    }

    pub fn load(&self, cfg: &AppConfig) -> Result<Catalog> {
        let base_url = match (&self.base_url, &self.platform) {
            (Some(url), _) => Some(url.clone()),
            (None, Some(name)) => Some(
                cfg.platforms
                    .get(name)
                    .cloned()
                    .with_context(|| format!("no platform named {name:?} in config"))?,
            ),
            (None, None) => None,
        };
        let extension = self
            .extension
            .as_deref()
            .or(cfg.extension.as_deref())
            .unwrap_or("");
        let catalog = load_listing_file(&self.listing, base_url.as_deref(), extension)
            .with_context(|| format!("loading listing {}", self.listing.display()))?;
        tracing::debug!(entries = catalog.len(), listing = %self.listing.display(), "catalog loaded");
        Ok(catalog)
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Search { query, listing } => {
                let catalog = listing.load(&cfg)?;
                run_search(&catalog, &query, listing.region(&cfg).as_deref())?;
            }
            CliCommand::Get {
                titles,
                listing,
                dest,
                jobs,
                json,
            } => {
                let catalog = listing.load(&cfg)?;
                let dest = dest.unwrap_or_else(|| cfg.download_dir.clone());
                let mut queue_cfg = cfg.queue.clone();
                if let Some(n) = jobs {
                    queue_cfg.max_parallel = n;
                }
                run_get(
                    &catalog,
                    &titles,
                    listing.region(&cfg).as_deref(),
                    &dest,
                    queue_cfg,
                    json,
                )
                .await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
