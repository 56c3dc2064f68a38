mod output;
mod scrape;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shelfscan_scraper::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shelfscan")]
#[command(about = "Collect product catalogs from retail back-ends")]
struct Cli {
    /// Markets file to use instead of `SHELFSCAN_MARKETS_PATH`.
    #[arg(long, global = true)]
    markets_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List the configured markets.
    Markets,
    /// Write a market's category tree as JSON lines.
    Taxonomy {
        #[arg(long)]
        market: String,
        /// Output file; defaults to `<output-dir>/<market>/categories.jsonl`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Collect every product under one or more facets or categories.
    Category {
        #[arg(long)]
        market: String,
        /// Configured facet name or raw facet/category code. Repeatable.
        #[arg(long = "facet", required = true)]
        facets: Vec<String>,
        /// Items per page for offset-paginated markets.
        #[arg(long)]
        page_size: Option<u32>,
        /// Enrich listing records with a batched detail lookup.
        #[arg(long)]
        details: bool,
        /// Output directory; defaults to `<output-dir>/<market>`.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Cancel outstanding work after this many seconds.
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Fetch products by id.
    Catalog {
        #[arg(long)]
        market: String,
        ids: Vec<String>,
        /// File with one id per line, merged with any positional ids.
        #[arg(long)]
        ids_file: Option<PathBuf>,
        /// Output file; defaults to `<output-dir>/<market>/catalog.jsonl`.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(log_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = shelfscan_core::load_app_config().context("failed to load configuration")?;
    init_tracing(&config.log_level)?;

    let markets_path = cli
        .markets_file
        .clone()
        .unwrap_or_else(|| config.markets_path.clone());
    let markets = shelfscan_core::load_markets(&markets_path)
        .with_context(|| format!("failed to load markets from {}", markets_path.display()))?;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received; cancelling outstanding requests");
                cancel.cancel();
            }
        });
    }

    let ctx = scrape::ScrapeContext {
        config: &config,
        markets: &markets,
        cancel,
    };

    match cli.command {
        Commands::Markets => scrape::run_markets(&markets),
        Commands::Taxonomy { market, output } => {
            scrape::run_taxonomy(&ctx, &market, output).await?;
        }
        Commands::Category {
            market,
            facets,
            page_size,
            details,
            output,
            deadline_secs,
        } => {
            let request = scrape::CategoryRequest {
                market,
                facets,
                page_size,
                details,
                output,
                deadline_secs,
            };
            scrape::run_category(&ctx, request).await?;
        }
        Commands::Catalog {
            market,
            ids,
            ids_file,
            output,
        } => {
            scrape::run_catalog(&ctx, &market, ids, ids_file, output).await?;
        }
    }

    Ok(())
}
