//! Subcommand handlers.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use futures::stream::{self, StreamExt};
use shelfscan_core::{AppConfig, MarketConfig, MarketsFile};
use shelfscan_scraper::{CancellationToken, ClientSettings, MarketClient, Progress};

use crate::output::JsonLinesSink;

pub(crate) struct ScrapeContext<'a> {
    pub(crate) config: &'a AppConfig,
    pub(crate) markets: &'a MarketsFile,
    pub(crate) cancel: CancellationToken,
}

impl ScrapeContext<'_> {
    fn market(&self, code: &str) -> anyhow::Result<&MarketConfig> {
        find_market(self.markets, code)
    }

    fn market_dir(&self, market: &MarketConfig) -> PathBuf {
        self.config.output_dir.join(&market.code)
    }

    async fn connect(&self, market: &MarketConfig) -> anyhow::Result<MarketClient> {
        let settings = ClientSettings::from_app_config(self.config);
        MarketClient::connect(market, &settings, self.cancel.clone())
            .await
            .with_context(|| format!("failed to connect to market {}", market.code))
    }
}

pub(crate) struct CategoryRequest {
    pub(crate) market: String,
    pub(crate) facets: Vec<String>,
    pub(crate) page_size: Option<u32>,
    pub(crate) details: bool,
    pub(crate) output: Option<PathBuf>,
    pub(crate) deadline_secs: Option<u64>,
}

pub(crate) fn find_market<'a>(
    markets: &'a MarketsFile,
    code: &str,
) -> anyhow::Result<&'a MarketConfig> {
    markets.find(code).ok_or_else(|| {
        let known: Vec<&str> = markets.markets.iter().map(|m| m.code.as_str()).collect();
        anyhow::anyhow!("unknown market '{code}'; configured: {}", known.join(", "))
    })
}

pub(crate) fn run_markets(markets: &MarketsFile) {
    for market in &markets.markets {
        println!(
            "{}\t{}\t{}",
            market.code,
            market.family(),
            market.name.as_deref().unwrap_or("-")
        );
    }
}

pub(crate) async fn run_taxonomy(
    ctx: &ScrapeContext<'_>,
    market_code: &str,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let market = ctx.market(market_code)?;
    let client = ctx.connect(market).await?;
    let nodes = client
        .fetch_categories()
        .await
        .with_context(|| format!("taxonomy fetch failed for {}", market.code))?;

    let path = output.unwrap_or_else(|| ctx.market_dir(market).join("categories.jsonl"));
    let written = JsonLinesSink::write_records(&path, nodes.values())?;
    println!("wrote {written} categories to {}", path.display());
    Ok(())
}

/// Output file stem for a facet: anything outside `[A-Za-z0-9_-]` becomes `_`.
fn scope_stem(scope: &str) -> String {
    let stem: String = scope
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "all".to_string()
    } else {
        stem
    }
}

/// Pairs each distinct facet with its own output file name.
///
/// Repeated facets are dropped. Facets whose sanitized names collide get a
/// numeric suffix so concurrent scrapes never share a file.
pub(crate) fn plan_output_files(facets: &[String]) -> Vec<(String, String)> {
    let mut seen_facets = HashSet::new();
    let mut taken = HashSet::new();
    let mut plan = Vec::new();
    for facet in facets {
        if !seen_facets.insert(facet.as_str()) {
            continue;
        }
        let stem = scope_stem(facet);
        let mut candidate = stem.clone();
        let mut n = 2;
        while !taken.insert(candidate.clone()) {
            candidate = format!("{stem}-{n}");
            n += 1;
        }
        plan.push((facet.clone(), format!("{candidate}.jsonl")));
    }
    plan
}

fn spawn_deadline(cancel: CancellationToken, secs: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs(secs)) => {
                tracing::warn!(deadline_secs = secs, "deadline reached; cancelling");
                cancel.cancel();
            }
            () = cancel.cancelled() => {}
        }
    })
}

pub(crate) async fn run_category(
    ctx: &ScrapeContext<'_>,
    request: CategoryRequest,
) -> anyhow::Result<()> {
    let market = ctx.market(&request.market)?;
    let client = ctx.connect(market).await?;
    let out_dir = request
        .output
        .clone()
        .unwrap_or_else(|| ctx.market_dir(market));
    let deadline = request
        .deadline_secs
        .map(|secs| spawn_deadline(ctx.cancel.clone(), secs));

    let concurrency = ctx.config.max_concurrent_scrapes.max(1);
    let plan = plan_output_files(&request.facets);
    let results: Vec<(String, anyhow::Result<usize>)> = stream::iter(plan)
        .map(|(facet, file_name)| {
            let client = &client;
            let path = out_dir.join(file_name);
            let scope = market.resolve_scope(&facet);
            let request = &request;
            async move {
                let result =
                    scrape_one(client, &facet, &scope, request.page_size, request.details, &path)
                        .await;
                (facet, result)
            }
        })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    if let Some(handle) = deadline {
        handle.abort();
    }

    let mut failed = 0usize;
    for (facet, result) in &results {
        match result {
            Ok(written) => println!("{facet}: {written} products"),
            Err(e) => {
                failed += 1;
                tracing::error!(facet = %facet, error = %format!("{e:#}"), "facet scrape failed");
                eprintln!("{facet}: failed: {e:#}");
            }
        }
    }

    if failed > 0 && failed == results.len() {
        anyhow::bail!("every facet failed for market {}", market.code);
    }
    Ok(())
}

async fn scrape_one(
    client: &MarketClient,
    facet: &str,
    scope: &str,
    page_size: Option<u32>,
    details: bool,
    path: &Path,
) -> anyhow::Result<usize> {
    let mut on_progress = |p: &Progress| {
        let total = p
            .total_count
            .map_or_else(|| "?".to_string(), |t| t.to_string());
        eprintln!("[{facet}] page {}: {} of {total}", p.page, p.collected);
    };
    let listing = client
        .fetch_category(scope, page_size, details, &mut on_progress)
        .await?;
    JsonLinesSink::write_records(path, &listing.records)
}

/// Reads one id per line, skipping blanks and `#` comments.
pub(crate) fn parse_ids(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

pub(crate) async fn run_catalog(
    ctx: &ScrapeContext<'_>,
    market_code: &str,
    mut ids: Vec<String>,
    ids_file: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    if let Some(path) = ids_file {
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read ids from {}", path.display()))?;
        ids.extend(parse_ids(&text));
    }
    if ids.is_empty() {
        anyhow::bail!("no product ids given; pass ids or --ids-file");
    }

    let market = ctx.market(market_code)?;
    let client = ctx.connect(market).await?;
    let result = client
        .fetch_catalog(&ids)
        .await
        .with_context(|| format!("catalog fetch failed for {}", market.code))?;

    let path = output.unwrap_or_else(|| ctx.market_dir(market).join("catalog.jsonl"));
    let written = JsonLinesSink::write_records(&path, &result.records)?;
    println!("wrote {written} products to {}", path.display());

    if !result.errors.is_empty() {
        eprintln!("{} ids failed: {}", result.errors.len(), result.errors.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_stem_sanitizes_codes() {
        assert_eq!(scope_stem("fresh-food"), "fresh-food");
        assert_eq!(scope_stem("b;RnJlc2g="), "b_RnJlc2g_");
        assert_eq!(scope_stem(""), "all");
    }

    #[test]
    fn plan_output_files_keeps_colliding_facets_apart() {
        let facets: Vec<String> = ["a;b", "a_b", "a=b", "a_b-2", "a;b"]
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        let plan = plan_output_files(&facets);
        let names: Vec<&str> = plan.iter().map(|(_, name)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["a_b.jsonl", "a_b-2.jsonl", "a_b-3.jsonl", "a_b-2-2.jsonl"]
        );
        assert_eq!(plan[1].0, "a_b");
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn parse_ids_skips_blanks_and_comments() {
        let ids = parse_ids("312\n\n  # header\n 2510 \n");
        assert_eq!(ids, vec!["312", "2510"]);
    }

    #[test]
    fn find_market_lists_known_codes_on_miss() {
        let markets = MarketsFile {
            markets: Vec::new(),
        };
        let err = find_market(&markets, "xx").unwrap_err().to_string();
        assert!(err.contains("unknown market 'xx'"));
    }
}
