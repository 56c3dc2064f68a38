//! Generic page-collection loop shared by both API families.
//!
//! A [`PageSource`] knows how to fetch one page for a [`PaginationState`];
//! [`collect_pages`] drives it until the source is exhausted, merging every
//! page into one map keyed by product id.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use shelfscan_core::ProductRecord;

use crate::error::ScraperError;
use crate::normalize::ProductPage;
use crate::retry::RetryExecutor;

/// Maximum number of pages to fetch before returning an error.
/// Guards against a back-end that keeps returning the same token.
pub const DEFAULT_MAX_PAGES: usize = 500;

/// Where the next page request should start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginationState {
    /// Continue while the back-end keeps returning a non-empty token.
    TokenBased { token: Option<String> },
    /// Continue while `page * page_size < total_count`. `page` is 1-based.
    OffsetBased {
        page: u32,
        page_size: u32,
        total_count: Option<u64>,
    },
}

impl PaginationState {
    #[must_use]
    pub fn first_token_page() -> Self {
        PaginationState::TokenBased { token: None }
    }

    #[must_use]
    pub fn first_offset_page(page_size: u32) -> Self {
        PaginationState::OffsetBased {
            page: 1,
            page_size,
            total_count: None,
        }
    }

    /// Token to send with the next request, if any.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        match self {
            PaginationState::TokenBased { token } => token.as_deref(),
            PaginationState::OffsetBased { .. } => None,
        }
    }

    /// `(page, page_size)` to request next, for offset-based sources.
    #[must_use]
    pub fn offset(&self) -> Option<(u32, u32)> {
        match self {
            PaginationState::OffsetBased {
                page, page_size, ..
            } => Some((*page, *page_size)),
            PaginationState::TokenBased { .. } => None,
        }
    }

    /// Whether the source has more pages after the one last recorded.
    ///
    /// A missing total count counts as zero.
    #[must_use]
    pub fn has_more(&self) -> bool {
        match self {
            PaginationState::TokenBased { token } => token.as_deref().is_some_and(|t| !t.is_empty()),
            PaginationState::OffsetBased {
                page,
                page_size,
                total_count,
            } => u64::from(*page) * u64::from(*page_size) < total_count.unwrap_or(0),
        }
    }

    /// Folds a fetched page into the state and advances it.
    ///
    /// Returns `true` if another page should be fetched. A page with zero
    /// items always ends collection.
    pub fn record_page(&mut self, page: &ProductPage) -> bool {
        match self {
            PaginationState::TokenBased { token } => {
                token.clone_from(&page.next_page_token);
            }
            PaginationState::OffsetBased { total_count, .. } => {
                if page.total_count.is_some() {
                    *total_count = page.total_count;
                }
            }
        }

        let more = !page.products.is_empty() && self.has_more();
        if more {
            if let PaginationState::OffsetBased { page, .. } = self {
                *page += 1;
            }
        }
        more
    }
}

/// Fetches a single page. Implementations must not retry; the collector does.
pub trait PageSource: Send + Sync {
    fn fetch_page<'a>(
        &'a self,
        state: &'a PaginationState,
    ) -> BoxFuture<'a, Result<ProductPage, ScraperError>>;
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Pause between consecutive page requests; never applied before the first.
    pub inter_page_delay: Duration,
    pub max_pages: usize,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            inter_page_delay: Duration::ZERO,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Reported after every fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub page: usize,
    /// Items on the page just fetched.
    pub fetched: usize,
    /// Distinct items collected so far.
    pub collected: usize,
    pub total_count: Option<u64>,
    pub next_page_token: Option<String>,
}

/// Fetches pages from `source` until the state reports no more.
///
/// Each page fetch goes through `executor`, so transient failures are retried
/// and cancellation is honoured between attempts. Items with the same id
/// across pages are merged, later pages winning.
///
/// # Errors
///
/// - [`ScraperError::PaginationLimit`] if more than `options.max_pages` pages
///   would be fetched.
/// - [`ScraperError::Cancelled`] if the executor's token fires.
/// - Any non-retryable or exhausted error from the source.
pub async fn collect_pages<S>(
    source: &S,
    initial_state: PaginationState,
    executor: &RetryExecutor,
    options: &CollectOptions,
    on_progress: &mut (dyn FnMut(&Progress) + Send),
) -> Result<BTreeMap<String, ProductRecord>, ScraperError>
where
    S: PageSource + ?Sized,
{
    let mut state = initial_state;
    let mut collected = BTreeMap::new();
    let mut pages = 0usize;

    loop {
        if pages >= options.max_pages {
            return Err(ScraperError::PaginationLimit {
                max_pages: options.max_pages,
            });
        }
        if pages > 0 {
            executor.pause(options.inter_page_delay).await;
        }
        if executor.is_cancelled() {
            return Err(ScraperError::Cancelled);
        }

        let page = executor.run(|| source.fetch_page(&state)).await?;
        pages += 1;

        let fetched = page.products.len();
        let more = state.record_page(&page);
        let next_page_token = page.next_page_token.clone();
        collected.extend(page.products);

        let progress = Progress {
            page: pages,
            fetched,
            collected: collected.len(),
            total_count: match &state {
                PaginationState::OffsetBased { total_count, .. } => *total_count,
                PaginationState::TokenBased { .. } => None,
            },
            next_page_token,
        };
        tracing::info!(
            page = progress.page,
            fetched = progress.fetched,
            collected = progress.collected,
            total = ?progress.total_count,
            "fetched page"
        );
        on_progress(&progress);

        if !more {
            break;
        }
    }

    Ok(collected)
}

#[cfg(test)]
#[path = "pagination_test.rs"]
mod tests;
