//! Family-agnostic entry point over the per-family clients.

use std::collections::BTreeMap;

use shelfscan_core::{CategoryNode, MarketApi, MarketConfig};
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogResult, CategoryListing};
use crate::client::graphql::{GraphQlClient, GraphQlClientConfig};
use crate::client::rest::RestClient;
use crate::client::ClientSettings;
use crate::error::ScraperError;
use crate::pagination::Progress;
use crate::retry::RetryExecutor;

pub enum MarketClient {
    GraphQl(GraphQlClient),
    Rest(RestClient),
}

impl MarketClient {
    /// Builds the client for `market`, performing the session handshake for
    /// REST markets.
    ///
    /// # Errors
    ///
    /// Configuration errors, or [`ScraperError::Auth`] if a REST handshake fails.
    pub async fn connect(
        market: &MarketConfig,
        settings: &ClientSettings,
        cancel: CancellationToken,
    ) -> Result<Self, ScraperError> {
        let executor = RetryExecutor::new(settings.retry.clone()).with_cancellation(cancel);
        Self::connect_with(market, settings, executor).await
    }

    /// Like [`Self::connect`] with a caller-built executor.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn connect_with(
        market: &MarketConfig,
        settings: &ClientSettings,
        executor: RetryExecutor,
    ) -> Result<Self, ScraperError> {
        tracing::debug!(market = %market.code, family = market.family(), "connecting");
        match &market.api {
            MarketApi::Graphql(g) => {
                let config = GraphQlClientConfig::from_market(g)?;
                Ok(MarketClient::GraphQl(GraphQlClient::new(
                    config,
                    settings.clone(),
                    executor,
                )?))
            }
            MarketApi::Rest(r) => Ok(MarketClient::Rest(
                RestClient::connect(r, settings.clone(), executor).await?,
            )),
        }
    }

    /// # Errors
    ///
    /// Any request or normalization error, after retries.
    pub async fn fetch_categories(&self) -> Result<BTreeMap<String, CategoryNode>, ScraperError> {
        match self {
            MarketClient::GraphQl(c) => c.fetch_categories().await,
            MarketClient::Rest(c) => c.fetch_categories().await,
        }
    }

    /// Collects every product under `scope` (a facet key or category id).
    ///
    /// `page_size` only applies to offset-paginated markets; `with_details`
    /// only to markets whose listings are thinner than their detail records.
    ///
    /// # Errors
    ///
    /// The first non-retryable or exhausted page error.
    pub async fn fetch_category(
        &self,
        scope: &str,
        page_size: Option<u32>,
        with_details: bool,
        on_progress: &mut (dyn FnMut(&Progress) + Send),
    ) -> Result<CategoryListing, ScraperError> {
        match self {
            MarketClient::GraphQl(c) => c.fetch_category(scope, page_size, on_progress).await,
            MarketClient::Rest(c) => {
                let category = Some(scope).filter(|s| !s.is_empty());
                c.fetch_category(category, with_details, on_progress).await
            }
        }
    }

    /// Fetches products by id. Per-id failures land in [`CatalogResult::errors`].
    ///
    /// # Errors
    ///
    /// Only [`ScraperError::Cancelled`].
    pub async fn fetch_catalog(&self, ids: &[String]) -> Result<CatalogResult, ScraperError> {
        match self {
            MarketClient::GraphQl(c) => c.fetch_catalog(ids).await,
            MarketClient::Rest(c) => c.fetch_catalog(ids).await,
        }
    }
}
