//! Client for REST-family markets.
//!
//! Requires a session handshake before any API call; the captured cookies and
//! CSRF token are replayed on every request. Listings paginate by opaque
//! token and detail lookups are batched PUTs of id arrays.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, Url};
use serde_json::Value;
use shelfscan_core::{CategoryNode, ProductRecord, RestMarket};

use crate::batch::{fetch_details_batched, DetailSource};
use crate::catalog::{CatalogResult, CategoryListing};
use crate::client::{configured_headers, parse_url, ApiRequest, ClientSettings, EnvelopeKind, RequestClient};
use crate::error::ScraperError;
use crate::normalize::{extract_rest_details, extract_rest_listing, extract_rest_taxonomy, ProductPage};
use crate::pagination::{collect_pages, PageSource, PaginationState, Progress};
use crate::retry::RetryExecutor;
use crate::session::{acquire_session, SessionCredentials, CSRF_HEADER};

pub struct RestClient {
    http: RequestClient,
    listing_url: Url,
    details_url: Url,
    headers: HeaderMap,
    credentials: SessionCredentials,
    settings: ClientSettings,
    executor: RetryExecutor,
}

impl RestClient {
    /// Performs the session handshake against the market's base URL and
    /// builds a client around the captured credentials.
    ///
    /// # Errors
    ///
    /// [`ScraperError::Auth`] if the handshake fails, or a configuration
    /// error from [`Self::with_credentials`].
    pub async fn connect(
        market: &RestMarket,
        settings: ClientSettings,
        executor: RetryExecutor,
    ) -> Result<Self, ScraperError> {
        let credentials = acquire_session(
            &market.base_url,
            &settings.user_agent,
            Duration::from_secs(settings.timeout_secs),
        )
        .await?;
        Self::with_credentials(market, settings, executor, credentials)
    }

    /// Builds a client around already-acquired credentials.
    ///
    /// # Errors
    ///
    /// [`ScraperError::InvalidUrl`] or [`ScraperError::InvalidHeader`] for bad
    /// configuration.
    pub fn with_credentials(
        market: &RestMarket,
        settings: ClientSettings,
        executor: RetryExecutor,
        credentials: SessionCredentials,
    ) -> Result<Self, ScraperError> {
        let base_url = parse_url(&market.base_url)?;
        let join = |path: &str| {
            base_url.join(path).map_err(|e| ScraperError::InvalidUrl {
                url: format!("{}{path}", market.base_url),
                reason: e.to_string(),
            })
        };
        let listing_url = join(&market.listing_path)?;
        let details_url = join(&market.details_path)?;

        let mut headers = configured_headers(
            &[
                ("accept", "application/json; charset=utf-8"),
                ("content-type", "application/json; charset=utf-8"),
            ],
            &market.headers,
        )?;
        if let Some(token) = &credentials.csrf_token {
            let value = HeaderValue::from_str(token).map_err(|e| ScraperError::InvalidHeader {
                name: CSRF_HEADER.to_string(),
                reason: e.to_string(),
            })?;
            headers.insert(CSRF_HEADER, value);
        }

        let http = RequestClient::new(settings.timeout_secs, &settings.user_agent)?;
        Ok(Self {
            http,
            listing_url,
            details_url,
            headers,
            credentials,
            settings,
            executor,
        })
    }

    #[must_use]
    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    fn request(&self, method: Method, url: &Url) -> ApiRequest {
        ApiRequest::new(method, url.clone())
            .headers(self.headers.clone())
            .cookies(self.credentials.cookie_pairs())
    }

    /// Fetches the category tree.
    ///
    /// # Errors
    ///
    /// Any request or normalization error, after retries.
    pub async fn fetch_categories(&self) -> Result<BTreeMap<String, CategoryNode>, ScraperError> {
        let request = self.request(Method::GET, &self.listing_url);
        let envelope = self
            .executor
            .run(|| self.http.call(&request, EnvelopeKind::Rest))
            .await?;
        let nodes = extract_rest_taxonomy(&envelope)?;
        tracing::info!(categories = nodes.len(), "taxonomy fetched");
        Ok(nodes)
    }

    /// Fetches one listing page without retry.
    ///
    /// # Errors
    ///
    /// Any request or normalization error.
    pub async fn fetch_listing_page(
        &self,
        category: Option<&str>,
        page_token: Option<&str>,
    ) -> Result<ProductPage, ScraperError> {
        let mut request = self.request(Method::GET, &self.listing_url);
        if let Some(category) = category {
            request = request.query("category", category);
        }
        if let Some(token) = page_token {
            request = request.query("pageToken", token);
        }
        let envelope = self.http.call(&request, EnvelopeKind::Rest).await?;
        extract_rest_listing(&envelope)
    }

    /// Fetches detail records for one chunk of ids without retry.
    ///
    /// # Errors
    ///
    /// Any request or normalization error.
    pub async fn fetch_detail_chunk(&self, ids: &[String]) -> Result<Vec<ProductRecord>, ScraperError> {
        let body = Value::Array(ids.iter().cloned().map(Value::String).collect());
        let request = self.request(Method::PUT, &self.details_url).json(body);
        let envelope = self.http.call(&request, EnvelopeKind::Rest).await?;
        extract_rest_details(&envelope)
    }

    /// Fetches every product listed under `category` (or the whole catalog
    /// when `None`).
    ///
    /// With `with_details`, listed ids are then looked up in bulk and the
    /// detail records replace the thinner listing records. Ids whose detail
    /// chunk failed keep their listing record.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable or exhausted page error.
    pub async fn fetch_category(
        &self,
        category: Option<&str>,
        with_details: bool,
        on_progress: &mut (dyn FnMut(&Progress) + Send),
    ) -> Result<CategoryListing, ScraperError> {
        tracing::info!(category = category.unwrap_or("<all>"), with_details, "collecting category");
        let source = CategoryPages {
            client: self,
            category,
        };
        let mut items = collect_pages(
            &source,
            PaginationState::first_token_page(),
            &self.executor,
            &self.settings.collect_options(),
            on_progress,
        )
        .await?;

        if with_details && !items.is_empty() {
            let ids: Vec<String> = items.keys().cloned().collect();
            let outcome =
                fetch_details_batched(self, &ids, &self.executor, &self.settings.batch_options())
                    .await?;
            if !outcome.failed.is_empty() {
                tracing::warn!(
                    failed = outcome.failed.len(),
                    "some detail batches failed; keeping listing records for those ids"
                );
            }
            items.extend(outcome.records);
        }

        Ok(CategoryListing {
            scope: category.unwrap_or_default().to_string(),
            records: items.into_values().collect(),
        })
    }

    /// Fetches products by id in batched PUTs.
    ///
    /// # Errors
    ///
    /// Only [`ScraperError::Cancelled`]; failed chunks land in
    /// [`CatalogResult::errors`].
    pub async fn fetch_catalog(&self, ids: &[String]) -> Result<CatalogResult, ScraperError> {
        let outcome =
            fetch_details_batched(self, ids, &self.executor, &self.settings.batch_options()).await?;
        Ok(CatalogResult::from_batch(ids, outcome))
    }
}

impl DetailSource for RestClient {
    fn fetch_details<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ProductRecord>, ScraperError>> {
        Box::pin(self.fetch_detail_chunk(ids))
    }
}

struct CategoryPages<'c> {
    client: &'c RestClient,
    category: Option<&'c str>,
}

impl PageSource for CategoryPages<'_> {
    fn fetch_page<'a>(
        &'a self,
        state: &'a PaginationState,
    ) -> BoxFuture<'a, Result<ProductPage, ScraperError>> {
        Box::pin(self.client.fetch_listing_page(self.category, state.token()))
    }
}
