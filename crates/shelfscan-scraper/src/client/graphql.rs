//! Client for GraphQL-family markets.
//!
//! Every call is a POST of a one-element array `[{operationName, variables,
//! extensions: {mfeName}, query}]` to a single endpoint. Listings paginate by
//! page number against the reported total count.

use std::collections::BTreeMap;

use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::{Method, Url};
use serde_json::{json, Value};
use shelfscan_core::{CategoryNode, ConfigError, GraphQlMarket, OperationConfig, ProductRecord};

use crate::batch::{fetch_details_batched, BatchOptions, DetailSource};
use crate::catalog::{CatalogResult, CategoryListing};
use crate::client::{configured_headers, parse_url, ApiRequest, ClientSettings, EnvelopeKind, RequestClient};
use crate::error::ScraperError;
use crate::normalize::{
    extract_graphql_listing, extract_graphql_product, extract_graphql_taxonomy, ProductPage,
};
use crate::pagination::{collect_pages, PageSource, PaginationState, Progress};
use crate::retry::RetryExecutor;

/// A named operation with its query text loaded.
#[derive(Debug, Clone)]
pub struct GraphQlOperation {
    pub name: String,
    pub mfe_name: String,
    pub query: String,
}

impl GraphQlOperation {
    /// # Errors
    ///
    /// Returns [`ScraperError::Config`] if the query file cannot be read.
    pub fn load(config: &OperationConfig) -> Result<Self, ScraperError> {
        Ok(Self {
            name: config.name.clone(),
            mfe_name: config.mfe_name.clone(),
            query: config.load_query()?,
        })
    }

    /// Wraps `variables` in the one-element request array.
    #[must_use]
    pub fn payload(&self, variables: Value) -> Value {
        json!([{
            "operationName": self.name,
            "variables": variables,
            "extensions": { "mfeName": self.mfe_name },
            "query": self.query,
        }])
    }
}

/// Resolved connection settings for one GraphQL market.
#[derive(Clone)]
pub struct GraphQlClientConfig {
    pub endpoint: String,
    pub api_key: String,
    pub headers: BTreeMap<String, String>,
    pub taxonomy: GraphQlOperation,
    pub products: GraphQlOperation,
    pub product: GraphQlOperation,
    pub page_size: u32,
    pub product_id_variable: String,
}

impl std::fmt::Debug for GraphQlClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQlClientConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[redacted]")
            .field("headers", &self.headers)
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl GraphQlClientConfig {
    /// Resolves the API key and loads all three query files.
    ///
    /// # Errors
    ///
    /// Returns [`ScraperError::Config`] if no API key is available or a query
    /// file cannot be read.
    pub fn from_market(market: &GraphQlMarket) -> Result<Self, ScraperError> {
        let api_key = market.api_key().ok_or_else(|| {
            ConfigError::Validation(format!(
                "no API key for {}; set {} or api_key",
                market.endpoint,
                market.api_key_env.as_deref().unwrap_or("api_key_env")
            ))
        })?;
        Ok(Self {
            endpoint: market.endpoint.clone(),
            api_key,
            headers: market.headers.clone(),
            taxonomy: GraphQlOperation::load(&market.operations.taxonomy)?,
            products: GraphQlOperation::load(&market.operations.products)?,
            product: GraphQlOperation::load(&market.operations.product)?,
            page_size: market.page_size,
            product_id_variable: market.product_id_variable.clone(),
        })
    }
}

pub struct GraphQlClient {
    http: RequestClient,
    endpoint: Url,
    headers: HeaderMap,
    config: GraphQlClientConfig,
    settings: ClientSettings,
    executor: RetryExecutor,
}

impl GraphQlClient {
    /// # Errors
    ///
    /// Returns [`ScraperError::InvalidUrl`] or [`ScraperError::InvalidHeader`]
    /// for bad configuration, or [`ScraperError::Transport`] if the HTTP
    /// client cannot be built.
    pub fn new(
        config: GraphQlClientConfig,
        settings: ClientSettings,
        executor: RetryExecutor,
    ) -> Result<Self, ScraperError> {
        let endpoint = parse_url(&config.endpoint)?;
        let headers = configured_headers(
            &[
                ("accept", "application/json"),
                ("content-type", "application/json"),
                ("cache-control", "no-cache"),
                ("x-apikey", config.api_key.as_str()),
            ],
            &config.headers,
        )?;
        let http = RequestClient::new(settings.timeout_secs, &settings.user_agent)?;
        Ok(Self {
            http,
            endpoint,
            headers,
            config,
            settings,
            executor,
        })
    }

    #[must_use]
    pub fn taxonomy_payload(&self) -> Value {
        self.config.taxonomy.payload(json!({
            "includeChildren": true,
            "usePageType": true,
            "includeInspirationEvents": true,
            "configs": [],
        }))
    }

    #[must_use]
    pub fn products_payload(&self, facet: &str, page: u32, count: u32) -> Value {
        self.config.products.payload(json!({
            "page": page,
            "count": count,
            "facet": facet,
            "includeRestrictions": true,
            "includeVariations": true,
            "appliedFacetArgs": [],
        }))
    }

    #[must_use]
    pub fn product_payload(&self, code: &str) -> Value {
        let mut variables = serde_json::Map::new();
        variables.insert(
            self.config.product_id_variable.clone(),
            Value::String(code.to_string()),
        );
        self.config.product.payload(Value::Object(variables))
    }

    async fn post(&self, payload: Value) -> Result<Value, ScraperError> {
        let request = ApiRequest::new(Method::POST, self.endpoint.clone())
            .headers(self.headers.clone())
            .json(payload);
        self.http.call(&request, EnvelopeKind::GraphQl).await
    }

    /// Fetches the full category tree.
    ///
    /// # Errors
    ///
    /// Any request or normalization error, after retries.
    pub async fn fetch_categories(&self) -> Result<BTreeMap<String, CategoryNode>, ScraperError> {
        let envelope = self
            .executor
            .run(|| self.post(self.taxonomy_payload()))
            .await?;
        let nodes = extract_graphql_taxonomy(&envelope)?;
        tracing::info!(categories = nodes.len(), "taxonomy fetched");
        Ok(nodes)
    }

    /// Fetches one listing page without retry.
    ///
    /// # Errors
    ///
    /// Any request or normalization error.
    pub async fn fetch_products_page(
        &self,
        facet: &str,
        page: u32,
        count: u32,
    ) -> Result<ProductPage, ScraperError> {
        let envelope = self.post(self.products_payload(facet, page, count)).await?;
        extract_graphql_listing(&envelope)
    }

    /// Fetches every product under `facet`, page by page.
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable or exhausted page error; partial
    /// results are discarded.
    pub async fn fetch_category(
        &self,
        facet: &str,
        page_size: Option<u32>,
        on_progress: &mut (dyn FnMut(&Progress) + Send),
    ) -> Result<CategoryListing, ScraperError> {
        let page_size = page_size.unwrap_or(self.config.page_size).max(1);
        tracing::info!(facet, page_size, "collecting facet");
        let source = FacetPages {
            client: self,
            facet,
        };
        let items = collect_pages(
            &source,
            PaginationState::first_offset_page(page_size),
            &self.executor,
            &self.settings.collect_options(),
            on_progress,
        )
        .await?;
        Ok(CategoryListing {
            scope: facet.to_string(),
            records: items.into_values().collect(),
        })
    }

    /// Fetches one product by code without retry.
    ///
    /// # Errors
    ///
    /// Any request error, or [`ScraperError::Shape`] if the product is absent.
    pub async fn fetch_product(&self, code: &str) -> Result<ProductRecord, ScraperError> {
        let envelope = self.post(self.product_payload(code)).await?;
        extract_graphql_product(&envelope)
    }

    /// Fetches products by code, one request per code.
    ///
    /// # Errors
    ///
    /// Only [`ScraperError::Cancelled`]; per-code failures land in
    /// [`CatalogResult::errors`].
    pub async fn fetch_catalog(&self, codes: &[String]) -> Result<CatalogResult, ScraperError> {
        let options = BatchOptions {
            chunk_size: 1,
            max_concurrent_chunks: self.settings.max_concurrent_chunks,
        };
        let outcome = fetch_details_batched(self, codes, &self.executor, &options).await?;
        Ok(CatalogResult::from_batch(codes, outcome))
    }
}

impl DetailSource for GraphQlClient {
    fn fetch_details<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ProductRecord>, ScraperError>> {
        Box::pin(async move {
            let mut records = Vec::with_capacity(ids.len());
            for code in ids {
                records.push(self.fetch_product(code).await?);
            }
            Ok(records)
        })
    }
}

struct FacetPages<'c> {
    client: &'c GraphQlClient,
    facet: &'c str,
}

impl PageSource for FacetPages<'_> {
    fn fetch_page<'a>(
        &'a self,
        state: &'a PaginationState,
    ) -> BoxFuture<'a, Result<ProductPage, ScraperError>> {
        let (page, page_size) = state
            .offset()
            .unwrap_or((1, self.client.config.page_size));
        Box::pin(self.client.fetch_products_page(self.facet, page, page_size))
    }
}
