//! Per-market static configuration loaded from `config/markets.yaml`.
//!
//! A market is one retail back-end in one region. Each market belongs to an
//! API family (`graphql` or `rest`) which decides the client used to talk to
//! it and which extra settings it needs.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::ConfigError;

/// One named GraphQL operation and the file holding its query text.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationConfig {
    pub name: String,
    pub mfe_name: String,
    pub query_path: PathBuf,
}

impl OperationConfig {
    /// Reads the query text from [`Self::query_path`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::QueryFileIo`] if the file cannot be read.
    pub fn load_query(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.query_path).map_err(|e| ConfigError::QueryFileIo {
            path: self.query_path.display().to_string(),
            source: e,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GraphQlOperations {
    pub taxonomy: OperationConfig,
    pub products: OperationConfig,
    pub product: OperationConfig,
}

#[derive(Clone, Deserialize)]
pub struct GraphQlMarket {
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Name of an env var holding the API key; takes precedence over `api_key`.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Locale and region headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub operations: GraphQlOperations,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Variable name the product query expects the product code under.
    #[serde(default = "default_product_id_variable")]
    pub product_id_variable: String,
    /// Friendly facet name → opaque facet key.
    #[serde(default)]
    pub facets: BTreeMap<String, String>,
}

impl GraphQlMarket {
    /// Resolves the API key, preferring `api_key_env` when that variable is set.
    #[must_use]
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
            .or_else(|| self.api_key.clone())
    }
}

impl std::fmt::Debug for GraphQlMarket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQlMarket")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("api_key_env", &self.api_key_env)
            .field("headers", &self.headers)
            .field("operations", &self.operations)
            .field("page_size", &self.page_size)
            .field("product_id_variable", &self.product_id_variable)
            .field("facets", &self.facets.len())
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestMarket {
    pub base_url: String,
    #[serde(default = "default_listing_path")]
    pub listing_path: String,
    #[serde(default = "default_details_path")]
    pub details_path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Friendly category name → category id.
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum MarketApi {
    Graphql(GraphQlMarket),
    Rest(RestMarket),
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(flatten)]
    pub api: MarketApi,
}

impl MarketConfig {
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self.api {
            MarketApi::Graphql(_) => "graphql",
            MarketApi::Rest(_) => "rest",
        }
    }

    /// Maps a configured facet or category name to its code.
    ///
    /// Unknown names are assumed to already be a raw code and are returned
    /// unchanged.
    #[must_use]
    pub fn resolve_scope(&self, name_or_code: &str) -> String {
        let named = match &self.api {
            MarketApi::Graphql(g) => &g.facets,
            MarketApi::Rest(r) => &r.categories,
        };
        named
            .get(name_or_code)
            .cloned()
            .unwrap_or_else(|| name_or_code.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketsFile {
    pub markets: Vec<MarketConfig>,
}

impl MarketsFile {
    /// Finds a market by code, ignoring ASCII case.
    #[must_use]
    pub fn find(&self, code: &str) -> Option<&MarketConfig> {
        self.markets
            .iter()
            .find(|m| m.code.eq_ignore_ascii_case(code))
    }
}

fn default_page_size() -> u32 {
    100
}

fn default_product_id_variable() -> String {
    "tpnc".to_string()
}

fn default_listing_path() -> String {
    "/api/v6/products".to_string()
}

fn default_details_path() -> String {
    "/api/webproductpagews/v6/products".to_string()
}

/// Load and validate the markets configuration from a YAML file.
///
/// Relative GraphQL query paths are resolved against the directory that
/// contains the markets file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_markets(path: &Path) -> Result<MarketsFile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::MarketsFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    parse_markets(&content, base_dir)
}

pub(crate) fn parse_markets(content: &str, base_dir: &Path) -> Result<MarketsFile, ConfigError> {
    let mut markets_file: MarketsFile = serde_yaml::from_str(content)?;

    for market in &mut markets_file.markets {
        if let MarketApi::Graphql(g) = &mut market.api {
            for op in [
                &mut g.operations.taxonomy,
                &mut g.operations.products,
                &mut g.operations.product,
            ] {
                if op.query_path.is_relative() {
                    op.query_path = base_dir.join(&op.query_path);
                }
            }
        }
    }

    validate_markets(&markets_file)?;
    Ok(markets_file)
}

fn validate_markets(markets_file: &MarketsFile) -> Result<(), ConfigError> {
    let mut seen_codes = HashSet::new();

    for market in &markets_file.markets {
        let code = market.code.trim();
        if code.is_empty() {
            return Err(ConfigError::Validation(
                "market code must be non-empty".to_string(),
            ));
        }
        if !seen_codes.insert(code.to_lowercase()) {
            return Err(ConfigError::Validation(format!(
                "duplicate market code: '{code}'"
            )));
        }

        match &market.api {
            MarketApi::Graphql(g) => {
                require_http_url(code, "endpoint", &g.endpoint)?;
                if g.api_key.is_none() && g.api_key_env.is_none() {
                    return Err(ConfigError::Validation(format!(
                        "market '{code}' needs either api_key or api_key_env"
                    )));
                }
                if g.page_size == 0 {
                    return Err(ConfigError::Validation(format!(
                        "market '{code}' has page_size 0; must be at least 1"
                    )));
                }
                for op in [
                    &g.operations.taxonomy,
                    &g.operations.products,
                    &g.operations.product,
                ] {
                    if op.name.trim().is_empty() {
                        return Err(ConfigError::Validation(format!(
                            "market '{code}' has an operation with an empty name"
                        )));
                    }
                }
            }
            MarketApi::Rest(r) => {
                require_http_url(code, "base_url", &r.base_url)?;
            }
        }
    }

    Ok(())
}

fn require_http_url(code: &str, field: &str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("https://") || value.starts_with("http://") {
        Ok(())
    } else {
        Err(ConfigError::Validation(format!(
            "market '{code}' has invalid {field} '{value}'; must start with http:// or https://"
        )))
    }
}

#[cfg(test)]
#[path = "markets_test.rs"]
mod tests;
