//! Response trees for the session-authenticated REST product API.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::{opt_string, Code, Lenient};

/// Top level of every REST response. Which members are present depends on the
/// endpoint: taxonomy and listing responses carry `result`, detail responses
/// carry `products`.
#[derive(Debug, Default, Deserialize)]
pub struct RestEnvelope {
    #[serde(default)]
    pub result: Option<RestResult>,
    #[serde(default)]
    pub entities: Option<RestEntities>,
    #[serde(default)]
    pub products: Option<Vec<Lenient<RestProduct>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestResult {
    #[serde(default)]
    pub categories: Option<Vec<Lenient<RestCategory>>>,
    #[serde(default)]
    pub product_groups: Option<Vec<Lenient<ProductGroup>>>,
    #[serde(default, deserialize_with = "opt_string")]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RestCategory {
    #[serde(default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<Lenient<RestCategory>>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductGroup {
    #[serde(default)]
    pub products: Vec<Code>,
}

/// Product entities keyed by product id.
#[derive(Debug, Default, Deserialize)]
pub struct RestEntities {
    #[serde(default)]
    pub product: BTreeMap<String, Lenient<RestProduct>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestProduct {
    #[serde(default, deserialize_with = "opt_string")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub retailer_product_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub image_url: Option<String>,
    /// Pack size, either a bare string or `{ "value": "500g" }`.
    #[serde(default)]
    pub size: Option<Value>,
    /// Either a bare amount or an object with an amount member.
    #[serde(default)]
    pub price: Option<Value>,
    /// Either a bare amount or `{ "price": .., "unit": .. }`.
    #[serde(default)]
    pub unit_price: Option<Value>,
    /// Outermost-first list of category names, or a `>`-separated string.
    #[serde(default)]
    pub category_path: Option<Value>,
}
