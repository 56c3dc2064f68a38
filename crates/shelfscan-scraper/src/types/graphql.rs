//! Response trees for the GraphQL product API.
//!
//! Only the fields the normalizer reads are modelled; everything else in the
//! payload is ignored.

use serde::Deserialize;

use super::{opt_f64, opt_string, opt_u64, Lenient};

/// The first element of the GraphQL response array.
#[derive(Debug, Default, Deserialize)]
pub struct GraphQlEnvelope {
    #[serde(default)]
    pub data: Option<GraphQlData>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphQlData {
    #[serde(default)]
    pub taxonomy: Option<Vec<Lenient<TaxonomyNode>>>,
    #[serde(default)]
    pub category: Option<CategoryResults>,
    #[serde(default)]
    pub product: Option<ProductNode>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaxonomyNode {
    #[serde(default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub name: Option<String>,
    #[serde(default)]
    pub children: Option<Vec<Lenient<TaxonomyNode>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResults {
    #[serde(default)]
    pub page_information: Option<PageInformation>,
    #[serde(default)]
    pub results: Option<Vec<Lenient<ResultItem>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInformation {
    #[serde(default, deserialize_with = "opt_u64")]
    pub total_count: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64")]
    pub page_no: Option<u64>,
    #[serde(default, deserialize_with = "opt_u64")]
    pub count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResultItem {
    #[serde(default)]
    pub node: Option<ProductNode>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductNode {
    #[serde(default, deserialize_with = "opt_string")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub tpnb: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub tpnc: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub gtin: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub brand_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub short_description: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub default_image_url: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub super_department_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub super_department_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub department_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub department_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub aisle_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub aisle_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub shelf_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub shelf_name: Option<String>,
    /// Listing nodes carry price under their sellers.
    #[serde(default)]
    pub sellers: Option<Sellers>,
    /// Detail nodes carry price directly.
    #[serde(default)]
    pub price: Option<DetailPrice>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Sellers {
    #[serde(default)]
    pub results: Option<Vec<Lenient<Seller>>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Seller {
    #[serde(default)]
    pub price: Option<SellerPrice>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerPrice {
    #[serde(default, deserialize_with = "opt_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub unit_price: Option<f64>,
    #[serde(default, deserialize_with = "opt_string")]
    pub unit_of_measure: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetailPrice {
    #[serde(default, deserialize_with = "opt_f64")]
    pub actual: Option<f64>,
    #[serde(default, deserialize_with = "opt_f64")]
    pub unit_price: Option<f64>,
    #[serde(default, deserialize_with = "opt_string")]
    pub unit_of_measure: Option<String>,
}
