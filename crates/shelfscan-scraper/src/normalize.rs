//! Normalization from raw response envelopes to [`ProductRecord`]s and
//! [`CategoryNode`]s.
//!
//! Every function here is pure: the same envelope always yields the same
//! output. A missing required container is a [`ScraperError::Shape`] naming
//! its key path; a missing optional field is just `None` on the record.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;
use shelfscan_core::{CategoryLevel, CategoryNode, CategoryPath, Price, ProductRecord};

use crate::error::ScraperError;
use crate::types::graphql::{GraphQlEnvelope, ProductNode, TaxonomyNode};
use crate::types::rest::{RestCategory, RestEnvelope, RestProduct};
use crate::types::{value_to_f64, value_to_string, Lenient};

/// One page of listing results, deduplicated by primary id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductPage {
    pub products: BTreeMap<String, ProductRecord>,
    /// Total matching items reported by offset-paginated sources.
    pub total_count: Option<u64>,
    /// Continuation token reported by token-paginated sources.
    pub next_page_token: Option<String>,
}

fn parse<'a, T: Deserialize<'a>>(envelope: &'a Value, context: &str) -> Result<T, ScraperError> {
    T::deserialize(envelope).map_err(|e| ScraperError::MalformedEnvelope {
        context: context.to_string(),
        reason: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// GraphQL family
// ---------------------------------------------------------------------------

/// Flattens `data.taxonomy` (and its nested `children`) into a map keyed by id.
///
/// # Errors
///
/// [`ScraperError::Shape`] if `data.taxonomy` is absent.
pub fn extract_graphql_taxonomy(
    envelope: &Value,
) -> Result<BTreeMap<String, CategoryNode>, ScraperError> {
    let parsed: GraphQlEnvelope = parse(envelope, "graphql taxonomy")?;
    let roots = parsed
        .data
        .and_then(|d| d.taxonomy)
        .ok_or_else(|| ScraperError::shape("data.taxonomy"))?;

    let mut nodes = BTreeMap::new();
    flatten_graphql_taxonomy(&roots, None, &mut nodes);
    Ok(nodes)
}

fn flatten_graphql_taxonomy(
    items: &[Lenient<TaxonomyNode>],
    parent_id: Option<&str>,
    out: &mut BTreeMap<String, CategoryNode>,
) {
    for node in items.iter().filter_map(Lenient::as_option) {
        let own_id = node.id.as_deref();
        if let Some(id) = own_id {
            out.insert(
                id.to_string(),
                CategoryNode {
                    id: id.to_string(),
                    name: node.name.clone(),
                    parent_id: parent_id.map(str::to_string),
                },
            );
        }
        if let Some(children) = &node.children {
            flatten_graphql_taxonomy(children, own_id.or(parent_id), out);
        }
    }
}

/// Extracts one listing page from `data.category`.
///
/// Nodes without an id are skipped. Price is read from the first seller only;
/// a product with no sellers gets an empty [`Price`].
///
/// # Errors
///
/// [`ScraperError::Shape`] if `data.category.results` is absent.
pub fn extract_graphql_listing(envelope: &Value) -> Result<ProductPage, ScraperError> {
    let parsed: GraphQlEnvelope = parse(envelope, "graphql listing")?;
    let category = parsed
        .data
        .and_then(|d| d.category)
        .ok_or_else(|| ScraperError::shape("data.category.results"))?;
    let results = category
        .results
        .ok_or_else(|| ScraperError::shape("data.category.results"))?;

    let mut products = BTreeMap::new();
    let mut skipped = 0usize;
    for node in results
        .iter()
        .map(|item| item.as_option().and_then(|r| r.node.as_ref()))
    {
        match node.and_then(listing_record) {
            Some(record) => {
                products.insert(record.ids.id.clone(), record);
            }
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, "skipped listing entries without a usable product node");
    }

    Ok(ProductPage {
        products,
        total_count: category.page_information.and_then(|p| p.total_count),
        next_page_token: None,
    })
}

/// Extracts the single product in `data.product`.
///
/// # Errors
///
/// [`ScraperError::Shape`] if `data.product` or its id is absent.
pub fn extract_graphql_product(envelope: &Value) -> Result<ProductRecord, ScraperError> {
    let parsed: GraphQlEnvelope = parse(envelope, "graphql product")?;
    let node = parsed
        .data
        .and_then(|d| d.product)
        .ok_or_else(|| ScraperError::shape("data.product"))?;
    let mut record = base_record(&node).ok_or_else(|| ScraperError::shape("data.product.id"))?;
    record.price = match &node.price {
        Some(p) => Price {
            amount: p.actual,
            unit_price: p.unit_price,
            unit_of_measure: p.unit_of_measure.clone(),
        },
        None => first_seller_price(&node),
    };
    Ok(record)
}

fn listing_record(node: &ProductNode) -> Option<ProductRecord> {
    let mut record = base_record(node)?;
    record.price = first_seller_price(node);
    Some(record)
}

fn base_record(node: &ProductNode) -> Option<ProductRecord> {
    let mut record = ProductRecord::with_id(node.id.clone()?);
    record.ids.gtin.clone_from(&node.gtin);
    record.ids.catalog_code.clone_from(&node.tpnb);
    record.ids.unit_code.clone_from(&node.tpnc);
    record.title.clone_from(&node.title);
    record.brand.clone_from(&node.brand_name);
    record.description = node
        .short_description
        .clone()
        .or_else(|| node.description.clone());
    record.image_url.clone_from(&node.default_image_url);
    record.category = CategoryPath {
        super_department: CategoryLevel::new(
            node.super_department_id.clone(),
            node.super_department_name.clone(),
        ),
        department: CategoryLevel::new(node.department_id.clone(), node.department_name.clone()),
        aisle: CategoryLevel::new(node.aisle_id.clone(), node.aisle_name.clone()),
        shelf: CategoryLevel::new(node.shelf_id.clone(), node.shelf_name.clone()),
    };
    Some(record)
}

fn first_seller_price(node: &ProductNode) -> Price {
    node.sellers
        .as_ref()
        .and_then(|s| s.results.as_ref())
        .and_then(|results| results.first())
        .and_then(Lenient::as_option)
        .and_then(|seller| seller.price.as_ref())
        .map(|p| Price {
            amount: p.price,
            unit_price: p.unit_price,
            unit_of_measure: p.unit_of_measure.clone(),
        })
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// REST family
// ---------------------------------------------------------------------------

/// Flattens `result.categories` into a map keyed by id.
///
/// # Errors
///
/// [`ScraperError::Shape`] if `result.categories` is absent.
pub fn extract_rest_taxonomy(
    envelope: &Value,
) -> Result<BTreeMap<String, CategoryNode>, ScraperError> {
    let parsed: RestEnvelope = parse(envelope, "rest taxonomy")?;
    let roots = parsed
        .result
        .and_then(|r| r.categories)
        .ok_or_else(|| ScraperError::shape("result.categories"))?;

    let mut nodes = BTreeMap::new();
    flatten_rest_taxonomy(&roots, None, &mut nodes);
    Ok(nodes)
}

fn flatten_rest_taxonomy(
    items: &[Lenient<RestCategory>],
    parent_id: Option<&str>,
    out: &mut BTreeMap<String, CategoryNode>,
) {
    for category in items.iter().filter_map(Lenient::as_option) {
        let own_id = category.id.as_deref();
        if let Some(id) = own_id {
            out.insert(
                id.to_string(),
                CategoryNode {
                    id: id.to_string(),
                    name: category.name.clone(),
                    parent_id: parent_id.map(str::to_string),
                },
            );
        }
        if let Some(children) = &category.children {
            flatten_rest_taxonomy(children, own_id.or(parent_id), out);
        }
    }
}

/// Extracts one listing page from `result.productGroups`.
///
/// Every listed id yields a record; ids with an entry in `entities.product`
/// are enriched from it, the rest carry only their id.
///
/// # Errors
///
/// [`ScraperError::Shape`] if `result.productGroups` is absent.
pub fn extract_rest_listing(envelope: &Value) -> Result<ProductPage, ScraperError> {
    let parsed: RestEnvelope = parse(envelope, "rest listing")?;
    let result = parsed
        .result
        .ok_or_else(|| ScraperError::shape("result.productGroups"))?;
    let groups = result
        .product_groups
        .ok_or_else(|| ScraperError::shape("result.productGroups"))?;
    let entities = parsed.entities.map(|e| e.product).unwrap_or_default();

    let mut products = BTreeMap::new();
    for group in groups.iter().filter_map(Lenient::as_option) {
        for id in group.products.iter().filter_map(|code| code.0.as_deref()) {
            let record = match entities.get(id).and_then(Lenient::as_option) {
                Some(entity) => rest_record(entity, id.to_string()),
                None => ProductRecord::with_id(id),
            };
            products.insert(id.to_string(), record);
        }
    }

    Ok(ProductPage {
        products,
        total_count: None,
        next_page_token: result.next_page_token,
    })
}

/// Extracts the detail records in `products`, in response order.
///
/// Entries without a product id are skipped.
///
/// # Errors
///
/// [`ScraperError::Shape`] if `products` is absent.
pub fn extract_rest_details(envelope: &Value) -> Result<Vec<ProductRecord>, ScraperError> {
    let parsed: RestEnvelope = parse(envelope, "rest details")?;
    let items = parsed
        .products
        .ok_or_else(|| ScraperError::shape("products"))?;

    Ok(items
        .iter()
        .filter_map(Lenient::as_option)
        .filter_map(|p| {
            let id = p.product_id.clone()?;
            Some(rest_record(p, id))
        })
        .collect())
}

fn rest_record(product: &RestProduct, id: String) -> ProductRecord {
    let mut record = ProductRecord::with_id(id);
    record.ids.catalog_code.clone_from(&product.retailer_product_id);
    record.title.clone_from(&product.name);
    record.brand.clone_from(&product.brand);
    record.description.clone_from(&product.description);
    record.image_url.clone_from(&product.image_url);
    record.pack_size = product.size.as_ref().and_then(pack_size_text);
    record.price = Price {
        amount: product.price.as_ref().and_then(amount),
        unit_price: product.unit_price.as_ref().and_then(amount),
        unit_of_measure: product.unit_price.as_ref().and_then(|v| {
            ["unit", "per", "unitOfMeasure"]
                .iter()
                .find_map(|key| v.get(key).and_then(value_to_string))
        }),
    };
    record.category = product
        .category_path
        .as_ref()
        .map(category_path)
        .unwrap_or_default();
    record
}

/// A bare number, or the first numeric member among the usual amount keys.
fn amount(value: &Value) -> Option<f64> {
    value_to_f64(value).or_else(|| {
        ["amount", "current", "price", "value"]
            .iter()
            .find_map(|key| value.get(key).and_then(value_to_f64))
    })
}

fn pack_size_text(value: &Value) -> Option<String> {
    value_to_string(value).or_else(|| value.get("value").and_then(value_to_string))
}

fn category_path(value: &Value) -> CategoryPath {
    match value {
        Value::Array(levels) => CategoryPath::from_names(levels.iter().filter_map(|level| {
            value_to_string(level).or_else(|| level.get("name").and_then(value_to_string))
        })),
        Value::String(joined) => CategoryPath::from_names(
            joined
                .split('>')
                .map(str::trim)
                .filter(|name| !name.is_empty()),
        ),
        _ => CategoryPath::default(),
    }
}

#[cfg(test)]
#[path = "normalize_test.rs"]
mod tests;
