//! Canonical product and category records.
//!
//! Every retail back-end, whatever its response shape, is normalized into
//! these types. They serialize to flat JSON objects suitable for one-record-
//! per-line output.

use serde::{Deserialize, Serialize};

/// Identifiers attached to a product. Only `id` is guaranteed to be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductIds {
    /// Primary id, unique within a result set.
    pub id: String,
    /// Barcode-style trade item number.
    pub gtin: Option<String>,
    /// Base catalog code shared by all pack variants of a product.
    pub catalog_code: Option<String>,
    /// Consumer-unit catalog code.
    pub unit_code: Option<String>,
}

impl ProductIds {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            gtin: None,
            catalog_code: None,
            unit_code: None,
        }
    }

    /// Every identifier this product answers to, primary id first.
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.id.as_str()).chain(
            [&self.gtin, &self.catalog_code, &self.unit_code]
                .into_iter()
                .filter_map(Option::as_deref),
        )
    }

    /// Returns `true` if `code` is any of this product's identifiers.
    #[must_use]
    pub fn matches(&self, code: &str) -> bool {
        self.codes().any(|c| c == code)
    }
}

/// Price data taken from the first seller of a product.
///
/// All fields are `None` when the source exposed no seller or price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub amount: Option<f64>,
    pub unit_price: Option<f64>,
    pub unit_of_measure: Option<String>,
}

impl Price {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.unit_price.is_none() && self.unit_of_measure.is_none()
    }
}

/// One level of a product's category path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLevel {
    pub id: Option<String>,
    pub name: Option<String>,
}

impl CategoryLevel {
    #[must_use]
    pub fn new(id: Option<String>, name: Option<String>) -> Self {
        Self { id, name }
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
        }
    }
}

/// Four-level category placement: super-department → department → aisle → shelf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPath {
    pub super_department: CategoryLevel,
    pub department: CategoryLevel,
    pub aisle: CategoryLevel,
    pub shelf: CategoryLevel,
}

impl CategoryPath {
    /// Builds a path from an ordered list of level names (outermost first).
    ///
    /// Names beyond the fourth level are ignored; missing levels stay empty.
    #[must_use]
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut path = Self::default();
        for (depth, name) in names.into_iter().take(4).enumerate() {
            let level = CategoryLevel::named(name);
            match depth {
                0 => path.super_department = level,
                1 => path.department = level,
                2 => path.aisle = level,
                _ => path.shelf = level,
            }
        }
        path
    }
}

/// The normalized, flat representation of one product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub ids: ProductIds,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub pack_size: Option<String>,
    pub price: Price,
    pub category: CategoryPath,
}

impl ProductRecord {
    /// Creates a record carrying only its primary id.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            ids: ProductIds::new(id),
            title: None,
            brand: None,
            description: None,
            image_url: None,
            pack_size: None,
            price: Price::default(),
            category: CategoryPath::default(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.ids.id
    }
}

/// A taxonomy entry, flattened out of the source tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: String,
    pub name: Option<String>,
    pub parent_id: Option<String>,
}
