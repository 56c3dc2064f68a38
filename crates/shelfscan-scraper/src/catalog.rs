//! Result types returned by the market clients.

use std::collections::HashSet;

use serde::Serialize;
use shelfscan_core::ProductRecord;

use crate::batch::{dedup_ids, BatchOutcome};

/// Every product listed under one category or facet.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CategoryListing {
    pub scope: String,
    pub records: Vec<ProductRecord>,
}

/// Outcome of fetching products by id.
///
/// A failure for one id never hides the others: it lands in `errors` while
/// the rest of the batch is still returned.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CatalogResult {
    pub records: Vec<ProductRecord>,
    /// Requested ids that failed or were not returned.
    pub errors: Vec<String>,
}

impl CatalogResult {
    /// Builds a result from a batch outcome, also flagging requested ids that
    /// no returned record answers to.
    #[must_use]
    pub fn from_batch(requested: &[String], outcome: BatchOutcome) -> Self {
        let records: Vec<ProductRecord> = outcome.records.into_values().collect();
        let answered: HashSet<&str> = records.iter().flat_map(|r| r.ids.codes()).collect();
        let mut flagged: HashSet<String> = outcome.failed.iter().cloned().collect();
        let mut errors = outcome.failed;
        for id in dedup_ids(requested) {
            if !answered.contains(id.as_str()) && flagged.insert(id.clone()) {
                tracing::warn!(id = %id, "requested product was not returned");
                errors.push(id);
            }
        }
        Self { records, errors }
    }
}
