//! Bulk detail fetching in bounded chunks.
//!
//! Ids are deduplicated, split into chunks of at most `chunk_size`, and each
//! chunk is fetched with retry. A chunk that still fails after retries does
//! not abort the batch: its ids are reported in [`BatchOutcome::failed`].

use std::collections::{BTreeMap, HashSet};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use shelfscan_core::ProductRecord;

use crate::error::ScraperError;
use crate::retry::RetryExecutor;

pub const DEFAULT_CHUNK_SIZE: usize = 100;

/// Fetches the detail records for one chunk of ids. Must not retry.
pub trait DetailSource: Send + Sync {
    fn fetch_details<'a>(
        &'a self,
        ids: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<ProductRecord>, ScraperError>>;
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub chunk_size: usize,
    /// Chunks in flight at once. `1` fetches strictly in order.
    pub max_concurrent_chunks: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_chunks: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    /// Fetched records keyed by primary id.
    pub records: BTreeMap<String, ProductRecord>,
    /// Ids belonging to chunks that failed after retries, in request order.
    pub failed: Vec<String>,
}

/// Removes duplicate ids, keeping the first occurrence of each.
#[must_use]
pub fn dedup_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .filter(|id| seen.insert(id.as_str()))
        .cloned()
        .collect()
}

/// Fetches details for `ids` through `source` in chunks.
///
/// An empty id list returns an empty outcome without issuing any request.
///
/// # Errors
///
/// Returns [`ScraperError::Cancelled`] if the executor's token fires; every
/// other chunk failure is recorded in the outcome instead.
pub async fn fetch_details_batched<S>(
    source: &S,
    ids: &[String],
    executor: &RetryExecutor,
    options: &BatchOptions,
) -> Result<BatchOutcome, ScraperError>
where
    S: DetailSource + ?Sized,
{
    let unique = dedup_ids(ids);
    if unique.is_empty() {
        return Ok(BatchOutcome::default());
    }

    let chunks: Vec<&[String]> = unique.chunks(options.chunk_size.max(1)).collect();
    let total = chunks.len();
    tracing::info!(ids = unique.len(), chunks = total, "fetching details in batches");

    let fetches: Vec<BoxFuture<'_, (usize, &[String], Result<Vec<ProductRecord>, ScraperError>)>> = chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| async move {
            tracing::debug!(batch = index + 1, total, size = chunk.len(), "fetching detail batch");
            let result = executor.run(|| source.fetch_details(chunk)).await;
            (index, chunk, result)
        }
        .boxed())
        .collect();
    let mut results: Vec<_> = stream::iter(fetches)
        .buffer_unordered(options.max_concurrent_chunks.max(1))
        .collect()
        .await;
    results.sort_by_key(|(index, _, _)| *index);

    let mut outcome = BatchOutcome::default();
    for (index, chunk, result) in results {
        match result {
            Ok(records) => {
                if records.len() != chunk.len() {
                    tracing::warn!(
                        batch = index + 1,
                        requested = chunk.len(),
                        received = records.len(),
                        "detail batch returned a different number of records than requested"
                    );
                }
                for record in records {
                    outcome.records.insert(record.ids.id.clone(), record);
                }
            }
            Err(ScraperError::Cancelled) => return Err(ScraperError::Cancelled),
            Err(e) => {
                tracing::error!(
                    batch = index + 1,
                    size = chunk.len(),
                    error = %e,
                    "detail batch failed; recording its ids as failed"
                );
                outcome.failed.extend(chunk.iter().cloned());
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use crate::retry::{RecordingSleeper, RetryPolicy, Sleeper};

    /// Echoes every requested id back as a record; fails chunks containing `poison`.
    struct EchoSource {
        chunk_sizes: Mutex<Vec<usize>>,
        poison: Option<&'static str>,
    }

    impl EchoSource {
        fn new(poison: Option<&'static str>) -> Self {
            Self {
                chunk_sizes: Mutex::new(Vec::new()),
                poison,
            }
        }
    }

    impl DetailSource for EchoSource {
        fn fetch_details<'a>(
            &'a self,
            ids: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<ProductRecord>, ScraperError>> {
            self.chunk_sizes.lock().unwrap().push(ids.len());
            let poisoned = self
                .poison
                .is_some_and(|p| ids.iter().any(|id| id == p));
            Box::pin(async move {
                if poisoned {
                    return Err(ScraperError::UnexpectedStatus {
                        status: 500,
                        url: "https://example.com".to_string(),
                    });
                }
                Ok(ids.iter().map(ProductRecord::with_id).collect())
            })
        }
    }

    fn executor(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::new(RetryPolicy::new(max_attempts, Duration::from_millis(10), 2.0))
            .with_sleeper(Arc::new(RecordingSleeper::new()) as Arc<dyn Sleeper>)
    }

    fn ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("id-{i}")).collect()
    }

    #[tokio::test]
    async fn splits_into_chunks_of_chunk_size() {
        let source = EchoSource::new(None);
        let outcome = fetch_details_batched(&source, &ids(250), &executor(1), &BatchOptions::default())
            .await
            .unwrap();
        assert_eq!(*source.chunk_sizes.lock().unwrap(), vec![100, 100, 50]);
        assert_eq!(outcome.records.len(), 250);
        assert!(outcome.failed.is_empty());
    }

    #[tokio::test]
    async fn empty_input_issues_no_requests() {
        let source = EchoSource::new(None);
        let outcome = fetch_details_batched(&source, &[], &executor(1), &BatchOptions::default())
            .await
            .unwrap();
        assert!(source.chunk_sizes.lock().unwrap().is_empty());
        assert_eq!(outcome, BatchOutcome::default());
    }

    #[tokio::test]
    async fn duplicate_ids_are_fetched_once() {
        let source = EchoSource::new(None);
        let input: Vec<String> = ["a", "b", "a", "c", "b"].iter().map(|s| (*s).to_string()).collect();
        let options = BatchOptions {
            chunk_size: 2,
            max_concurrent_chunks: 1,
        };
        let outcome = fetch_details_batched(&source, &input, &executor(1), &options)
            .await
            .unwrap();
        assert_eq!(*source.chunk_sizes.lock().unwrap(), vec![2, 1]);
        assert_eq!(outcome.records.len(), 3);
    }

    #[tokio::test]
    async fn failed_chunk_is_reported_and_others_succeed() {
        let source = EchoSource::new(Some("id-150"));
        let outcome = fetch_details_batched(&source, &ids(250), &executor(2), &BatchOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 150);
        assert_eq!(outcome.failed.len(), 100);
        assert_eq!(outcome.failed.first().map(String::as_str), Some("id-100"));
        // Two attempts for the poisoned chunk, one each for the others.
        assert_eq!(source.chunk_sizes.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn concurrent_chunks_still_merge_every_record() {
        let source = EchoSource::new(None);
        let options = BatchOptions {
            chunk_size: 10,
            max_concurrent_chunks: 4,
        };
        let outcome = fetch_details_batched(&source, &ids(95), &executor(1), &options)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 95);
        assert_eq!(source.chunk_sizes.lock().unwrap().len(), 10);
    }

    #[tokio::test]
    async fn cancellation_aborts_the_batch() {
        let source = EchoSource::new(None);
        let exec = executor(1);
        exec.cancellation().cancel();
        let result = fetch_details_batched(&source, &ids(5), &exec, &BatchOptions::default()).await;
        assert!(matches!(result, Err(ScraperError::Cancelled)));
    }

    /// Cancels the run mid-request and then fails the way a dropped
    /// connection would.
    struct CancellingSource {
        cancel: tokio_util::sync::CancellationToken,
    }

    impl DetailSource for CancellingSource {
        fn fetch_details<'a>(
            &'a self,
            _ids: &'a [String],
        ) -> BoxFuture<'a, Result<Vec<ProductRecord>, ScraperError>> {
            self.cancel.cancel();
            Box::pin(async {
                Err(ScraperError::UnexpectedStatus {
                    status: 503,
                    url: "https://example.com".to_string(),
                })
            })
        }
    }

    #[tokio::test]
    async fn cancellation_during_a_failing_chunk_aborts_instead_of_reporting_failures() {
        let exec = executor(3);
        let source = CancellingSource {
            cancel: exec.cancellation().clone(),
        };
        let input: Vec<String> = ["a", "b"].iter().map(|s| (*s).to_string()).collect();
        let result = fetch_details_batched(&source, &input, &exec, &BatchOptions::default()).await;
        assert!(matches!(result, Err(ScraperError::Cancelled)));
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let input: Vec<String> = ["b", "a", "b", "c", "a"].iter().map(|s| (*s).to_string()).collect();
        assert_eq!(dedup_ids(&input), vec!["b", "a", "c"]);
    }
}
