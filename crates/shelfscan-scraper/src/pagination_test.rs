use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::*;
use crate::retry::{RecordingSleeper, RetryPolicy, Sleeper};

/// Replays a fixed script of page results and records each requested state.
struct ScriptedSource {
    script: Mutex<VecDeque<Result<ProductPage, ScraperError>>>,
    requests: Mutex<Vec<PaginationState>>,
}

impl ScriptedSource {
    fn new(script: Vec<Result<ProductPage, ScraperError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<PaginationState> {
        self.requests.lock().unwrap().clone()
    }
}

impl PageSource for ScriptedSource {
    fn fetch_page<'a>(
        &'a self,
        state: &'a PaginationState,
    ) -> BoxFuture<'a, Result<ProductPage, ScraperError>> {
        self.requests.lock().unwrap().push(state.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ProductPage::default()));
        Box::pin(async move { next })
    }
}

fn page(ids: &[&str], total: Option<u64>, token: Option<&str>) -> ProductPage {
    ProductPage {
        products: ids
            .iter()
            .map(|id| ((*id).to_string(), ProductRecord::with_id(*id)))
            .collect(),
        total_count: total,
        next_page_token: token.map(str::to_string),
    }
}

fn executor(sleeper: &Arc<RecordingSleeper>) -> RetryExecutor {
    RetryExecutor::new(RetryPolicy::new(3, Duration::from_secs(1), 2.0))
        .with_sleeper(Arc::clone(sleeper) as Arc<dyn Sleeper>)
}

fn options(delay_ms: u64) -> CollectOptions {
    CollectOptions {
        inter_page_delay: Duration::from_millis(delay_ms),
        max_pages: DEFAULT_MAX_PAGES,
    }
}

#[tokio::test]
async fn token_pagination_follows_tokens_until_empty_page() {
    let source = ScriptedSource::new(vec![
        Ok(page(&["a", "b"], None, Some("t1"))),
        Ok(page(&["c"], None, Some("t1"))),
        Ok(page(&[], None, None)),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());
    let mut seen = Vec::new();

    let items = collect_pages(
        &source,
        PaginationState::first_token_page(),
        &executor(&sleeper),
        &options(0),
        &mut |p: &Progress| seen.push(p.clone()),
    )
    .await
    .unwrap();

    assert_eq!(items.keys().collect::<Vec<_>>(), vec!["a", "b", "c"]);
    let requests = source.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[0].token(), None);
    assert_eq!(requests[1].token(), Some("t1"));
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[1].collected, 3);
}

#[tokio::test]
async fn token_pagination_stops_when_token_absent() {
    let source = ScriptedSource::new(vec![
        Ok(page(&["a"], None, Some("t1"))),
        Ok(page(&["b"], None, Some(""))),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let items = collect_pages(
        &source,
        PaginationState::first_token_page(),
        &executor(&sleeper),
        &options(0),
        &mut |_: &Progress| {},
    )
    .await
    .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test]
async fn offset_pagination_requests_ceil_total_over_size_pages() {
    let source = ScriptedSource::new(vec![
        Ok(page(&["1", "2"], Some(5), None)),
        Ok(page(&["3", "4"], Some(5), None)),
        Ok(page(&["5"], Some(5), None)),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let items = collect_pages(
        &source,
        PaginationState::first_offset_page(2),
        &executor(&sleeper),
        &options(0),
        &mut |_: &Progress| {},
    )
    .await
    .unwrap();

    assert_eq!(items.len(), 5);
    let pages: Vec<_> = source
        .requests()
        .iter()
        .map(|s| s.offset().unwrap().0)
        .collect();
    assert_eq!(pages, vec![1, 2, 3]);
}

#[tokio::test]
async fn offset_pagination_missing_total_stops_after_first_page() {
    let source = ScriptedSource::new(vec![Ok(page(&["1", "2"], None, None))]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let items = collect_pages(
        &source,
        PaginationState::first_offset_page(2),
        &executor(&sleeper),
        &options(0),
        &mut |_: &Progress| {},
    )
    .await
    .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(source.requests().len(), 1);
}

#[tokio::test]
async fn offset_pagination_zero_item_page_terminates() {
    let source = ScriptedSource::new(vec![
        Ok(page(&["1", "2"], Some(100), None)),
        Ok(page(&[], Some(100), None)),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let items = collect_pages(
        &source,
        PaginationState::first_offset_page(2),
        &executor(&sleeper),
        &options(0),
        &mut |_: &Progress| {},
    )
    .await
    .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(source.requests().len(), 2);
}

#[tokio::test]
async fn duplicate_ids_across_pages_keep_the_later_record() {
    let mut later = page(&["x"], None, None);
    later.products.get_mut("x").unwrap().title = Some("second".to_string());
    let source = ScriptedSource::new(vec![Ok(page(&["x"], None, Some("t"))), Ok(later)]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let items = collect_pages(
        &source,
        PaginationState::first_token_page(),
        &executor(&sleeper),
        &options(0),
        &mut |_: &Progress| {},
    )
    .await
    .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(items["x"].title.as_deref(), Some("second"));
}

#[tokio::test]
async fn politeness_delay_applies_between_pages_only() {
    let source = ScriptedSource::new(vec![
        Ok(page(&["a"], None, Some("t1"))),
        Ok(page(&["b"], None, Some("t2"))),
        Ok(page(&["c"], None, None)),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    collect_pages(
        &source,
        PaginationState::first_token_page(),
        &executor(&sleeper),
        &options(250),
        &mut |_: &Progress| {},
    )
    .await
    .unwrap();

    assert_eq!(sleeper.delays(), vec![Duration::from_millis(250); 2]);
}

#[tokio::test]
async fn transient_page_failure_is_retried() {
    let source = ScriptedSource::new(vec![
        Err(ScraperError::UnexpectedStatus {
            status: 502,
            url: "https://example.com".to_string(),
        }),
        Ok(page(&["a"], None, None)),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let items = collect_pages(
        &source,
        PaginationState::first_token_page(),
        &executor(&sleeper),
        &options(0),
        &mut |_: &Progress| {},
    )
    .await
    .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(sleeper.delays(), vec![Duration::from_secs(1)]);
}

#[tokio::test]
async fn non_retryable_page_failure_aborts_collection() {
    let source = ScriptedSource::new(vec![
        Ok(page(&["a"], None, Some("t1"))),
        Err(ScraperError::ApiLogic("bad token".to_string())),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let result = collect_pages(
        &source,
        PaginationState::first_token_page(),
        &executor(&sleeper),
        &options(0),
        &mut |_: &Progress| {},
    )
    .await;

    assert!(matches!(result, Err(ScraperError::ApiLogic(_))));
}

#[tokio::test]
async fn cycling_token_hits_page_limit() {
    let script = (0..10)
        .map(|i| {
            let id = i.to_string();
            Ok(page(&[id.as_str()], None, Some("same")))
        })
        .collect();
    let source = ScriptedSource::new(script);
    let sleeper = Arc::new(RecordingSleeper::new());
    let opts = CollectOptions {
        inter_page_delay: Duration::ZERO,
        max_pages: 3,
    };

    let result = collect_pages(
        &source,
        PaginationState::first_token_page(),
        &executor(&sleeper),
        &opts,
        &mut |_: &Progress| {},
    )
    .await;

    assert!(matches!(
        result,
        Err(ScraperError::PaginationLimit { max_pages: 3 })
    ));
    assert_eq!(source.requests().len(), 3);
}

#[tokio::test]
async fn cancelled_executor_stops_collection() {
    let source = ScriptedSource::new(vec![Ok(page(&["a"], None, Some("t1")))]);
    let sleeper = Arc::new(RecordingSleeper::new());
    let exec = executor(&sleeper);
    exec.cancellation().cancel();

    let result = collect_pages(
        &source,
        PaginationState::first_token_page(),
        &exec,
        &options(0),
        &mut |_: &Progress| {},
    )
    .await;

    assert!(matches!(result, Err(ScraperError::Cancelled)));
    assert!(source.requests().is_empty());
}
