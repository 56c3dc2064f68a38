//! Integration tests for the GraphQL market client.
//!
//! Each test stands up a `wiremock` server in place of the GraphQL endpoint.
//! Requests are told apart by their `variables`, which a small custom
//! matcher reads out of the one-element payload array.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use shelfscan_scraper::{
    ClientSettings, GraphQlClient, GraphQlClientConfig, GraphQlOperation, Progress,
    RecordingSleeper, RetryExecutor, RetryPolicy, ScraperError, Sleeper,
};

/// Matches when `[0].variables.<name>` equals `value`.
struct Variable {
    name: &'static str,
    value: Value,
}

impl Match for Variable {
    fn matches(&self, request: &Request) -> bool {
        serde_json::from_slice::<Value>(&request.body)
            .ok()
            .and_then(|body| body.get(0)?.get("variables")?.get(self.name).cloned())
            .is_some_and(|v| v == self.value)
    }
}

fn variable(name: &'static str, value: impl Into<Value>) -> Variable {
    Variable {
        name,
        value: value.into(),
    }
}

fn operation(name: &str, mfe: &str) -> GraphQlOperation {
    GraphQlOperation {
        name: name.to_string(),
        mfe_name: mfe.to_string(),
        query: format!("query {name} {{ stub }}"),
    }
}

fn test_client(server: &MockServer, max_attempts: u32) -> (GraphQlClient, Arc<RecordingSleeper>) {
    let config = GraphQlClientConfig {
        endpoint: format!("{}/", server.uri()),
        api_key: "test-key".to_string(),
        headers: BTreeMap::from([("region".to_string(), "UK".to_string())]),
        taxonomy: operation("Taxonomy", "mfe-header"),
        products: operation("GetCategoryProducts", "mfe-plp"),
        product: operation("GetProduct", "mfe-pdp"),
        page_size: 2,
        product_id_variable: "tpnc".to_string(),
    };
    let settings = ClientSettings {
        timeout_secs: 5,
        user_agent: "shelfscan-test/0.1".to_string(),
        inter_page_delay: Duration::ZERO,
        ..ClientSettings::default()
    };
    let sleeper = Arc::new(RecordingSleeper::new());
    let executor = RetryExecutor::new(RetryPolicy::new(max_attempts, Duration::from_secs(1), 2.0))
        .with_sleeper(Arc::clone(&sleeper) as Arc<dyn Sleeper>);
    let client = GraphQlClient::new(config, settings, executor).expect("client should build");
    (client, sleeper)
}

fn listing_page(ids: &[&str], total: u64) -> Value {
    let results: Vec<Value> = ids
        .iter()
        .map(|id| {
            json!({"node": {
                "id": id,
                "title": format!("Product {id}"),
                "sellers": {"results": [{"price": {"price": 1.0, "unitPrice": 2.0, "unitOfMeasure": "kg"}}]}
            }})
        })
        .collect();
    json!([{"data": {"category": {
        "pageInformation": {"totalCount": total},
        "results": results
    }}}])
}

fn no_progress() -> impl FnMut(&Progress) + Send {
    |_: &Progress| {}
}

// ---------------------------------------------------------------------------
// Listing pagination
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_category_walks_every_offset_page() {
    let server = MockServer::start().await;
    for (page, ids) in [(1, vec!["1", "2"]), (2, vec!["3", "4"]), (3, vec!["5"])] {
        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("x-apikey", "test-key"))
            .and(header("region", "UK"))
            .and(variable("page", page))
            .and(variable("facet", "b;RnJlc2g="))
            .respond_with(ResponseTemplate::new(200).set_body_json(listing_page(&ids, 5)))
            .expect(1)
            .mount(&server)
            .await;
    }

    let (client, _) = test_client(&server, 1);
    let mut pages = Vec::new();
    let listing = client
        .fetch_category("b;RnJlc2g=", None, &mut |p: &Progress| pages.push(p.page))
        .await
        .expect("listing should succeed");

    assert_eq!(listing.records.len(), 5);
    assert_eq!(listing.scope, "b;RnJlc2g=");
    assert_eq!(pages, vec![1, 2, 3]);
    assert_eq!(listing.records[0].price.unit_of_measure.as_deref(), Some("kg"));
}

#[tokio::test]
async fn fetch_category_api_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "errors": [{"message": "Facet not found"}],
            "data": null
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let (client, sleeper) = test_client(&server, 5);
    let result = client
        .fetch_category("b;bad", None, &mut no_progress())
        .await;

    assert!(
        matches!(result, Err(ScraperError::ApiLogic(ref m)) if m == "Facet not found"),
        "got: {result:?}"
    );
    assert!(sleeper.delays().is_empty());
}

#[tokio::test]
async fn fetch_category_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_page(&["1"], 1)))
        .mount(&server)
        .await;

    let (client, sleeper) = test_client(&server, 5);
    let listing = client
        .fetch_category("b;RnJlc2g=", None, &mut no_progress())
        .await
        .expect("should succeed after retries");

    assert_eq!(listing.records.len(), 1);
    assert_eq!(
        sleeper.delays(),
        vec![Duration::from_secs(1), Duration::from_secs(2)]
    );
}

#[tokio::test]
async fn fetch_category_exhausted_retries_surface_last_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let (client, _) = test_client(&server, 3);
    let result = client
        .fetch_category("b;RnJlc2g=", None, &mut no_progress())
        .await;

    assert!(
        matches!(result, Err(ScraperError::UnexpectedStatus { status: 502, .. })),
        "got: {result:?}"
    );
}

#[tokio::test]
async fn fetch_category_rejects_non_array_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .expect(1)
        .mount(&server)
        .await;

    let (client, _) = test_client(&server, 3);
    let result = client
        .fetch_category("b;RnJlc2g=", None, &mut no_progress())
        .await;

    assert!(matches!(result, Err(ScraperError::MalformedEnvelope { .. })));
}

// ---------------------------------------------------------------------------
// Taxonomy and catalog
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fetch_categories_flattens_taxonomy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(variable("includeChildren", true))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"data": {"taxonomy": [
            {"id": "sd1", "name": "Fresh Food", "children": [{"id": "d1", "name": "Fruit"}]}
        ]}}])))
        .mount(&server)
        .await;

    let (client, _) = test_client(&server, 1);
    let nodes = client.fetch_categories().await.expect("taxonomy");

    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes["d1"].parent_id.as_deref(), Some("sd1"));
}

#[tokio::test]
async fn fetch_catalog_reports_failing_codes_without_dropping_others() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(variable("tpnc", "2510"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"data": {"product": {
            "id": "312",
            "tpnc": "2510",
            "title": "Bananas",
            "price": {"actual": 0.2, "unitPrice": 0.9, "unitOfMeasure": "kg"}
        }}}])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(variable("tpnc", "9999"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "errors": [{"message": "Product not found"}]
        }])))
        .mount(&server)
        .await;

    let (client, _) = test_client(&server, 2);
    let codes = vec!["2510".to_string(), "9999".to_string()];
    let result = client.fetch_catalog(&codes).await.expect("catalog");

    assert_eq!(result.records.len(), 1);
    assert_eq!(result.records[0].id(), "312");
    assert_eq!(result.records[0].price.amount, Some(0.2));
    assert_eq!(result.errors, vec!["9999".to_string()]);
}

#[tokio::test]
async fn fetch_catalog_with_no_codes_issues_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let (client, _) = test_client(&server, 1);
    let result = client.fetch_catalog(&[]).await.expect("catalog");

    assert!(result.records.is_empty());
    assert!(result.errors.is_empty());
}
