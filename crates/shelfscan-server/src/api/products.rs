use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Serialize;
use shelfscan_core::ProductRecord;
use shelfscan_scraper::{CancellationToken, MarketClient};

use crate::middleware::RequestId;

use super::{map_scraper_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Default, Serialize)]
pub(super) struct ScrapeData {
    products: Vec<ProductRecord>,
    /// Requested ids that failed or were not returned.
    errors: Vec<String>,
}

/// Fetches the posted product ids from one market.
///
/// Per-id failures are reported in `errors` with a 200; only an unknown
/// market or a failed connection fails the whole request.
pub(super) async fn scrape_products(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(market_code): Path<String>,
    Json(ids): Json<Vec<String>>,
) -> Result<Json<ApiResponse<ScrapeData>>, ApiError> {
    let Some(market) = state.markets.find(&market_code) else {
        return Err(ApiError::new(
            req_id.0,
            "not_found",
            format!("unknown market '{market_code}'"),
        ));
    };

    if ids.is_empty() {
        return Ok(Json(ApiResponse {
            data: ScrapeData::default(),
            meta: ResponseMeta::new(req_id.0),
        }));
    }

    tracing::info!(market = %market.code, ids = ids.len(), "scrape requested");
    let client = MarketClient::connect(market, &state.settings, CancellationToken::new())
        .await
        .map_err(|e| map_scraper_error(req_id.0.clone(), &e))?;
    let result = client
        .fetch_catalog(&ids)
        .await
        .map_err(|e| map_scraper_error(req_id.0.clone(), &e))?;

    if !result.errors.is_empty() {
        tracing::warn!(market = %market.code, failed = result.errors.len(), "scrape finished with errors");
    }

    Ok(Json(ApiResponse {
        data: ScrapeData {
            products: result.records,
            errors: result.errors,
        },
        meta: ResponseMeta::new(req_id.0),
    }))
}
