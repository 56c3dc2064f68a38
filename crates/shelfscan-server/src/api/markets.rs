use axum::{extract::State, Extension, Json};
use serde::Serialize;

use crate::middleware::RequestId;

use super::{ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Serialize)]
pub(super) struct MarketItem {
    code: String,
    name: Option<String>,
    family: &'static str,
}

pub(super) async fn list_markets(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Json<ApiResponse<Vec<MarketItem>>> {
    let data = state
        .markets
        .markets
        .iter()
        .map(|m| MarketItem {
            code: m.code.clone(),
            name: m.name.clone(),
            family: m.family(),
        })
        .collect();

    Json(ApiResponse {
        data,
        meta: ResponseMeta::new(req_id.0),
    })
}
