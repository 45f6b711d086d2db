use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    error::AppResult,
    middleware::{CurrentUser, RequestId},
    models::SearchRecord,
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct RecordSearchRequest {
    pub keyword: String,
    /// Set when the search box was in author mode
    #[serde(default)]
    pub by_author: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Records one search for the current reader
pub async fn record_search(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CurrentUser(user_id): CurrentUser,
    Json(request): Json<RecordSearchRequest>,
) -> AppResult<(StatusCode, Json<SearchRecord>)> {
    tracing::info!(%request_id, user_id, "Recording search");

    let record = state
        .search_history
        .record(user_id, &request.keyword, request.by_author, Utc::now())
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Lists the current reader's recent searches, newest first
pub async fn list_history(
    State(state): State<AppState>,
    CurrentUser(user_id): CurrentUser,
    Query(query): Query<HistoryQuery>,
) -> AppResult<Json<Vec<SearchRecord>>> {
    let history = state.search_history.history(user_id, query.limit).await?;
    Ok(Json(history))
}
