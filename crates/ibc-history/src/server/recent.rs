use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use ibc_history_core::types::RecentSendHistory;

use super::auth::check_auth;
use super::error::AppError;
use super::SharedState;

#[derive(Serialize)]
pub(super) struct RecentResponse {
    entries: Vec<RecentSendHistory>,
}

/// Newest first, at most 20.
pub(super) async fn list_recent(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path((chain_id, kind)): Path<(String, String)>,
) -> Result<Json<RecentResponse>, AppError> {
    check_auth(&state.api_token, &headers)?;

    let entries = state
        .service
        .get_recent_send_histories(&chain_id, &kind)
        .await;
    Ok(Json(RecentResponse { entries }))
}
