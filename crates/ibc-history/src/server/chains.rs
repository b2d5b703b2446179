use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use ibc_history_core::registry::ChainRegistry;

use super::auth::check_auth;
use super::error::AppError;
use super::SharedState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RemoveChainResponse {
    chain_id: String,
    removed_transfers: Vec<String>,
}

/// Deregister a chain. Transfers touching it are dropped before the registry
/// announces the removal, so the ids reported here are never lost to the
/// service's own removal listener. That listener still runs afterwards and
/// catches any transfer recorded in between.
pub(super) async fn remove_chain(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(chain_id): Path<String>,
) -> Result<Json<RemoveChainResponse>, AppError> {
    check_auth(&state.api_token, &headers)?;

    let info = state
        .registry
        .chain_info(&chain_id)
        .ok_or_else(|| AppError::NotFound(format!("chain not found: {chain_id}")))?;
    let removed_transfers = state.service.on_chain_removed(&info.chain_id).await;
    state.registry.remove_chain(&info.chain_id);

    Ok(Json(RemoveChainResponse {
        chain_id: info.chain_id,
        removed_transfers,
    }))
}
