use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use ibc_history_core::submit::BroadcastMode;
use ibc_history_core::types::IbcHistory;
use ibc_history_core::{SignedTx, SwapRequest, TransferRequest};

use super::auth::check_auth;
use super::error::{map_core_error, AppError};
use super::SharedState;

// ==============================================================================
// DTOs
// ==============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubmitTransferBody {
    #[serde(flatten)]
    request: TransferRequest,
    #[serde(flatten)]
    tx: TxBody,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubmitSwapBody {
    #[serde(flatten)]
    request: SwapRequest,
    #[serde(flatten)]
    tx: TxBody,
}

/// Signed tx as standard base64, plus broadcast options.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TxBody {
    tx: String,
    #[serde(default)]
    mode: BroadcastMode,
    #[serde(default)]
    silent: bool,
}

impl TxBody {
    fn decode(self) -> Result<SignedTx, AppError> {
        let bytes = STANDARD
            .decode(self.tx.trim())
            .map_err(|e| AppError::BadRequest(format!("tx must be base64: {e}")))?;
        if bytes.is_empty() {
            return Err(AppError::BadRequest("tx must not be empty".to_string()));
        }
        Ok(SignedTx {
            bytes,
            mode: self.mode,
            silent: self.silent,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SubmitResponse {
    tx_hash: String,
}

#[derive(Serialize)]
pub(super) struct TransfersResponse {
    transfers: Vec<IbcHistory>,
}

// ==============================================================================
// Ledger Handlers
// ==============================================================================

/// Records whose chains are all still registered, oldest first.
pub(super) async fn list_transfers(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<TransfersResponse>, AppError> {
    check_auth(&state.api_token, &headers)?;

    let transfers = state.service.get_recent_ibc_histories().await;
    Ok(Json(TransfersResponse { transfers }))
}

pub(super) async fn get_transfer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<IbcHistory>, AppError> {
    check_auth(&state.api_token, &headers)?;

    state
        .service
        .get_recent_ibc_history(&id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("transfer not found: {id}")))
}

pub(super) async fn delete_transfer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    check_auth(&state.api_token, &headers)?;

    if !state.service.remove_recent_ibc_history(&id).await {
        return Err(AppError::NotFound(format!("transfer not found: {id}")));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn clear_transfers(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    check_auth(&state.api_token, &headers)?;

    state.service.clear_all_recent_ibc_history().await;
    Ok(StatusCode::NO_CONTENT)
}

// ==============================================================================
// Submission Handlers
// ==============================================================================

pub(super) async fn submit_transfer(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<SubmitTransferBody>,
) -> Result<Json<SubmitResponse>, AppError> {
    check_auth(&state.api_token, &headers)?;

    let tx = body.tx.decode()?;
    let hash = state
        .service
        .send_tx_and_record(body.request, tx)
        .await
        .map_err(map_core_error)?;
    Ok(Json(SubmitResponse {
        tx_hash: hex::encode(hash),
    }))
}

pub(super) async fn submit_swap(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<SubmitSwapBody>,
) -> Result<Json<SubmitResponse>, AppError> {
    check_auth(&state.api_token, &headers)?;

    let tx = body.tx.decode()?;
    let hash = state
        .service
        .send_tx_and_record_ibc_swap(body.request, tx)
        .await
        .map_err(map_core_error)?;
    Ok(Json(SubmitResponse {
        tx_hash: hex::encode(hash),
    }))
}
