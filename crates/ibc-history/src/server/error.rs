use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use ibc_history_core::CoreError;

// ==============================================================================
// Error Type
// ==============================================================================

#[derive(Debug)]
pub(crate) enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Caller mistakes are 400s; anything a chain node rejected or garbled is
/// a 502.
pub(super) fn map_core_error(err: CoreError) -> AppError {
    match err {
        CoreError::AddressFormatInvalid { .. } | CoreError::ChainNotFound(_) => {
            AppError::BadRequest(err.to_string())
        }
        CoreError::SubmissionFailed(_)
        | CoreError::Rpc(_)
        | CoreError::InvalidTxHash(_)
        | CoreError::InvalidTxData(_)
        | CoreError::TxNotFound(_) => AppError::BadGateway(err.to_string()),
        other => AppError::Internal(other.to_string()),
    }
}
