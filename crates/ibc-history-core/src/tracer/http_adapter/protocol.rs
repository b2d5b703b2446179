use crate::error::{CoreError, RpcError};

#[derive(serde::Serialize)]
pub(super) struct JsonRpcRequest<'a> {
    pub(super) jsonrpc: &'static str,
    pub(super) id: u64,
    pub(super) method: &'a str,
    pub(super) params: serde_json::Value,
}

#[derive(serde::Deserialize)]
pub(super) struct JsonRpcResponse {
    pub(super) result: Option<serde_json::Value>,
    pub(super) error: Option<serde_json::Value>,
}

/// Parse a JSON-RPC error value into a structured `CoreError`.
///
/// CometBFT reports `{"code", "message", "data"}` where `message` is generic
/// ("Internal error") and the useful text is in `data`, so both are kept.
pub(super) fn parse_jsonrpc_error(err: serde_json::Value) -> CoreError {
    #[derive(serde::Deserialize)]
    struct JsonRpcError {
        code: i64,
        message: String,
        #[serde(default)]
        data: Option<String>,
    }

    match serde_json::from_value::<JsonRpcError>(err.clone()) {
        Ok(parsed) => {
            let message = match parsed.data {
                Some(data) if !data.is_empty() => format!("{}: {data}", parsed.message),
                _ => parsed.message,
            };
            CoreError::Rpc(RpcError::ServerError {
                code: parsed.code,
                message,
            })
        }
        Err(_) => CoreError::Rpc(RpcError::InvalidResponse(format!(
            "non-standard JSON-RPC error: {err}"
        ))),
    }
}

/// `tx` answers "not found" through a generic internal error until the tx is
/// indexed; map that to `TxNotFound` so pollers can tell it apart.
pub(super) fn normalize_tx_error(hash_hex: &str, err: CoreError) -> CoreError {
    match err {
        CoreError::Rpc(RpcError::ServerError { message, .. })
            if message.to_ascii_lowercase().contains("not found") =>
        {
            CoreError::TxNotFound(hash_hex.to_owned())
        }
        other => other,
    }
}
