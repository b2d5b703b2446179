#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server error (code {code}): {message}")]
    ServerError { code: i64, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("tracer closed before resolution")]
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("RPC communication failure: {0}")]
    Rpc(#[from] RpcError),

    #[error("chain not found: {0}")]
    ChainNotFound(String),

    #[error("invalid address `{address}` (expected prefix `{expected_prefix}`): {reason}")]
    AddressFormatInvalid {
        address: String,
        expected_prefix: String,
        reason: String,
    },

    #[error("transaction submission failed: {0}")]
    SubmissionFailed(String),

    #[error("transaction not found: {0}")]
    TxNotFound(String),

    #[error("invalid tx hash: {0}")]
    InvalidTxHash(String),

    #[error("invalid transaction data: {0}")]
    InvalidTxData(String),

    #[error("packet event extraction failed: {0}")]
    EventExtraction(String),

    #[error("first hop sequence not found for transfer {id}: {reason}")]
    UnmatchedInitialHop { id: String, reason: String },

    #[error("persistence failure: {0}")]
    Store(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
