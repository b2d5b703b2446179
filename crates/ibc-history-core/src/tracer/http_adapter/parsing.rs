use serde::Deserialize;

use crate::error::CoreError;
use crate::types::{EventAttribute, TxEvent, TxResult};

#[derive(Deserialize)]
struct TxResponse {
    hash: String,
    height: serde_json::Value,
    tx_result: ExecResult,
}

#[derive(Deserialize)]
struct ExecResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: Option<String>,
    #[serde(default)]
    raw_log: Option<String>,
    #[serde(default)]
    events: Vec<RawEvent>,
}

#[derive(Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    attributes: Vec<RawAttribute>,
}

// Older nodes emit `null` for empty keys or values.
#[derive(Deserialize)]
struct RawAttribute {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
struct TxSearchResponse {
    #[serde(default)]
    txs: Vec<serde_json::Value>,
}

/// Parse a `tx` result into a [`TxResult`]. Attribute text is kept exactly
/// as reported; decoding is left to the event matchers.
pub(super) fn parse_tx_response(raw: serde_json::Value) -> Result<TxResult, CoreError> {
    let response: TxResponse = serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidTxData(format!("invalid tx result: {e}")))?;

    let height = parse_u64_lenient(&response.height, "height")?;
    let events = response
        .tx_result
        .events
        .into_iter()
        .map(|event| TxEvent {
            kind: event.kind,
            attributes: event
                .attributes
                .into_iter()
                .map(|attr| EventAttribute {
                    key: attr.key.unwrap_or_default(),
                    value: attr.value.unwrap_or_default(),
                })
                .collect(),
        })
        .collect();

    Ok(TxResult {
        hash: response.hash,
        height,
        code: response.tx_result.code,
        log: response.tx_result.log,
        raw_log: response.tx_result.raw_log,
        events,
    })
}

/// Parse a `tx_search` result, preserving the node's ordering.
pub(super) fn parse_tx_search_response(raw: serde_json::Value) -> Result<Vec<TxResult>, CoreError> {
    let response: TxSearchResponse = serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidTxData(format!("invalid tx_search result: {e}")))?;
    response.txs.into_iter().map(parse_tx_response).collect()
}

/// `CheckTx` outcome of a `broadcast_tx_*` call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct BroadcastResult {
    #[serde(default)]
    pub(crate) code: u32,
    #[serde(default)]
    pub(crate) log: String,
    pub(crate) hash: String,
}

#[derive(Deserialize)]
struct CommitResponse {
    check_tx: CheckTx,
    hash: String,
}

#[derive(Deserialize)]
struct CheckTx {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
}

/// `broadcast_tx_sync`/`_async` answer with a flat result; `_commit` nests
/// the CheckTx outcome under `check_tx`.
pub(super) fn parse_broadcast_response(raw: serde_json::Value) -> Result<BroadcastResult, CoreError> {
    if raw.get("check_tx").is_some() {
        let commit: CommitResponse = serde_json::from_value(raw)
            .map_err(|e| CoreError::InvalidTxData(format!("invalid commit result: {e}")))?;
        return Ok(BroadcastResult {
            code: commit.check_tx.code,
            log: commit.check_tx.log,
            hash: commit.hash,
        });
    }
    serde_json::from_value(raw)
        .map_err(|e| CoreError::InvalidTxData(format!("invalid broadcast result: {e}")))
}

/// CometBFT encodes 64-bit integers as JSON strings; some proxies rewrite
/// them as numbers.
fn parse_u64_lenient(value: &serde_json::Value, field: &str) -> Result<u64, CoreError> {
    match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| CoreError::InvalidTxData(format!("{field} out of range: {n}"))),
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|e| CoreError::InvalidTxData(format!("invalid {field} `{s}`: {e}"))),
        other => Err(CoreError::InvalidTxData(format!(
            "invalid {field}: {other}"
        ))),
    }
}
