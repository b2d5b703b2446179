use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::header;
use tracing::{debug, trace};

use crate::error::{CoreError, RpcError};
use crate::tracer::{EventQuery, TxTracer, TxTracerFactory};
use crate::types::TxResult;

use super::parsing::{
    parse_broadcast_response, parse_tx_response, parse_tx_search_response, BroadcastResult,
};
use super::protocol::{normalize_tx_error, parse_jsonrpc_error, JsonRpcRequest, JsonRpcResponse};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

// ==============================================================================
// Configuration
// ==============================================================================

#[derive(Debug, Clone)]
pub struct TracerConfig {
    /// Delay between polls while a tx or query has no result yet.
    pub poll_interval: Duration,
    /// Outbound request cap shared by every tracer of one factory.
    pub requests_per_second: Option<u32>,
    /// `per_page` for `tx_search`.
    pub search_page_size: u32,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            requests_per_second: None,
            search_page_size: 30,
        }
    }
}

// ==============================================================================
// JSON-RPC Transport
// ==============================================================================

/// Shared JSON-RPC transport: one `reqwest` pool, one rate limiter and one
/// request id sequence for every endpoint.
pub(crate) struct JsonRpcCaller {
    client: reqwest::Client,
    limiter: Option<DirectRateLimiter>,
    next_id: AtomicU64,
}

impl JsonRpcCaller {
    pub(crate) fn new(requests_per_second: Option<u32>) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .map_err(RpcError::Transport)?;

        let limiter = match requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    CoreError::InvalidTxData("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            limiter,
            next_id: AtomicU64::new(initial_request_id()),
        })
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    pub(crate) async fn call(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, CoreError> {
        self.wait_for_rate_limit().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(rpc.id = id, rpc.url = url, rpc.method = method, "rpc call");
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .json(&req)
            .send()
            .await
            .map_err(RpcError::Transport)?;
        let status = response.status();

        let body = response.text().await.map_err(RpcError::Transport)?;
        debug!(rpc.id = id, rpc.method = method, %status, body_len = body.len(), "rpc response");
        trace!(rpc.id = id, rpc.method = method, body = %body, "rpc response body");

        let decoded: JsonRpcResponse = serde_json::from_str(&body).map_err(|e| {
            RpcError::InvalidResponse(format!("decode JSON-RPC response: {e}; body={body}"))
        })?;

        if let Some(err) = decoded.error {
            return Err(parse_jsonrpc_error(err));
        }

        Ok(decoded.result.unwrap_or(serde_json::Value::Null))
    }

    /// Submit raw signed tx bytes with one of the `broadcast_tx_*` methods.
    pub(crate) async fn broadcast_tx(
        &self,
        url: &str,
        method: &str,
        tx: &[u8],
    ) -> Result<BroadcastResult, CoreError> {
        let raw = self
            .call(url, method, serde_json::json!({ "tx": STANDARD.encode(tx) }))
            .await?;
        parse_broadcast_response(raw)
    }
}

fn initial_request_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(1)
}

// ==============================================================================
// Tracer Factory
// ==============================================================================

pub struct HttpTracerFactory {
    caller: Arc<JsonRpcCaller>,
    poll_interval: Duration,
    search_page_size: u32,
}

impl HttpTracerFactory {
    pub fn new(config: TracerConfig) -> Result<Self, CoreError> {
        if config.search_page_size == 0 {
            return Err(CoreError::InvalidTxData(
                "search page size must be at least 1".to_owned(),
            ));
        }
        Ok(Self {
            caller: Arc::new(JsonRpcCaller::new(config.requests_per_second)?),
            poll_interval: config.poll_interval,
            search_page_size: config.search_page_size,
        })
    }

    pub(crate) fn caller(&self) -> Arc<JsonRpcCaller> {
        Arc::clone(&self.caller)
    }
}

impl TxTracerFactory for HttpTracerFactory {
    fn open(&self, rpc_endpoint: &str) -> Box<dyn TxTracer> {
        Box::new(HttpTxTracer {
            caller: Arc::clone(&self.caller),
            url: rpc_endpoint.trim_end_matches('/').to_owned(),
            poll_interval: self.poll_interval,
            search_page_size: self.search_page_size,
            closed: false,
        })
    }
}

// ==============================================================================
// Polling Tracer
// ==============================================================================

/// Polls until the watched tx or query has a result. Transport failures and
/// "not indexed yet" answers are retried forever; only malformed results
/// end the watch with an error.
struct HttpTxTracer {
    caller: Arc<JsonRpcCaller>,
    url: String,
    poll_interval: Duration,
    search_page_size: u32,
    closed: bool,
}

impl HttpTxTracer {
    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.closed {
            return Err(RpcError::Closed.into());
        }
        Ok(())
    }
}

#[async_trait]
impl TxTracer for HttpTxTracer {
    async fn trace_tx(&mut self, hash: &[u8]) -> Result<TxResult, CoreError> {
        self.ensure_open()?;
        let hash_hex = hex::encode(hash);
        let params = serde_json::json!({ "hash": STANDARD.encode(hash), "prove": false });

        loop {
            match self
                .caller
                .call(&self.url, "tx", params.clone())
                .await
                .map_err(|e| normalize_tx_error(&hash_hex, e))
            {
                Ok(raw) => return parse_tx_response(raw),
                Err(CoreError::TxNotFound(_)) => {
                    trace!(rpc.url = %self.url, tx.hash = %hash_hex, "tx not indexed yet");
                }
                Err(e) => {
                    debug!(rpc.url = %self.url, tx.hash = %hash_hex, error = %e, "tx poll failed; retrying");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn trace_query(
        &mut self,
        query: &EventQuery,
    ) -> Result<Option<Vec<TxResult>>, CoreError> {
        self.ensure_open()?;
        let params = serde_json::json!({
            "query": query.to_query_string(),
            "prove": false,
            "page": "1",
            "per_page": self.search_page_size.to_string(),
            "order_by": "asc",
        });

        loop {
            match self.caller.call(&self.url, "tx_search", params.clone()).await {
                Ok(raw) => {
                    let txs = parse_tx_search_response(raw)?;
                    if !txs.is_empty() {
                        return Ok(Some(txs));
                    }
                    trace!(rpc.url = %self.url, %query, "no matching txs yet");
                }
                Err(e) => {
                    debug!(rpc.url = %self.url, %query, error = %e, "tx_search failed; retrying");
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
