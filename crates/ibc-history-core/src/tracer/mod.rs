//! Chain event tracer abstraction layer.
//!
//! A tracer is a short-lived handle against one chain's RPC endpoint. The
//! tracker opens one per watch step, awaits exactly one resolution, and
//! closes it. [`TxTracerFactory`] opens tracers; [`HttpTracerFactory`] is the
//! CometBFT JSON-RPC implementation and `mock::MockTracerFactory` the test
//! double.

mod http_adapter;
#[cfg(test)]
pub mod mock;

pub use http_adapter::{HttpTracerFactory, TracerConfig};
pub(crate) use http_adapter::JsonRpcCaller;

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::TxResult;

// ==============================================================================
// Event Query
// ==============================================================================

/// A conjunction of `event.attribute = value` conditions, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pairs: Vec<(String, String)>,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.pairs.push((key.into(), value.into()));
        self
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Render in the CometBFT query language.
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| format!("{key}='{value}'"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

impl std::fmt::Display for EventQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_query_string())
    }
}

// ==============================================================================
// Tracer Traits
// ==============================================================================

/// One watch against one chain. Each method resolves once; after `close`
/// every call fails with `RpcError::Closed`.
#[async_trait]
pub trait TxTracer: Send {
    /// Wait until the transaction with `hash` is finalized.
    async fn trace_tx(&mut self, hash: &[u8]) -> Result<TxResult, CoreError>;

    /// Wait for transactions matching `query`. `None` means the watch ended
    /// without a match.
    async fn trace_query(&mut self, query: &EventQuery)
        -> Result<Option<Vec<TxResult>>, CoreError>;

    fn close(&mut self);
}

pub trait TxTracerFactory: Send + Sync {
    fn open(&self, rpc_endpoint: &str) -> Box<dyn TxTracer>;
}
