//! Transaction submission boundary.
//!
//! The service hands signed tx bytes to a [`TxSubmitter`] and gets the tx
//! hash back. Completion is reported through the optional `on_fulfill`
//! callback, which receives the finalized result exactly once.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::registry::ChainRegistry;
use crate::tracer::{HttpTracerFactory, JsonRpcCaller, TxTracerFactory};
use crate::types::TxResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    Async,
    #[default]
    Sync,
    Block,
}

impl BroadcastMode {
    fn rpc_method(self) -> &'static str {
        match self {
            Self::Async => "broadcast_tx_async",
            Self::Sync => "broadcast_tx_sync",
            Self::Block => "broadcast_tx_commit",
        }
    }
}

pub type FulfillFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Invoked once with the finalized result of a submitted tx.
pub type OnFulfill = Box<dyn FnOnce(TxResult) -> FulfillFuture + Send>;

#[derive(Default)]
pub struct SendTxOptions {
    /// Suppress user-facing notices about the submission.
    pub silent: bool,
    pub on_fulfill: Option<OnFulfill>,
}

#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Broadcast `tx` on `chain_id` and return the raw tx hash.
    async fn send_tx(
        &self,
        chain_id: &str,
        tx: Vec<u8>,
        mode: BroadcastMode,
        options: SendTxOptions,
    ) -> Result<Vec<u8>, CoreError>;
}

// ==============================================================================
// CometBFT Submitter
// ==============================================================================

/// Broadcasts over CometBFT JSON-RPC and follows inclusion with a tracer
/// from the same factory, so both share one connection pool and rate limit.
pub struct CometTxSubmitter {
    registry: Arc<dyn ChainRegistry>,
    caller: Arc<JsonRpcCaller>,
    tracers: Arc<dyn TxTracerFactory>,
}

impl CometTxSubmitter {
    pub fn new(registry: Arc<dyn ChainRegistry>, tracers: Arc<HttpTracerFactory>) -> Self {
        Self {
            registry,
            caller: tracers.caller(),
            tracers,
        }
    }
}

#[async_trait]
impl TxSubmitter for CometTxSubmitter {
    async fn send_tx(
        &self,
        chain_id: &str,
        tx: Vec<u8>,
        mode: BroadcastMode,
        options: SendTxOptions,
    ) -> Result<Vec<u8>, CoreError> {
        let chain = self
            .registry
            .chain_info(chain_id)
            .ok_or_else(|| CoreError::ChainNotFound(chain_id.to_owned()))?;

        let result = self
            .caller
            .broadcast_tx(&chain.rpc, mode.rpc_method(), &tx)
            .await
            .map_err(|e| CoreError::SubmissionFailed(e.to_string()))?;
        if result.code != 0 {
            return Err(CoreError::SubmissionFailed(format!(
                "check_tx code {}: {}",
                result.code, result.log
            )));
        }

        let hash = hex::decode(&result.hash)
            .map_err(|e| CoreError::InvalidTxHash(format!("{}: {e}", result.hash)))?;
        if options.silent {
            debug!(chain_id = %chain.chain_id, tx.hash = %result.hash, "tx broadcast");
        } else {
            info!(chain_id = %chain.chain_id, tx.hash = %result.hash, ?mode, "tx broadcast");
        }

        if let Some(on_fulfill) = options.on_fulfill {
            let mut tracer = self.tracers.open(&chain.rpc);
            let hash = hash.clone();
            tokio::spawn(async move {
                let traced = tracer.trace_tx(&hash).await;
                tracer.close();
                match traced {
                    Ok(tx) => on_fulfill(tx).await,
                    Err(e) => {
                        warn!(tx.hash = %hex::encode(&hash), error = %e, "gave up waiting for tx inclusion");
                    }
                }
            });
        }

        Ok(hash)
    }
}

// ==============================================================================
// Test Submitter
// ==============================================================================

#[cfg(test)]
pub mod mock {
    use std::sync::Mutex;

    use super::*;

    /// Returns a fixed hash, or a scripted failure. When `fulfill_with` is
    /// set the callback runs before `send_tx` returns.
    #[derive(Default)]
    pub struct MockSubmitter {
        pub hash: Vec<u8>,
        pub failure: Option<String>,
        pub fulfill_with: Mutex<Option<TxResult>>,
        pub sent: Mutex<Vec<(String, Vec<u8>, BroadcastMode)>>,
    }

    impl MockSubmitter {
        pub fn returning(hash: Vec<u8>) -> Self {
            Self {
                hash,
                ..Self::default()
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                failure: Some(message.to_owned()),
                ..Self::default()
            }
        }

        pub fn fulfill_with(self, tx: TxResult) -> Self {
            *self.fulfill_with.lock().unwrap_or_else(|e| e.into_inner()) = Some(tx);
            self
        }

        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).len()
        }
    }

    #[async_trait]
    impl TxSubmitter for MockSubmitter {
        async fn send_tx(
            &self,
            chain_id: &str,
            tx: Vec<u8>,
            mode: BroadcastMode,
            options: SendTxOptions,
        ) -> Result<Vec<u8>, CoreError> {
            if let Some(message) = &self.failure {
                return Err(CoreError::SubmissionFailed(message.clone()));
            }
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((chain_id.to_owned(), tx, mode));

            let fulfilled = self
                .fulfill_with
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let (Some(on_fulfill), Some(tx)) = (options.on_fulfill, fulfilled) {
                on_fulfill(tx).await;
            }
            Ok(self.hash.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modes_map_to_broadcast_methods() {
        assert_eq!(BroadcastMode::Async.rpc_method(), "broadcast_tx_async");
        assert_eq!(BroadcastMode::Sync.rpc_method(), "broadcast_tx_sync");
        assert_eq!(BroadcastMode::Block.rpc_method(), "broadcast_tx_commit");
    }

    #[test]
    fn mode_parses_from_lowercase() {
        let mode: BroadcastMode = serde_json::from_str("\"block\"").expect("mode parses");
        assert_eq!(mode, BroadcastMode::Block);
        assert_eq!(BroadcastMode::default(), BroadcastMode::Sync);
    }

    #[tokio::test]
    async fn unknown_chain_is_rejected_before_broadcast() {
        let registry = Arc::new(crate::registry::StaticChainRegistry::new([]));
        let tracers = Arc::new(
            HttpTracerFactory::new(crate::tracer::TracerConfig::default()).expect("factory builds"),
        );
        let submitter = CometTxSubmitter::new(registry, tracers);

        let err = submitter
            .send_tx("osmosis-1", vec![1, 2, 3], BroadcastMode::Sync, SendTxOptions::default())
            .await
            .expect_err("unknown chain must fail");
        assert!(matches!(err, CoreError::ChainNotFound(_)));
    }
}
