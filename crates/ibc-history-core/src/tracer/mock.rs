use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::CoreError;
use crate::types::TxResult;

use super::{EventQuery, TxTracer, TxTracerFactory};

/// A scripted tracer backend for testing. Finalized txs are keyed by
/// `(rpc, lowercase hex hash)` and query results by `(rpc, query string)`.
///
/// Unscripted hashes never resolve, like a tx that is never included.
/// Unscripted queries resolve to `None`.
#[derive(Clone, Default)]
pub struct MockTracerFactory {
    state: Arc<MockState>,
}

#[derive(Default)]
struct MockState {
    txs: Mutex<HashMap<(String, String), TxResult>>,
    queries: Mutex<HashMap<(String, String), Vec<TxResult>>>,
    issued_queries: Mutex<Vec<(String, String)>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl MockTracerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tx(&self, rpc: &str, tx: TxResult) {
        let key = (rpc.to_owned(), tx.hash.to_ascii_lowercase());
        lock(&self.state.txs).insert(key, tx);
    }

    pub fn set_query_result(&self, rpc: &str, query: &EventQuery, txs: Vec<TxResult>) {
        lock(&self.state.queries).insert((rpc.to_owned(), query.to_query_string()), txs);
    }

    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    /// `(rpc, query)` pairs in the order they were traced.
    pub fn issued_queries(&self) -> Vec<(String, String)> {
        lock(&self.state.issued_queries).clone()
    }
}

impl TxTracerFactory for MockTracerFactory {
    fn open(&self, rpc_endpoint: &str) -> Box<dyn TxTracer> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Box::new(MockTracer {
            state: Arc::clone(&self.state),
            rpc: rpc_endpoint.to_owned(),
            closed: false,
        })
    }
}

struct MockTracer {
    state: Arc<MockState>,
    rpc: String,
    closed: bool,
}

#[async_trait]
impl TxTracer for MockTracer {
    async fn trace_tx(&mut self, hash: &[u8]) -> Result<TxResult, CoreError> {
        let key = (self.rpc.clone(), hex::encode(hash));
        let found = lock(&self.state.txs).get(&key).cloned();
        match found {
            Some(tx) => Ok(tx),
            None => std::future::pending().await,
        }
    }

    async fn trace_query(
        &mut self,
        query: &EventQuery,
    ) -> Result<Option<Vec<TxResult>>, CoreError> {
        let key = (self.rpc.clone(), query.to_query_string());
        lock(&self.state.issued_queries).push(key.clone());
        Ok(lock(&self.state.queries).get(&key).cloned())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
