//! CometBFT JSON-RPC tracer.
//!
//! Implements [`TxTracer`](super::TxTracer) by polling the `tx` and
//! `tx_search` methods over HTTP with `reqwest`, with optional request rate
//! limiting shared by every tracer a factory opens.

mod client;
mod parsing;
mod protocol;

pub use client::{HttpTracerFactory, TracerConfig};
pub(crate) use client::JsonRpcCaller;
