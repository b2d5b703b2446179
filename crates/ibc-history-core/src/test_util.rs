//! Shared test helpers for `ibc-history-core` unit tests.
//!
//! Builders for ledger records, finalized txs and packet events, plus a
//! [`Harness`] that wires an [`IbcHistoryService`] to a static registry,
//! scripted tracers and an in-memory store.

use std::sync::{Arc, Once};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bech32::{ToBase32, Variant};

use crate::chain_id::chain_identifier;
use crate::ledger::NewTransfer;
use crate::persist::MemoryKvStore;
use crate::registry::{ChainInfo, StaticChainRegistry};
use crate::service::IbcHistoryService;
use crate::submit::mock::MockSubmitter;
use crate::tracer::mock::MockTracerFactory;
use crate::types::{
    Coin, EventAttribute, IbcChannel, IbcHistory, IbcHop, RecentSendHistory, TxEvent, TxResult,
};

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Let spawned tasks run until they block.
pub async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

// ==============================================================================
// Chains and Addresses
// ==============================================================================

pub fn rpc_url(chain_id: &str) -> String {
    format!("http://{}.test:26657", chain_identifier(chain_id))
}

pub fn chain(chain_id: &str, prefix: &str) -> ChainInfo {
    ChainInfo {
        chain_id: chain_id.to_owned(),
        rpc: rpc_url(chain_id),
        bech32_prefix: prefix.to_owned(),
    }
}

/// A valid bech32 account address whose payload is 20 copies of `seed`.
pub fn address(prefix: &str, seed: u8) -> String {
    bech32::encode(prefix, [seed; 20].to_base32(), Variant::Bech32)
        .expect("test prefix is valid")
}

pub fn coin(amount: &str, denom: &str) -> Coin {
    Coin {
        amount: amount.to_owned(),
        denom: denom.to_owned(),
    }
}

pub fn channel(channel_id: &str, counterparty: &str) -> IbcChannel {
    IbcChannel {
        port_id: "transfer".to_owned(),
        channel_id: channel_id.to_owned(),
        counterparty_chain_id: counterparty.to_owned(),
    }
}

pub fn hop(channel_id: &str, counterparty: &str) -> IbcHop {
    IbcHop::from(&channel(channel_id, counterparty))
}

// ==============================================================================
// Records
// ==============================================================================

pub fn make_recent_send(timestamp: u64) -> RecentSendHistory {
    RecentSendHistory {
        timestamp,
        sender: address("osmo", 1),
        recipient: address("juno", 2),
        amount: vec![coin("1000", "uosmo")],
        memo: String::new(),
        ibc_channels: None,
    }
}

/// Transfer input with tx hash `abababab`. The destination is the last
/// hop's counterparty.
pub fn new_transfer(chain_id: &str, destination: &str, hops: &[(&str, &str)]) -> NewTransfer {
    NewTransfer {
        swap_type: None,
        chain_id: chain_id.to_owned(),
        destination_chain_id: destination.to_owned(),
        sender: address("osmo", 1),
        recipient: Some(address("juno", 2)),
        amount: vec![coin("1000", "uosmo")],
        memo: String::new(),
        channels: hops
            .iter()
            .map(|(channel_id, counterparty)| channel(channel_id, counterparty))
            .collect(),
        tx_hash: vec![0xab; 4],
    }
}

/// An untracked record as it would be persisted right after creation.
pub fn make_history(id: &str, chain_id: &str, hops: &[(&str, &str)]) -> IbcHistory {
    IbcHistory {
        id: id.to_owned(),
        swap_type: None,
        chain_id: chain_id.to_owned(),
        destination_chain_id: hops
            .last()
            .map_or(chain_id, |(_, counterparty)| *counterparty)
            .to_owned(),
        timestamp: 1_700_000_000_000,
        sender: address("osmo", 1),
        recipient: Some(address("juno", 2)),
        amount: vec![coin("1000", "uosmo")],
        memo: String::new(),
        hops: hops
            .iter()
            .map(|(channel_id, counterparty)| hop(channel_id, counterparty))
            .collect(),
        tx_hash: "abababab".to_owned(),
        tx_fulfilled: false,
        tx_error: None,
    }
}

// ==============================================================================
// Transactions and Events
// ==============================================================================

/// A finalized tx with hash `ABABABAB`, matching [`new_transfer`].
pub fn make_tx_result(code: u32, events: Vec<TxEvent>) -> TxResult {
    TxResult {
        hash: "ABABABAB".to_owned(),
        height: 100,
        code,
        log: None,
        raw_log: None,
        events,
    }
}

fn packet_event(kind: &str, port: &str, channel_id: &str, sequence: &str) -> TxEvent {
    TxEvent {
        kind: kind.to_owned(),
        attributes: [
            ("packet_src_port", port),
            ("packet_src_channel", channel_id),
            ("packet_sequence", sequence),
            ("packet_dst_port", "transfer"),
        ]
        .into_iter()
        .map(|(key, value)| EventAttribute {
            key: key.to_owned(),
            value: value.to_owned(),
        })
        .collect(),
    }
}

pub fn send_packet(port: &str, channel_id: &str, sequence: &str) -> TxEvent {
    packet_event("send_packet", port, channel_id, sequence)
}

pub fn recv_packet(port: &str, channel_id: &str, sequence: &str) -> TxEvent {
    packet_event("recv_packet", port, channel_id, sequence)
}

/// Re-encode every attribute key and value as base64, as older nodes do.
pub fn base64_event(mut event: TxEvent) -> TxEvent {
    for attr in &mut event.attributes {
        attr.key = STANDARD.encode(&attr.key);
        attr.value = STANDARD.encode(&attr.value);
    }
    event
}

// ==============================================================================
// Service Harness
// ==============================================================================

pub struct Harness {
    pub service: Arc<IbcHistoryService>,
    pub registry: Arc<StaticChainRegistry>,
    pub submitter: Arc<MockSubmitter>,
    pub tracers: MockTracerFactory,
    pub store: Arc<MemoryKvStore>,
}

/// Registry with osmosis, juno, stargaze and cosmoshub. Must run inside a
/// tokio runtime.
pub fn harness_with(submitter: MockSubmitter) -> Harness {
    harness_on_store(submitter, Arc::new(MemoryKvStore::new()))
}

pub fn harness_on_store(submitter: MockSubmitter, store: Arc<MemoryKvStore>) -> Harness {
    let registry = Arc::new(StaticChainRegistry::new([
        chain("osmosis-1", "osmo"),
        chain("juno-1", "juno"),
        chain("stargaze-1", "stars"),
        chain("cosmoshub-4", "cosmos"),
    ]));
    let submitter = Arc::new(submitter);
    let tracers = MockTracerFactory::new();
    let service = IbcHistoryService::new(
        registry.clone(),
        submitter.clone(),
        Arc::new(tracers.clone()),
        store.clone(),
    );
    Harness {
        service,
        registry,
        submitter,
        tracers,
        store,
    }
}
