//! Domain types for the IBC transfer history model.
//!
//! Contains the plain send records kept by the recency store
//! (`RecentSendHistory`), the multi-hop ledger records (`IbcHistory`,
//! `IbcHop`) and the finalized transaction shape produced by tracers
//! (`TxResult`, `TxEvent`, `EventAttribute`).
//!
//! Field names serialize in camelCase because persisted snapshots written by
//! earlier installations use that layout; renaming a field here breaks restore.

use serde::{Deserialize, Serialize};

// ==============================================================================
// Shared Pieces
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub amount: String,
    pub denom: String,
}

/// One leg of a packet path as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IbcChannel {
    pub port_id: String,
    pub channel_id: String,
    pub counterparty_chain_id: String,
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ==============================================================================
// Recency Store Records
// ==============================================================================

/// A completed plain send, immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSendHistory {
    pub timestamp: u64,
    pub sender: String,
    pub recipient: String,
    pub amount: Vec<Coin>,
    pub memo: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ibc_channels: Option<Vec<IbcChannel>>,
}

impl RecentSendHistory {
    /// Stamp a new entry with the current time.
    pub fn new(
        sender: String,
        recipient: String,
        amount: Vec<Coin>,
        memo: String,
        ibc_channels: Option<Vec<IbcChannel>>,
    ) -> Self {
        Self {
            timestamp: now_millis(),
            sender,
            recipient,
            amount,
            memo,
            ibc_channels,
        }
    }
}

// ==============================================================================
// Ledger Records
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwapType {
    AmountIn,
    AmountOut,
}

impl std::fmt::Display for SwapType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AmountIn => write!(f, "amount-in"),
            Self::AmountOut => write!(f, "amount-out"),
        }
    }
}

/// A single hop of a tracked transfer. Only `sequence` and `completed`
/// change after the record is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IbcHop {
    pub port_id: String,
    pub channel_id: String,
    pub counterparty_chain_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<String>,
    #[serde(default)]
    pub completed: bool,
}

impl From<&IbcChannel> for IbcHop {
    fn from(channel: &IbcChannel) -> Self {
        Self {
            port_id: channel.port_id.clone(),
            channel_id: channel.channel_id.clone(),
            counterparty_chain_id: channel.counterparty_chain_id.clone(),
            sequence: None,
            completed: false,
        }
    }
}

/// A cross-chain transfer tracked by the ledger.
///
/// Plain transfers carry `recipient`; swap-initiated transfers carry
/// `swap_type` instead. Hop tracking is identical for both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IbcHistory {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swap_type: Option<SwapType>,
    pub chain_id: String,
    pub destination_chain_id: String,
    pub timestamp: u64,
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    pub amount: Vec<Coin>,
    pub memo: String,
    /// Hops in path order. The key predates multi-hop swaps and is kept for
    /// snapshot compatibility.
    #[serde(rename = "ibcHistory")]
    pub hops: Vec<IbcHop>,
    /// Lowercase hex of the originating transaction hash.
    pub tx_hash: String,
    #[serde(default)]
    pub tx_fulfilled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_error: Option<String>,
}

/// Tracking state derived from an [`IbcHistory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    AwaitingSourceConfirmation,
    /// The packet left the source chain and hop `k` is not yet received.
    AdvancingHop(usize),
    Completed,
}

impl IbcHistory {
    pub fn state(&self) -> TransferState {
        if !self.tx_fulfilled {
            return TransferState::AwaitingSourceConfirmation;
        }
        match self.hops.iter().position(|hop| !hop.completed) {
            Some(k) => TransferState::AdvancingHop(k),
            None => TransferState::Completed,
        }
    }

    /// Whether `chain_id` appears as source, destination or any hop
    /// counterparty, compared by canonical identifier.
    pub fn references_chain(&self, identifier: &str) -> bool {
        use crate::chain_id::chain_identifier;

        chain_identifier(&self.chain_id) == identifier
            || chain_identifier(&self.destination_chain_id) == identifier
            || self
                .hops
                .iter()
                .any(|hop| chain_identifier(&hop.counterparty_chain_id) == identifier)
    }
}

// ==============================================================================
// Finalized Transactions
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttribute {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Vec<EventAttribute>,
}

/// A finalized transaction as reported by a chain node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxResult {
    /// Uppercase or lowercase hex, as the node reports it.
    pub hash: String,
    pub height: u64,
    pub code: u32,
    pub log: Option<String>,
    pub raw_log: Option<String>,
    pub events: Vec<TxEvent>,
}

impl TxResult {
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Failure text for a non-zero result: `log`, then `raw_log`, then a
    /// generic message. Empty strings fall through.
    pub fn error_message(&self) -> String {
        self.log
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.raw_log.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or("Unknown error")
            .to_string()
    }
}
