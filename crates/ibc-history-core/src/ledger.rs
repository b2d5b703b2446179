use std::collections::{BTreeMap, HashMap};

use crate::chain_id::chain_identifier;
use crate::types::{now_millis, Coin, IbcChannel, IbcHistory, IbcHop, SwapType};

// ==============================================================================
// New Transfer Input
// ==============================================================================

/// Everything needed to open a ledger record for a broadcast transfer.
/// Exactly one of `recipient` (plain transfer) or `swap_type` (swap) is set.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub swap_type: Option<SwapType>,
    pub chain_id: String,
    pub destination_chain_id: String,
    pub sender: String,
    pub recipient: Option<String>,
    pub amount: Vec<Coin>,
    pub memo: String,
    pub channels: Vec<IbcChannel>,
    pub tx_hash: Vec<u8>,
}

// ==============================================================================
// Transfer Ledger
// ==============================================================================

/// Tracked transfers keyed by a monotonically increasing numeric id.
///
/// Records are held in numeric id order, which is allocation order, so
/// iteration is oldest first regardless of how a snapshot was ordered.
#[derive(Debug, Clone, Default)]
pub struct TransferLedger {
    seq: u64,
    histories: BTreeMap<u64, IbcHistory>,
}

impl TransferLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id to be allocated.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.seq;
        self.seq += 1;
        id
    }

    /// Insert a fresh record: all hops incomplete with unknown sequence,
    /// source tx not yet fulfilled. Returns the new id.
    pub fn create(&mut self, transfer: NewTransfer) -> String {
        let id = self.allocate_id();
        let history = IbcHistory {
            id: id.to_string(),
            swap_type: transfer.swap_type,
            chain_id: transfer.chain_id,
            destination_chain_id: transfer.destination_chain_id,
            timestamp: now_millis(),
            sender: transfer.sender,
            recipient: transfer.recipient,
            amount: transfer.amount,
            memo: transfer.memo,
            hops: transfer.channels.iter().map(IbcHop::from).collect(),
            tx_hash: hex::encode(&transfer.tx_hash),
            tx_fulfilled: false,
            tx_error: None,
        };
        self.histories.insert(id, history);
        id.to_string()
    }

    pub fn get(&self, id: &str) -> Option<&IbcHistory> {
        self.histories.get(&parse_id(id)?)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut IbcHistory> {
        self.histories.get_mut(&parse_id(id)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IbcHistory> {
        self.histories.values()
    }

    pub fn len(&self) -> usize {
        self.histories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }

    /// Records whose source, destination and every hop counterparty pass
    /// `has_chain`. Filtering never deletes.
    pub fn visible<'a, F>(&'a self, has_chain: F) -> impl Iterator<Item = &'a IbcHistory> + 'a
    where
        F: Fn(&str) -> bool + 'a,
    {
        self.histories.values().filter(move |history| {
            has_chain(&history.chain_id)
                && has_chain(&history.destination_chain_id)
                && history
                    .hops
                    .iter()
                    .all(|hop| has_chain(&hop.counterparty_chain_id))
        })
    }

    pub fn remove(&mut self, id: &str) -> bool {
        parse_id(id)
            .and_then(|key| self.histories.remove(&key))
            .is_some()
    }

    pub fn clear(&mut self) {
        self.histories.clear();
    }

    /// Delete every record that references `chain_id` by canonical identifier
    /// and return the removed ids.
    pub fn remove_referencing(&mut self, chain_id: &str) -> Vec<String> {
        let identifier = chain_identifier(chain_id);
        let removing: Vec<u64> = self
            .histories
            .iter()
            .filter(|(_, history)| history.references_chain(identifier))
            .map(|(key, _)| *key)
            .collect();

        removing
            .into_iter()
            .filter_map(|key| self.histories.remove(&key))
            .map(|history| history.id)
            .collect()
    }

    // ========================================================================
    // Snapshot restore / export
    // ========================================================================

    /// Restore the id counter. Never moves it backwards past an id already
    /// present in the ledger.
    pub fn restore_seq(&mut self, seq: u64) {
        let floor = self.histories.keys().next_back().map_or(0, |max| max + 1);
        self.seq = seq.max(floor).max(self.seq);
    }

    /// Restore records from a persisted map. Snapshot key order is not
    /// meaningful; records land in numeric id order. Entries whose id is not
    /// numeric cannot be ordered and are skipped.
    pub fn restore_histories(&mut self, snapshot: HashMap<String, IbcHistory>) {
        for (key, history) in snapshot {
            match parse_id(&history.id) {
                Some(id) => {
                    self.histories.insert(id, history);
                }
                None => {
                    tracing::warn!(key = %key, id = %history.id, "skipping ledger entry with non-numeric id");
                }
            }
        }
        self.restore_seq(self.seq);
    }

    pub fn histories_snapshot(&self) -> HashMap<&str, &IbcHistory> {
        self.histories
            .values()
            .map(|history| (history.id.as_str(), history))
            .collect()
    }
}

fn parse_id(id: &str) -> Option<u64> {
    id.parse().ok()
}
