//! The history service: owns the recency store and the transfer ledger,
//! submits transfers, and drives tracking.
//!
//! All state sits behind one lock. Every mutation happens under the write
//! guard and schedules full snapshots of what it touched before the guard
//! is released, so the snapshot order always matches the mutation order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::address::validate_bech32_address;
use crate::error::CoreError;
use crate::ledger::{NewTransfer, TransferLedger};
use crate::persist::{
    KvStore, SnapshotWriter, IBC_HISTORY_MAP_KEY, IBC_HISTORY_SEQ_KEY, RECENT_SEND_HISTORY_KEY,
};
use crate::recent::RecentSendStore;
use crate::registry::{ChainInfo, ChainRegistry};
use crate::submit::{BroadcastMode, FulfillFuture, OnFulfill, SendTxOptions, TxSubmitter};
use crate::tracer::TxTracerFactory;
use crate::types::{Coin, IbcChannel, IbcHistory, RecentSendHistory, SwapType, TxResult};

// ==============================================================================
// Requests
// ==============================================================================

/// A plain transfer to submit and record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Recency bucket tag, e.g. `basic-send`.
    pub kind: String,
    pub source_chain_id: String,
    pub destination_chain_id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: Vec<Coin>,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub ibc_channels: Option<Vec<IbcChannel>>,
}

/// A swap whose output travels over IBC. The receiver is determined by the
/// swap route, so there is no recipient to validate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    pub swap_type: SwapType,
    pub source_chain_id: String,
    pub destination_chain_id: String,
    pub sender: String,
    pub amount: Vec<Coin>,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub ibc_channels: Option<Vec<IbcChannel>>,
}

/// Signed tx bytes and how to broadcast them.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub bytes: Vec<u8>,
    pub mode: BroadcastMode,
    pub silent: bool,
}

// ==============================================================================
// Service
// ==============================================================================

#[derive(Default)]
pub(crate) struct HistoryState {
    pub(crate) recent: RecentSendStore,
    pub(crate) ledger: TransferLedger,
}

pub struct IbcHistoryService {
    pub(crate) registry: Arc<dyn ChainRegistry>,
    submitter: Arc<dyn TxSubmitter>,
    pub(crate) tracers: Arc<dyn TxTracerFactory>,
    store: Arc<dyn KvStore>,
    writer: SnapshotWriter,
    pub(crate) state: RwLock<HistoryState>,
    /// Ids with a running tracking driver.
    pub(crate) in_flight: Mutex<HashSet<String>>,
}

impl IbcHistoryService {
    /// Build an empty service. Spawns the snapshot writer, so this must run
    /// inside a tokio runtime. Call [`init`](Self::init) before use.
    pub fn new(
        registry: Arc<dyn ChainRegistry>,
        submitter: Arc<dyn TxSubmitter>,
        tracers: Arc<dyn TxTracerFactory>,
        store: Arc<dyn KvStore>,
    ) -> Arc<Self> {
        Arc::new(Self {
            registry,
            submitter,
            tracers,
            writer: SnapshotWriter::spawn(Arc::clone(&store)),
            store,
            state: RwLock::new(HistoryState::default()),
            in_flight: Mutex::new(HashSet::new()),
        })
    }

    /// Restore persisted state, resume tracking of every visible record and
    /// start listening for chain removals.
    pub async fn init(self: &Arc<Self>) -> Result<(), CoreError> {
        self.restore().await?;

        let ids: Vec<String> = self
            .get_recent_ibc_histories()
            .await
            .into_iter()
            .map(|history| history.id)
            .collect();
        info!(transfers = ids.len(), "history restored; resuming tracking");
        for id in ids {
            self.spawn_track(id);
        }

        self.spawn_removal_listener();
        Ok(())
    }

    /// Recency buckets first, then the id counter, then the ledger.
    async fn restore(&self) -> Result<(), CoreError> {
        let recent = decode_snapshot(self.store.get(RECENT_SEND_HISTORY_KEY).await?)?;
        let seq = decode_snapshot::<u64>(self.store.get(IBC_HISTORY_SEQ_KEY).await?)?;
        let histories = decode_snapshot(self.store.get(IBC_HISTORY_MAP_KEY).await?)?;

        let mut state = self.state.write().await;
        if let Some(recent) = recent {
            state.recent.restore(recent);
        }
        if let Some(seq) = seq {
            state.ledger.restore_seq(seq);
        }
        if let Some(histories) = histories {
            state.ledger.restore_histories(histories);
        }
        debug!(seq = state.ledger.seq(), transfers = state.ledger.len(), "snapshots loaded");
        Ok(())
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Validate both addresses, broadcast, and open a ledger record when the
    /// transfer crosses chains. The recency entry is added only once the tx
    /// executes successfully.
    pub async fn send_tx_and_record(
        self: &Arc<Self>,
        request: TransferRequest,
        tx: SignedTx,
    ) -> Result<Vec<u8>, CoreError> {
        let source = self.require_chain(&request.source_chain_id)?;
        validate_bech32_address(&request.sender, &source.bech32_prefix)?;
        let destination = self.require_chain(&request.destination_chain_id)?;
        validate_bech32_address(&request.recipient, &destination.bech32_prefix)?;

        let options = SendTxOptions {
            silent: tx.silent,
            on_fulfill: Some(self.record_send_on_fulfill(&request)),
        };
        let tx_hash = self
            .submitter
            .send_tx(&request.source_chain_id, tx.bytes, tx.mode, options)
            .await?;

        let channels = request.ibc_channels.unwrap_or_default();
        if !channels.is_empty() {
            self.add_recent_ibc_history(NewTransfer {
                swap_type: None,
                chain_id: request.source_chain_id,
                destination_chain_id: request.destination_chain_id,
                sender: request.sender,
                recipient: Some(request.recipient),
                amount: request.amount,
                memo: request.memo,
                channels,
                tx_hash: tx_hash.clone(),
            })
            .await;
        }

        Ok(tx_hash)
    }

    /// Swap variant: only the sender is validated, the destination chain
    /// must still be known, and nothing is added to the recency store.
    pub async fn send_tx_and_record_ibc_swap(
        self: &Arc<Self>,
        request: SwapRequest,
        tx: SignedTx,
    ) -> Result<Vec<u8>, CoreError> {
        let source = self.require_chain(&request.source_chain_id)?;
        validate_bech32_address(&request.sender, &source.bech32_prefix)?;
        self.require_chain(&request.destination_chain_id)?;

        let options = SendTxOptions {
            silent: tx.silent,
            on_fulfill: None,
        };
        let tx_hash = self
            .submitter
            .send_tx(&request.source_chain_id, tx.bytes, tx.mode, options)
            .await?;

        let channels = request.ibc_channels.unwrap_or_default();
        if !channels.is_empty() {
            self.add_recent_ibc_history(NewTransfer {
                swap_type: Some(request.swap_type),
                chain_id: request.source_chain_id,
                destination_chain_id: request.destination_chain_id,
                sender: request.sender,
                recipient: None,
                amount: request.amount,
                memo: request.memo,
                channels,
                tx_hash: tx_hash.clone(),
            })
            .await;
        }

        Ok(tx_hash)
    }

    fn require_chain(&self, chain_id: &str) -> Result<ChainInfo, CoreError> {
        self.registry
            .chain_info(chain_id)
            .ok_or_else(|| CoreError::ChainNotFound(chain_id.to_owned()))
    }

    /// Recency entries are keyed by the destination chain.
    fn record_send_on_fulfill(self: &Arc<Self>, request: &TransferRequest) -> OnFulfill {
        let service = Arc::downgrade(self);
        let chain_id = request.destination_chain_id.clone();
        let kind = request.kind.clone();
        let sender = request.sender.clone();
        let recipient = request.recipient.clone();
        let amount = request.amount.clone();
        let memo = request.memo.clone();
        let ibc_channels = request.ibc_channels.clone();

        Box::new(move |result: TxResult| -> FulfillFuture {
            Box::pin(async move {
                if !result.is_success() {
                    debug!(tx.hash = %result.hash, code = result.code, "send failed; not recorded");
                    return;
                }
                let Some(service) = service.upgrade() else {
                    return;
                };
                let entry = RecentSendHistory::new(sender, recipient, amount, memo, ibc_channels);
                service.add_recent_send_history(&chain_id, &kind, entry).await;
            })
        })
    }

    // ========================================================================
    // Recency Store
    // ========================================================================

    pub async fn get_recent_send_histories(
        &self,
        chain_id: &str,
        kind: &str,
    ) -> Vec<RecentSendHistory> {
        self.state.read().await.recent.list(chain_id, kind)
    }

    /// Record a send in the `(chain_id, kind)` bucket, stamped with the
    /// current time.
    pub async fn add_recent_send_history(
        &self,
        chain_id: &str,
        kind: &str,
        entry: RecentSendHistory,
    ) {
        let mut state = self.state.write().await;
        state.recent.record(chain_id, kind, entry);
        self.persist_recent(&state.recent);
    }

    // ========================================================================
    // Transfer Ledger
    // ========================================================================

    /// Open a ledger record and start tracking it. Returns the new id.
    pub async fn add_recent_ibc_history(self: &Arc<Self>, transfer: NewTransfer) -> String {
        let id = self.insert_transfer(transfer).await;
        self.spawn_track(id.clone());
        id
    }

    /// Open a ledger record without starting a driver.
    pub(crate) async fn insert_transfer(&self, transfer: NewTransfer) -> String {
        let mut state = self.state.write().await;
        let chain_id = transfer.chain_id.clone();
        let hops = transfer.channels.len();
        let id = state.ledger.create(transfer);
        self.persist_seq(&state.ledger);
        self.persist_ledger(&state.ledger);
        info!(transfer.id = %id, chain_id = %chain_id, hops, "transfer recorded");
        id
    }

    pub async fn get_recent_ibc_history(&self, id: &str) -> Option<IbcHistory> {
        self.state.read().await.ledger.get(id).cloned()
    }

    /// Every record whose chains are all still registered, oldest first.
    pub async fn get_recent_ibc_histories(&self) -> Vec<IbcHistory> {
        let state = self.state.read().await;
        state
            .ledger
            .visible(|chain_id| self.registry.has_chain_info(chain_id))
            .cloned()
            .collect()
    }

    pub async fn remove_recent_ibc_history(&self, id: &str) -> bool {
        let mut state = self.state.write().await;
        let removed = state.ledger.remove(id);
        if removed {
            self.persist_ledger(&state.ledger);
            debug!(transfer.id = %id, "transfer removed");
        }
        removed
    }

    pub async fn clear_all_recent_ibc_history(&self) {
        let mut state = self.state.write().await;
        state.ledger.clear();
        self.persist_ledger(&state.ledger);
        info!("transfer history cleared");
    }

    /// Delete every record that references `chain_id`. Returns the removed ids.
    pub async fn on_chain_removed(&self, chain_id: &str) -> Vec<String> {
        let mut state = self.state.write().await;
        let removed = state.ledger.remove_referencing(chain_id);
        if !removed.is_empty() {
            self.persist_ledger(&state.ledger);
            info!(chain_id = %chain_id, removed = removed.len(), "dropped transfers of removed chain");
        }
        removed
    }

    /// Catch up on removals whose notices were missed: drop every record
    /// that references a chain the registry reports as deregistered. Records
    /// whose chains were simply never registered stay hidden, not deleted.
    async fn remove_deregistered(&self) -> Vec<String> {
        let identifiers = self.registry.removed_identifiers();
        let mut state = self.state.write().await;
        let removed: Vec<String> = identifiers
            .iter()
            .flat_map(|identifier| state.ledger.remove_referencing(identifier))
            .collect();
        if !removed.is_empty() {
            self.persist_ledger(&state.ledger);
            info!(removed = removed.len(), "dropped transfers of deregistered chains");
        }
        removed
    }

    fn spawn_removal_listener(self: &Arc<Self>) {
        let mut removed = self.registry.subscribe_removed();
        let service = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let notice = removed.recv().await;
                let Some(service) = service.upgrade() else {
                    break;
                };
                match notice {
                    Ok(info) => {
                        service.on_chain_removed(&info.chain_id).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "missed chain removal notices; sweeping deregistered chains");
                        service.remove_deregistered().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Wait until every scheduled snapshot is written.
    pub async fn flush(&self) {
        self.writer.flush().await;
    }

    fn persist_recent(&self, recent: &RecentSendStore) {
        self.schedule_snapshot(RECENT_SEND_HISTORY_KEY, &recent.snapshot());
    }

    fn persist_seq(&self, ledger: &TransferLedger) {
        self.schedule_snapshot(IBC_HISTORY_SEQ_KEY, &ledger.seq());
    }

    pub(crate) fn persist_ledger(&self, ledger: &TransferLedger) {
        self.schedule_snapshot(IBC_HISTORY_MAP_KEY, &ledger.histories_snapshot());
    }

    fn schedule_snapshot<T: serde::Serialize>(&self, key: &'static str, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.writer.schedule(key, value),
            Err(e) => warn!(key, error = %e, "snapshot serialization failed"),
        }
    }
}

/// A missing key or an explicit `null` both mean "nothing stored".
fn decode_snapshot<T: DeserializeOwned>(
    raw: Option<serde_json::Value>,
) -> Result<Option<T>, CoreError> {
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}
