//! Packet-forwarding tracker.
//!
//! [`IbcHistoryService::advance`] is one transition of a ledger record:
//!
//! ```text
//! AwaitingSourceConfirmation --source tx ok--> AdvancingHop(0) --recv found--> ... --> Completed
//!            |
//!            +--source tx failed--> removed from the ledger
//! ```
//!
//! Each step opens one tracer, awaits its single resolution, closes it, and
//! then applies the effect under the state lock. [`IbcHistoryService::track`]
//! repeats steps while they make progress. At most one driver runs per id.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::events::{find_packet_sequence, find_recv_packet_index, recv_packet_query};
use crate::service::IbcHistoryService;
use crate::types::{IbcHistory, IbcHop, TransferState, TxResult};

/// Result of one tracking step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackOutcome {
    /// No record with this id; it was removed or never existed.
    Absent,
    /// State changed and the next step can run right away.
    Advanced,
    /// Nothing to do until the chains make progress.
    Pending,
    Completed,
    /// The source tx failed and the record was removed.
    Failed,
}

impl IbcHistoryService {
    /// Drive `id` until it stops making progress. Returns immediately when a
    /// driver for `id` is already running.
    pub async fn track(&self, id: &str) {
        let Some(_claim) = InFlight::claim(&self.in_flight, id) else {
            debug!(transfer.id = %id, "already tracking");
            return;
        };

        loop {
            match self.advance(id).await {
                Ok(TrackOutcome::Advanced) => continue,
                Ok(outcome) => {
                    debug!(transfer.id = %id, ?outcome, "tracking paused");
                    break;
                }
                Err(e) => {
                    warn!(transfer.id = %id, error = %e, "tracking step failed");
                    break;
                }
            }
        }
    }

    pub fn spawn_track(self: &Arc<Self>, id: String) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.track(&id).await })
    }

    /// Re-drive every visible record that has not completed. Returns the
    /// number of records handed to a driver.
    pub async fn retrack_all(self: &Arc<Self>) -> usize {
        let ids: Vec<String> = self
            .state
            .read()
            .await
            .ledger
            .visible(|chain_id| self.registry.has_chain_info(chain_id))
            .filter(|history| history.state() != TransferState::Completed)
            .map(|history| history.id.clone())
            .collect();

        for id in &ids {
            self.spawn_track(id.clone());
        }
        ids.len()
    }

    /// Run one transition of `id`. Safe to call on completed or unknown ids;
    /// neither opens a tracer.
    pub async fn advance(&self, id: &str) -> Result<TrackOutcome, CoreError> {
        let Some(history) = self.get_recent_ibc_history(id).await else {
            return Ok(TrackOutcome::Absent);
        };

        match history.state() {
            TransferState::AwaitingSourceConfirmation => self.confirm_source(&history).await,
            TransferState::AdvancingHop(k) => self.advance_hop(&history, k).await,
            TransferState::Completed => Ok(TrackOutcome::Completed),
        }
    }

    // ========================================================================
    // Source confirmation
    // ========================================================================

    async fn confirm_source(&self, history: &IbcHistory) -> Result<TrackOutcome, CoreError> {
        let chain = self
            .registry
            .chain_info(&history.chain_id)
            .ok_or_else(|| CoreError::ChainNotFound(history.chain_id.clone()))?;
        let hash = hex::decode(&history.tx_hash)
            .map_err(|e| CoreError::InvalidTxHash(format!("{}: {e}", history.tx_hash)))?;

        debug!(transfer.id = %history.id, chain_id = %chain.chain_id, tx.hash = %history.tx_hash, "waiting for source tx");
        let mut tracer = self.tracers.open(&chain.rpc);
        let traced = tracer.trace_tx(&hash).await;
        tracer.close();
        let tx = traced?;

        let mut state = self.state.write().await;
        let Some(record) = state.ledger.get_mut(&history.id) else {
            return Ok(TrackOutcome::Absent);
        };
        record.tx_fulfilled = true;

        if !tx.is_success() {
            let error = tx.error_message();
            record.tx_error = Some(error.clone());
            // Failed transfers are not kept.
            state.ledger.remove(&history.id);
            self.persist_ledger(&state.ledger);
            info!(transfer.id = %history.id, code = tx.code, error = %error, "source tx failed; transfer dropped");
            return Ok(TrackOutcome::Failed);
        }

        if let Some(first) = record.hops.first_mut() {
            match find_packet_sequence(&tx, &first.port_id, &first.channel_id, 0) {
                Ok(sequence) => {
                    debug!(transfer.id = %history.id, sequence = %sequence, "first packet sent");
                    first.sequence = Some(sequence);
                }
                Err(e) => {
                    // The source tx is final; a retry would read the same events.
                    let err = CoreError::UnmatchedInitialHop {
                        id: history.id.clone(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "transfer stalled at first hop");
                }
            }
        }
        self.persist_ledger(&state.ledger);
        Ok(TrackOutcome::Advanced)
    }

    // ========================================================================
    // Hop advancement
    // ========================================================================

    async fn advance_hop(&self, history: &IbcHistory, k: usize) -> Result<TrackOutcome, CoreError> {
        let target = &history.hops[k];
        let next = history.hops.get(k + 1);
        let Some(sequence) = target.sequence.as_deref() else {
            debug!(transfer.id = %history.id, hop = k, "packet sequence unknown");
            return Ok(TrackOutcome::Pending);
        };

        let chain = self
            .registry
            .chain_info(&target.counterparty_chain_id)
            .ok_or_else(|| CoreError::ChainNotFound(target.counterparty_chain_id.clone()))?;

        let query = recv_packet_query(target, sequence, next);
        debug!(transfer.id = %history.id, hop = k, chain_id = %chain.chain_id, %query, "waiting for packet receipt");
        let mut tracer = self.tracers.open(&chain.rpc);
        let traced = tracer.trace_query(&query).await;
        tracer.close();

        let candidates = match traced? {
            Some(txs) if !txs.is_empty() => txs,
            _ => return Ok(TrackOutcome::Pending),
        };
        let forwarded = next.and_then(|next| {
            candidates
                .iter()
                .find_map(|tx| forwarded_sequence(&history.id, tx, target, sequence, next))
        });

        let mut state = self.state.write().await;
        let Some(record) = state.ledger.get_mut(&history.id) else {
            return Ok(TrackOutcome::Absent);
        };
        if let Some(hop) = record.hops.get_mut(k) {
            hop.completed = true;
        }

        let outcome = match (next, forwarded) {
            (None, _) => {
                info!(transfer.id = %history.id, destination = %history.destination_chain_id, "transfer completed");
                TrackOutcome::Completed
            }
            (Some(_), Some(sequence)) => {
                debug!(transfer.id = %history.id, hop = k + 1, sequence = %sequence, "packet forwarded");
                if let Some(hop) = record.hops.get_mut(k + 1) {
                    hop.sequence = Some(sequence);
                }
                TrackOutcome::Advanced
            }
            (Some(_), None) => {
                warn!(transfer.id = %history.id, hop = k, "packet received but forward not found");
                TrackOutcome::Pending
            }
        };
        self.persist_ledger(&state.ledger);
        Ok(outcome)
    }
}

/// Sequence of the packet forwarded over `next` by the tx that received
/// `target`'s packet. Candidates without it are skipped.
fn forwarded_sequence(
    id: &str,
    tx: &TxResult,
    target: &IbcHop,
    sequence: &str,
    next: &IbcHop,
) -> Option<String> {
    let found = find_recv_packet_index(tx, &target.port_id, &target.channel_id, sequence)
        .and_then(|index| find_packet_sequence(tx, &next.port_id, &next.channel_id, index));
    match found {
        Ok(sequence) => Some(sequence),
        Err(e) => {
            warn!(transfer.id = %id, tx.hash = %tx.hash, error = %e, "candidate skipped");
            None
        }
    }
}

// ==============================================================================
// In-flight Claims
// ==============================================================================

/// Membership of one id in the in-flight set, released on drop.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    id: String,
}

impl<'a> InFlight<'a> {
    fn claim(set: &'a Mutex<HashSet<String>>, id: &str) -> Option<Self> {
        lock(set).insert(id.to_owned()).then(|| Self {
            set,
            id: id.to_owned(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.set).remove(&self.id);
    }
}

fn lock(set: &Mutex<HashSet<String>>) -> MutexGuard<'_, HashSet<String>> {
    set.lock().unwrap_or_else(|e| e.into_inner())
}
