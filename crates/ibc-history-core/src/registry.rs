//! Chain registry boundary.
//!
//! The tracker only needs three things from the registry: resolve a chain id
//! to its RPC endpoint and address prefix, check presence, and hear about
//! removals. [`StaticChainRegistry`] is the in-process implementation used by
//! the daemon, loaded from a JSON list of [`ChainInfo`].

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::chain_id::chain_identifier;
use crate::error::CoreError;

const REMOVAL_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: String,
    /// CometBFT RPC base URL.
    pub rpc: String,
    /// Account address prefix (`cosmos`, `osmo`, ...).
    pub bech32_prefix: String,
}

pub trait ChainRegistry: Send + Sync {
    /// Resolve a chain id. Lookups are by canonical identifier, so any
    /// revision of a registered chain resolves.
    fn chain_info(&self, chain_id: &str) -> Option<ChainInfo>;

    fn has_chain_info(&self, chain_id: &str) -> bool {
        self.chain_info(chain_id).is_some()
    }

    /// Receive every chain removed after this call.
    fn subscribe_removed(&self) -> broadcast::Receiver<ChainInfo>;

    /// Canonical identifiers of chains that were removed and not added back.
    /// Lets a subscriber that missed notices catch up.
    fn removed_identifiers(&self) -> Vec<String>;
}

#[derive(Default)]
struct RegistryState {
    chains: HashMap<String, ChainInfo>,
    removed: HashSet<String>,
}

pub struct StaticChainRegistry {
    state: RwLock<RegistryState>,
    removed_tx: broadcast::Sender<ChainInfo>,
}

impl StaticChainRegistry {
    pub fn new(chains: impl IntoIterator<Item = ChainInfo>) -> Self {
        let (removed_tx, _) = broadcast::channel(REMOVAL_CHANNEL_CAPACITY);
        let chains = chains
            .into_iter()
            .map(|info| (chain_identifier(&info.chain_id).to_owned(), info))
            .collect();
        Self {
            state: RwLock::new(RegistryState {
                chains,
                removed: HashSet::new(),
            }),
            removed_tx,
        }
    }

    /// Load a JSON array of chain entries.
    pub fn from_json_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let chains: Vec<ChainInfo> = serde_json::from_str(&content)?;
        Ok(Self::new(chains))
    }

    pub fn add_chain(&self, info: ChainInfo) {
        let key = chain_identifier(&info.chain_id).to_owned();
        let mut state = self.write();
        state.removed.remove(&key);
        state.chains.insert(key, info);
    }

    /// Remove a chain and notify subscribers. Returns the removed entry.
    pub fn remove_chain(&self, chain_id: &str) -> Option<ChainInfo> {
        let identifier = chain_identifier(chain_id);
        let removed = {
            let mut state = self.write();
            let removed = state.chains.remove(identifier);
            if removed.is_some() {
                state.removed.insert(identifier.to_owned());
            }
            removed
        };
        if let Some(info) = &removed {
            tracing::info!(chain_id = %info.chain_id, "chain removed from registry");
            // No receivers is fine: nothing is tracking yet.
            let _ = self.removed_tx.send(info.clone());
        }
        removed
    }

    pub fn list_chains(&self) -> Vec<ChainInfo> {
        let mut chains: Vec<ChainInfo> = self.read().chains.values().cloned().collect();
        chains.sort_by(|a, b| a.chain_id.cmp(&b.chain_id));
        chains
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, RegistryState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl ChainRegistry for StaticChainRegistry {
    fn chain_info(&self, chain_id: &str) -> Option<ChainInfo> {
        self.read().chains.get(chain_identifier(chain_id)).cloned()
    }

    fn subscribe_removed(&self) -> broadcast::Receiver<ChainInfo> {
        self.removed_tx.subscribe()
    }

    fn removed_identifiers(&self) -> Vec<String> {
        let mut removed: Vec<String> = self.read().removed.iter().cloned().collect();
        removed.sort();
        removed
    }
}
