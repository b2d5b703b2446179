//! Persistence bridge.
//!
//! The service keeps three independent snapshots in a key-value store: the
//! recency buckets, the ledger id counter and the ledger itself. Every
//! mutation schedules a full snapshot of the structure it touched through
//! [`SnapshotWriter`]; nothing is written incrementally.
//!
//! The key names still say "IBCTransfer" from before swaps were tracked.
//! Existing installations hold data under these names, so they stay.

mod file;
mod memory;
mod writer;

pub use file::JsonFileKvStore;
pub use memory::MemoryKvStore;
pub use writer::SnapshotWriter;

use async_trait::async_trait;

use crate::error::CoreError;

pub const RECENT_SEND_HISTORY_KEY: &str = "recentSendHistoryMap";
pub const IBC_HISTORY_SEQ_KEY: &str = "recentIBCTransferHistorySeq";
pub const IBC_HISTORY_MAP_KEY: &str = "recentIBCTransferHistoryMap";

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>, CoreError>;

    async fn set(&self, key: &str, value: serde_json::Value) -> Result<(), CoreError>;
}
