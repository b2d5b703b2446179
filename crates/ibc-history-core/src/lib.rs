pub mod address;
pub mod chain_id;
pub mod error;
pub mod events;
pub mod ledger;
pub mod persist;
pub mod recent;
pub mod registry;
pub mod service;
pub mod submit;
pub mod tracer;
pub mod tracker;
pub mod types;

#[cfg(test)]
pub(crate) mod test_util;

pub use error::CoreError;
pub use service::{IbcHistoryService, SignedTx, SwapRequest, TransferRequest};
pub use tracker::TrackOutcome;
