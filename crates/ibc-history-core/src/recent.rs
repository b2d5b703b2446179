use std::collections::{HashMap, VecDeque};

use crate::chain_id::chain_identifier;
use crate::types::{now_millis, RecentSendHistory};

/// Maximum entries kept per `(chain, kind)` bucket.
pub const RECENT_SEND_HISTORY_CAP: usize = 20;

// ==============================================================================
// Recency Store
// ==============================================================================

/// Bounded, newest-first lists of plain sends keyed by
/// `{chain_identifier}/{kind}`.
///
/// Eviction is by insertion order: once a bucket holds more than
/// [`RECENT_SEND_HISTORY_CAP`] entries the oldest is dropped.
#[derive(Debug, Clone, Default)]
pub struct RecentSendStore {
    buckets: HashMap<String, VecDeque<RecentSendHistory>>,
}

impl RecentSendStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot key for a bucket. The chain part is canonicalized so
    /// revisions of one chain share a bucket.
    pub fn bucket_key(chain_id: &str, kind: &str) -> String {
        format!("{}/{kind}", chain_identifier(chain_id))
    }

    /// Prepend `entry`, stamped with the current time. Any timestamp the
    /// caller set is overwritten.
    pub fn record(&mut self, chain_id: &str, kind: &str, mut entry: RecentSendHistory) {
        entry.timestamp = now_millis();
        let bucket = self
            .buckets
            .entry(Self::bucket_key(chain_id, kind))
            .or_default();
        bucket.push_front(entry);
        bucket.truncate(RECENT_SEND_HISTORY_CAP);
    }

    /// Up to [`RECENT_SEND_HISTORY_CAP`] entries, newest first.
    pub fn list(&self, chain_id: &str, kind: &str) -> Vec<RecentSendHistory> {
        self.buckets
            .get(&Self::bucket_key(chain_id, kind))
            .map(|bucket| {
                bucket
                    .iter()
                    .take(RECENT_SEND_HISTORY_CAP)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replace all buckets from a persisted snapshot. Over-long buckets from
    /// older snapshots are cut to the cap.
    pub fn restore(&mut self, snapshot: HashMap<String, Vec<RecentSendHistory>>) {
        self.buckets = snapshot
            .into_iter()
            .map(|(key, entries)| {
                let mut bucket: VecDeque<_> = entries.into();
                bucket.truncate(RECENT_SEND_HISTORY_CAP);
                (key, bucket)
            })
            .collect();
    }

    pub fn snapshot(&self) -> HashMap<&str, &VecDeque<RecentSendHistory>> {
        self.buckets
            .iter()
            .map(|(key, bucket)| (key.as_str(), bucket))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::make_recent_send;

    fn send_with_memo(n: u64) -> RecentSendHistory {
        RecentSendHistory {
            memo: n.to_string(),
            ..make_recent_send(0)
        }
    }

    #[test]
    fn unseen_bucket_is_empty() {
        let store = RecentSendStore::new();
        assert!(store.list("osmosis-1", "basic-send").is_empty());
    }

    #[test]
    fn keeps_the_newest_twenty_newest_first() {
        let mut store = RecentSendStore::new();
        for n in 0..45u64 {
            store.record("osmosis-1", "basic-send", send_with_memo(n));
        }

        let listed = store.list("osmosis-1", "basic-send");
        assert_eq!(listed.len(), RECENT_SEND_HISTORY_CAP);
        let memos: Vec<String> = listed.iter().map(|h| h.memo.clone()).collect();
        let expected: Vec<String> = (25..45u64).rev().map(|n| n.to_string()).collect();
        assert_eq!(memos, expected);
    }

    #[test]
    fn record_stamps_the_current_time() {
        let mut store = RecentSendStore::new();
        let before = now_millis();
        store.record("juno-1", "basic-send", make_recent_send(9));

        let listed = store.list("juno-1", "basic-send");
        assert!(listed[0].timestamp >= before);
    }

    #[test]
    fn revisions_share_a_bucket_but_kinds_do_not() {
        let mut store = RecentSendStore::new();
        store.record("cosmoshub-4", "basic-send", make_recent_send(1));
        store.record("cosmoshub-5", "basic-send", make_recent_send(2));
        store.record("cosmoshub-4", "ibc-swap", make_recent_send(3));

        assert_eq!(store.list("cosmoshub-4", "basic-send").len(), 2);
        assert_eq!(store.list("cosmoshub", "ibc-swap").len(), 1);
        assert_eq!(
            RecentSendStore::bucket_key("cosmoshub-4", "basic-send"),
            "cosmoshub/basic-send"
        );
    }

    #[test]
    fn restore_truncates_oversized_buckets() {
        let mut store = RecentSendStore::new();
        let entries: Vec<_> = (0..30).rev().map(make_recent_send).collect();
        store.restore(HashMap::from([("juno/basic-send".to_string(), entries)]));

        let listed = store.list("juno-1", "basic-send");
        assert_eq!(listed.len(), RECENT_SEND_HISTORY_CAP);
        assert_eq!(listed[0].timestamp, 29);
    }
}
