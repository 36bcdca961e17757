//! Query coalescing: at most one in-flight DNS query per (name, type).
//! The first caller becomes the leader and performs the query; everyone
//! else subscribes to a watch channel and is woken with the shared result.
//! A drop guard ensures followers are released even when the leader errors
//! out or is cancelled.

use compact_str::CompactString;
use dashmap::DashMap;
use rudder_domain::{AnswerSet, DiscoveryError, RecordType};
use rustc_hash::FxBuildHasher;
use std::sync::Arc;
use tokio::sync::watch;

/// `None` until the leader finishes; also the terminal value when the
/// leader gave up without a result.
pub(crate) type InflightResult = Option<Result<Arc<AnswerSet>, DiscoveryError>>;

type Key = (CompactString, RecordType);
type Sender = Arc<watch::Sender<InflightResult>>;
type Map = Arc<DashMap<Key, Sender, FxBuildHasher>>;

pub(crate) struct InflightTable {
    map: Map,
}

pub(crate) enum JoinOutcome {
    Leader(LeaderGuard),
    Follower(watch::Receiver<InflightResult>),
}

impl InflightTable {
    pub fn new() -> Self {
        Self {
            map: Arc::new(DashMap::with_hasher(FxBuildHasher)),
        }
    }

    pub fn join(&self, qname: &str, qtype: RecordType) -> JoinOutcome {
        let key = (CompactString::from(qname), qtype);
        match self.map.entry(key.clone()) {
            dashmap::Entry::Occupied(e) => JoinOutcome::Follower(e.get().subscribe()),
            dashmap::Entry::Vacant(e) => {
                let (tx, _rx) = watch::channel(None);
                let tx = Arc::new(tx);
                e.insert(Arc::clone(&tx));
                JoinOutcome::Leader(LeaderGuard {
                    map: Arc::clone(&self.map),
                    key,
                    tx,
                    published: false,
                })
            }
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.map.len()
    }
}

pub(crate) struct LeaderGuard {
    map: Map,
    key: Key,
    tx: Sender,
    published: bool,
}

impl LeaderGuard {
    /// Remove the in-flight entry, then wake all followers with the
    /// result. Removal comes first so a late joiner starts fresh instead
    /// of subscribing to a finished query.
    pub fn publish(mut self, result: Result<Arc<AnswerSet>, DiscoveryError>) {
        self.map.remove(&self.key);
        let _ = self.tx.send(Some(result));
        self.published = true;
    }
}

impl Drop for LeaderGuard {
    fn drop(&mut self) {
        if !self.published {
            self.map.remove(&self.key);
            let _ = self.tx.send(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_leader_then_follower() {
        let table = InflightTable::new();
        let leader = match table.join("example.com", RecordType::A) {
            JoinOutcome::Leader(g) => g,
            JoinOutcome::Follower(_) => panic!("first joiner must lead"),
        };
        let mut rx = match table.join("example.com", RecordType::A) {
            JoinOutcome::Follower(rx) => rx,
            JoinOutcome::Leader(_) => panic!("second joiner must follow"),
        };

        let set = Arc::new(AnswerSet::positive("example.com", RecordType::A, vec![]));
        leader.publish(Ok(Arc::clone(&set)));

        rx.changed().await.unwrap();
        let got = rx.borrow().clone();
        assert!(matches!(got, Some(Ok(s)) if Arc::ptr_eq(&s, &set)));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_dropped_leader_releases_followers() {
        let table = InflightTable::new();
        let leader = match table.join("example.com", RecordType::A) {
            JoinOutcome::Leader(g) => g,
            JoinOutcome::Follower(_) => panic!(),
        };
        let mut rx = match table.join("example.com", RecordType::A) {
            JoinOutcome::Follower(rx) => rx,
            JoinOutcome::Leader(_) => panic!(),
        };

        drop(leader);
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert_eq!(table.len(), 0);
    }
}
