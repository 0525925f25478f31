use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::messages::Peer;
use crate::protocol::sequence::SequenceNumber;

/// Remembers the sequence numbers of inbound messages that were handled already, so that
///  redelivered messages cause no second side effect. Entries are evicted once they are older
///  than the configured window.
///
/// Each peer has its own cache since peers number their messages independently.
pub struct DedupCache {
    peer: Peer,
    window: Duration,
    handled: RwLock<FxHashMap<SequenceNumber, Instant>>,
}

impl DedupCache {
    pub fn new(peer: Peer, window: Duration) -> DedupCache {
        DedupCache {
            peer,
            window,
            handled: Default::default(),
        }
    }

    pub async fn already_handled(&self, seq: SequenceNumber) -> bool {
        self.handled.read().await.contains_key(&seq)
    }

    pub async fn mark_handled(&self, seq: SequenceNumber) {
        self.mark_handled_at(seq, Instant::now()).await
    }

    pub async fn mark_handled_at(&self, seq: SequenceNumber, handled_at: Instant) {
        self.handled.write().await.insert(seq, handled_at);
    }

    /// Checks and marks a sequence number in a single step: returns `true` for the first call
    ///  with a given sequence number, and `false` for every call after that until the entry
    ///  is evicted.
    pub async fn begin_handling(&self, seq: SequenceNumber) -> bool {
        let mut handled = self.handled.write().await;
        if handled.contains_key(&seq) {
            return false;
        }
        handled.insert(seq, Instant::now());
        true
    }

    pub async fn evict_stale(&self, now: Instant) {
        let mut handled = self.handled.write().await;
        let len_before = handled.len();
        handled.retain(|_, handled_at| now.saturating_duration_since(*handled_at) < self.window);

        let num_evicted = len_before - handled.len();
        if num_evicted > 0 {
            debug!("evicted {} stale {} sequence numbers from dedup cache", num_evicted, self.peer);
        }
    }

    pub async fn len(&self) -> usize {
        self.handled.read().await.len()
    }
}
