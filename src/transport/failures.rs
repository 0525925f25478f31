use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tracing::{error, warn};

use crate::messages::Peer;

/// Counts send and receive failures across all peer links. Once the count reaches the
///  threshold, the hub has no way of recovering, and [TransportFailures::wait_fatal] returns.
pub struct TransportFailures {
    threshold: usize,
    count: AtomicUsize,
    is_fatal: AtomicBool,
    fatal: Notify,
}

impl TransportFailures {
    pub fn new(threshold: usize) -> TransportFailures {
        TransportFailures {
            threshold,
            count: AtomicUsize::new(0),
            is_fatal: AtomicBool::new(false),
            fatal: Notify::new(),
        }
    }

    pub fn record_failure(&self, peer: Peer, e: &anyhow::Error) {
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        warn!("transport failure #{} for {}: {}", count, peer, e);

        if count >= self.threshold && !self.is_fatal.swap(true, Ordering::AcqRel) {
            error!("{} transport failures - giving up", count);
            self.fatal.notify_waiters();
        }
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn is_fatal(&self) -> bool {
        self.is_fatal.load(Ordering::Acquire)
    }

    pub async fn wait_fatal(&self) {
        loop {
            let notified = self.fatal.notified();
            if self.is_fatal() {
                return;
            }
            notified.await;
        }
    }
}
