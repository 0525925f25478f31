use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::messages::outbound::{MessageKind, OutboundMessage};
use crate::protocol::sequence::SequenceNumber;

/// An outbound message that was sent and is waiting for the peer's acknowledgment
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OutboxEntry {
    pub seq: SequenceNumber,
    pub kind: MessageKind,
    pub payload: OutboundMessage,
    pub sent_at: Instant,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum InFlight {
    /// allocated, but the message was not recorded yet
    Allocated,
    Sent(MessageKind),
}

#[derive(Default)]
struct Outbox {
    in_flight: FxHashMap<SequenceNumber, InFlight>,
    partitions: FxHashMap<MessageKind, FxHashMap<SequenceNumber, OutboxEntry>>,
}

/// Issues the hub's outbound sequence numbers and keeps every sent message until it is
///  acknowledged.
///
/// A sequence number goes through three stages:
/// * [SequenceAllocator::allocate] reserves it, so an early ack or a concurrent allocation can
///   never see it as free
/// * [SequenceAllocator::record_sent] stores the message in its kind's partition, from which
///   [SequenceAllocator::due_for_resend] picks it up once it is overdue
/// * [SequenceAllocator::acknowledge] retires it
pub struct SequenceAllocator {
    counter: AtomicU64,
    resend_threshold: Duration,
    restamp_on_resend: bool,
    outbox: RwLock<Outbox>,
}

impl SequenceAllocator {
    pub fn new(resend_threshold: Duration, restamp_on_resend: bool) -> SequenceAllocator {
        Self::with_start(SequenceNumber::ZERO, resend_threshold, restamp_on_resend)
    }

    pub fn with_start(start: SequenceNumber, resend_threshold: Duration, restamp_on_resend: bool) -> SequenceAllocator {
        SequenceAllocator {
            counter: AtomicU64::new(start.to_raw()),
            resend_threshold,
            restamp_on_resend,
            outbox: Default::default(),
        }
    }

    pub async fn allocate(&self) -> SequenceNumber {
        let mut outbox = self.outbox.write().await;

        // the counter may wrap around onto sequence numbers that are still in flight
        let mut seq = SequenceNumber::from_raw(self.counter.fetch_add(1, Ordering::AcqRel));
        while outbox.in_flight.contains_key(&seq) {
            seq = SequenceNumber::from_raw(self.counter.fetch_add(1, Ordering::AcqRel));
        }

        outbox.in_flight.insert(seq, InFlight::Allocated);
        trace!("allocated sequence number {}", seq);
        seq
    }

    /// Stores a sent message in the outbox. If the message's sequence number was acknowledged
    ///  in the meantime, there is nothing left to track and the call is a no-op.
    pub async fn record_sent(&self, payload: OutboundMessage) {
        self.record_sent_at(payload, Instant::now()).await
    }

    pub async fn record_sent_at(&self, payload: OutboundMessage, sent_at: Instant) {
        let seq = payload.seq();
        let kind = payload.kind();

        let mut outbox = self.outbox.write().await;
        match outbox.in_flight.get(&seq) {
            Some(InFlight::Allocated) => {}
            Some(InFlight::Sent(prev_kind)) => {
                debug!("sequence number {} was already recorded as {} - ignoring", seq, prev_kind);
                return;
            }
            None => {
                debug!("sequence number {} was acknowledged before it was recorded - not tracking {}", seq, kind);
                return;
            }
        }

        outbox.in_flight.insert(seq, InFlight::Sent(kind));
        outbox.partitions.entry(kind)
            .or_default()
            .insert(seq, OutboxEntry {
                seq,
                kind,
                payload,
                sent_at,
            });
    }

    /// Retires a sequence number. Unknown, stale and repeated acks are ignored.
    pub async fn acknowledge(&self, seq: SequenceNumber) {
        let mut outbox = self.outbox.write().await;
        match outbox.in_flight.remove(&seq) {
            None => {
                trace!("ignoring ack for unknown sequence number {}", seq);
            }
            Some(InFlight::Allocated) => {
                trace!("ack for sequence number {} before it was recorded", seq);
            }
            Some(InFlight::Sent(kind)) => {
                if let Some(partition) = outbox.partitions.get_mut(&kind) {
                    partition.remove(&seq);
                }
                trace!("acknowledged {} message {}", kind, seq);
            }
        }
    }

    /// Returns all entries that were sent at least the resend threshold ago, across all
    ///  kinds. Unless configured otherwise, the returned entries keep their original timestamp
    ///  and are selected again on the next call.
    pub async fn due_for_resend(&self, now: Instant) -> Vec<OutboxEntry> {
        let mut outbox = self.outbox.write().await;

        let mut result = Vec::new();
        for partition in outbox.partitions.values_mut() {
            for entry in partition.values_mut() {
                if now.saturating_duration_since(entry.sent_at) >= self.resend_threshold {
                    result.push(entry.clone());
                    if self.restamp_on_resend {
                        entry.sent_at = now;
                    }
                }
            }
        }
        result.sort_by_key(|e| e.seq);
        result
    }

    pub async fn num_in_flight(&self) -> usize {
        self.outbox.read().await.in_flight.len()
    }

    pub async fn num_pending(&self, kind: MessageKind) -> usize {
        self.outbox.read().await.partitions.get(&kind)
            .map(|p| p.len())
            .unwrap_or(0)
    }
}
