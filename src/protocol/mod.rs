//! The reliable-delivery layer on top of connectionless, at-least-once peer channels.
//!
//! Every outbound message that requires acknowledgment gets a [sequence::SequenceNumber] from
//!  the [sequence_allocator::SequenceAllocator], which also keeps it in its outbox until the
//!  peer acknowledges it. Overdue messages are retransmitted under their original sequence
//!  number by the [resend] loop, relying on the peer to discard duplicates.
//!
//! Inbound, the [dedup_cache::DedupCache] remembers which of the peer's sequence numbers were
//!  already handled so that re-deliveries are acknowledged again but have no further effect.

pub mod sequence;
pub mod sequence_allocator;
pub mod dedup_cache;
pub mod resend;
