use std::sync::Arc;

use tracing::{debug, warn};

use crate::hub::hub_config::HubConfig;
use crate::messages::executor_messages::{ExecutorCommands, ExecutorResponses};
use crate::messages::outbound::{split_by_encoded_len, OutboundMessage};
use crate::messages::requester_messages::{RequesterInbound, RequesterOutbound};
use crate::messages::{Peer, WireBatch};
use crate::protocol::dedup_cache::DedupCache;
use crate::protocol::sequence::SequenceNumber;
use crate::protocol::sequence_allocator::SequenceAllocator;
use crate::store::RecordStore;
use crate::transport::DatagramSocket;
use crate::transport::failures::TransportFailures;
use crate::transport::peer_link::PeerLink;
use crate::trucks::truck_pool::TruckPool;

/// checksum, and the simulation speed record (tag and varint)
const BATCH_OVERHEAD: usize = size_of::<u64>() + 6;

pub type RequesterLink = PeerLink<RequesterOutbound, RequesterInbound>;
pub type ExecutorLink = PeerLink<ExecutorCommands, ExecutorResponses>;

/// Everything the hub's loops and handlers share. There is one instance per hub, created at
///  startup and passed around as an `Arc`.
pub struct HubContext {
    pub config: Arc<HubConfig>,
    pub trucks: TruckPool,
    pub allocator: SequenceAllocator,
    pub requester_dedup: DedupCache,
    pub executor_dedup: DedupCache,
    pub store: Arc<dyn RecordStore>,
    pub requester: RequesterLink,
    pub executor: ExecutorLink,
    pub failures: Arc<TransportFailures>,
}

impl HubContext {
    pub fn new(
        config: Arc<HubConfig>,
        store: Arc<dyn RecordStore>,
        requester_socket: Arc<dyn DatagramSocket>,
        executor_socket: Arc<dyn DatagramSocket>,
    ) -> HubContext {
        let failures = Arc::new(TransportFailures::new(config.max_transport_failures));

        HubContext {
            trucks: TruckPool::new(config.num_trucks, config.truck_home),
            allocator: SequenceAllocator::new(config.resend_threshold, config.restamp_on_resend),
            requester_dedup: DedupCache::new(Peer::Requester, config.dedup_window),
            executor_dedup: DedupCache::new(Peer::Executor, config.dedup_window),
            store,
            requester: PeerLink::new(Peer::Requester, requester_socket, failures.clone()),
            executor: PeerLink::new(Peer::Executor, executor_socket, failures.clone()),
            failures,
            config,
        }
    }

    pub fn dedup(&self, peer: Peer) -> &DedupCache {
        match peer {
            Peer::Requester => &self.requester_dedup,
            Peer::Executor => &self.executor_dedup,
        }
    }

    pub async fn send_ack(&self, peer: Peer, seq: SequenceNumber) {
        match peer {
            Peer::Requester => { self.requester.send(&RequesterOutbound::ack(seq)).await; }
            Peer::Executor => { self.executor.send(&ExecutorCommands::ack(seq)).await; }
        }
    }

    /// Every inbound message that carries a sequence number is acknowledged, whether it was
    ///  seen before or not. Returns `true` only the first time a given sequence number arrives,
    ///  marking it as handled.
    pub async fn accept(&self, peer: Peer, seq: SequenceNumber) -> bool {
        self.send_ack(peer, seq).await;
        if self.dedup(peer).begin_handling(seq).await {
            true
        }
        else {
            debug!("{} message {} was handled already", peer, seq);
            false
        }
    }

    /// Sends a message that requires acknowledgment: it gets a fresh sequence number and is
    ///  kept in the outbox until the peer acknowledges it, even if sending fails.
    pub async fn send_tracked(&self, build: impl FnOnce(SequenceNumber) -> OutboundMessage) -> SequenceNumber {
        let seq = self.allocator.allocate().await;
        let msg = build(seq);
        debug!("sending {} message {} to {}", msg.kind(), seq, msg.peer());

        self.allocator.record_sent(msg.clone()).await;
        self.send_messages(&[msg]).await;
        seq
    }

    /// Sends messages in as few batches per peer as the datagram size allows. Pickup and
    ///  deliver commands carry the configured simulation speed.
    pub async fn send_messages(&self, messages: &[OutboundMessage]) {
        let max_body_len = self.config.max_datagram_size.saturating_sub(BATCH_OVERHEAD);

        for chunk in split_by_encoded_len(messages, max_body_len) {
            let mut requester_batch = RequesterOutbound::default();
            let mut executor_batch = ExecutorCommands::default();
            for msg in chunk {
                msg.add_to_batch(&mut requester_batch, &mut executor_batch);
            }

            if !executor_batch.pickups.is_empty() || !executor_batch.deliveries.is_empty() {
                executor_batch.sim_speed = Some(self.config.sim_speed);
            }

            if !requester_batch.is_empty() && !self.requester.send(&requester_batch).await {
                warn!("sending to requester failed, waiting for resend");
            }
            if !executor_batch.is_empty() && !self.executor.send(&executor_batch).await {
                warn!("sending to executor failed, waiting for resend");
            }
        }
    }
}
