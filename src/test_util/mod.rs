//! Utilities for testing the hub without real sockets: in-memory datagram sockets, and test
//!  doubles for the two peers that speak the hub's wire format.
//!
//! They are part of the regular (non-#[cfg(test)]) code so that applications embedding the hub
//!  can use them for their own tests.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use crate::hub::hub_config::HubConfig;
use crate::hub::hub_context::HubContext;
use crate::messages::executor_messages::{ExecutorCommands, ExecutorResponses};
use crate::messages::requester_messages::{RequesterInbound, RequesterOutbound};
use crate::messages::{Peer, WireBatch};
use crate::store::RecordStore;
use crate::transport::DatagramSocket;
use crate::transport::failures::TransportFailures;
use crate::transport::peer_link::PeerLink;

/// An in-memory [DatagramSocket]: datagrams sent on one socket of a pair are received on the
///  other. Like a UDP socket, it rejects datagrams above a maximum size.
pub struct ChannelDatagramSocket {
    tx: UnboundedSender<Vec<u8>>,
    rx: Mutex<UnboundedReceiver<Vec<u8>>>,
    max_datagram_size: usize,
}

pub fn datagram_socket_pair(max_datagram_size: usize) -> (ChannelDatagramSocket, ChannelDatagramSocket) {
    let (tx_a, rx_a) = unbounded_channel();
    let (tx_b, rx_b) = unbounded_channel();
    (
        ChannelDatagramSocket { tx: tx_a, rx: Mutex::new(rx_b), max_datagram_size },
        ChannelDatagramSocket { tx: tx_b, rx: Mutex::new(rx_a), max_datagram_size },
    )
}

#[async_trait]
impl DatagramSocket for ChannelDatagramSocket {
    async fn send_datagram(&self, buf: &[u8]) -> anyhow::Result<()> {
        if buf.len() > self.max_datagram_size {
            bail!("datagram of {} bytes exceeds the maximum size of {} bytes", buf.len(), self.max_datagram_size);
        }
        self.tx.send(buf.to_vec())
            .map_err(|_| anyhow!("the other end of the socket pair was dropped"))
    }

    async fn recv_datagram(&self) -> anyhow::Result<Vec<u8>> {
        self.rx.lock().await
            .recv().await
            .ok_or_else(|| anyhow!("the other end of the socket pair was dropped"))
    }
}

/// Plays the part of a peer, sending `ToHub` batches to the hub and receiving `FromHub`
///  batches from it
pub struct TestPeer<ToHub: WireBatch, FromHub: WireBatch> {
    link: PeerLink<ToHub, FromHub>,
}

pub type TestRequester = TestPeer<RequesterInbound, RequesterOutbound>;
pub type TestExecutor = TestPeer<ExecutorResponses, ExecutorCommands>;

impl<ToHub: WireBatch + std::fmt::Debug, FromHub: WireBatch + std::fmt::Debug> TestPeer<ToHub, FromHub> {
    /// Returns the hub's end of the connection together with the test peer
    pub fn new(peer: Peer, max_datagram_size: usize) -> (Arc<dyn DatagramSocket>, TestPeer<ToHub, FromHub>) {
        let (hub_socket, peer_socket) = datagram_socket_pair(max_datagram_size);
        let link = PeerLink::new(peer, Arc::new(peer_socket), Arc::new(TransportFailures::new(usize::MAX)));
        (Arc::new(hub_socket), TestPeer { link })
    }

    pub async fn send(&self, batch: ToHub) {
        assert!(self.link.send(&batch).await, "sending to the hub failed");
    }

    pub async fn try_recv(&self, timeout: Duration) -> Option<FromHub> {
        tokio::time::timeout(timeout, self.link.receive()).await
            .ok()
            .flatten()
    }

    pub async fn recv(&self) -> FromHub {
        match self.try_recv(Duration::from_secs(5)).await {
            Some(batch) => batch,
            None => panic!("no batch received from the hub"),
        }
    }

    /// Collects everything the hub sends until it is quiet for a second
    pub async fn recv_all(&self) -> Vec<FromHub> {
        let mut result = Vec::new();
        while let Some(batch) = self.try_recv(Duration::from_secs(1)).await {
            result.push(batch);
        }
        result
    }

    pub async fn assert_nothing_received(&self) {
        if let Some(batch) = self.try_recv(Duration::from_secs(1)).await {
            panic!("unexpected batch from the hub: {:?}", batch);
        }
    }
}

/// A [HubContext] that is connected to test peers instead of sockets
pub fn test_hub_context(config: HubConfig, store: Arc<dyn RecordStore>) -> (Arc<HubContext>, TestRequester, TestExecutor) {
    let (requester_socket, requester) = TestRequester::new(Peer::Requester, config.max_datagram_size);
    let (executor_socket, executor) = TestExecutor::new(Peer::Executor, config.max_datagram_size);

    let ctx = HubContext::new(Arc::new(config), store, requester_socket, executor_socket);
    (Arc::new(ctx), requester, executor)
}

/// Test configuration: a small truck pool, and no periodic truck status queries
pub fn test_config() -> HubConfig {
    let mut config = HubConfig::new(
        std::net::SocketAddr::from(([127, 0, 0, 1], 5555)),
        std::net::SocketAddr::from(([127, 0, 0, 1], 12345)),
    );
    config.num_trucks = 4;
    config.query_truck_status = false;
    config
}
