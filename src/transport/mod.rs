//! Moving batches between the hub and its peers: one datagram per batch, checksummed, with
//!  a shared failure budget that brings the hub down once a peer link is deemed unusable.

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;

pub mod failures;
pub mod peer_link;
pub mod udp_socket;

/// A connection-less socket that is bound to a single remote peer
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatagramSocket: Send + Sync + 'static {
    async fn send_datagram(&self, buf: &[u8]) -> anyhow::Result<()>;

    async fn recv_datagram(&self) -> anyhow::Result<Vec<u8>>;
}
