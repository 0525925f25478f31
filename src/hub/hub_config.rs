use std::net::SocketAddr;
use std::time::Duration;

use anyhow::bail;

use crate::messages::Location;

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub requester_addr: SocketAddr,
    pub executor_addr: SocketAddr,
    pub requester_bind_addr: SocketAddr,
    pub executor_bind_addr: SocketAddr,

    pub num_trucks: u32,
    /// all trucks start out at the same location
    pub truck_home: Location,

    pub resend_interval: Duration,
    /// an unacknowledged message is sent again once it is this old
    pub resend_threshold: Duration,
    /// if set, a resent message's timestamp is reset so that it is not resent again until the
    ///  threshold passes once more
    pub restamp_on_resend: bool,
    pub dedup_window: Duration,

    pub max_transport_failures: usize,
    pub max_concurrent_handlers_per_peer: usize,
    /// `None` means that a pickup waits for a truck for as long as it takes
    pub truck_acquire_timeout: Option<Duration>,

    pub sim_speed: u32,
    pub query_truck_status: bool,
    /// how long to wait for the requester's ack of the connect message before sending it again
    pub handshake_poll_interval: Duration,
    pub max_datagram_size: usize,
}

impl HubConfig {
    pub fn new(requester_addr: SocketAddr, executor_addr: SocketAddr) -> HubConfig {
        HubConfig {
            requester_addr,
            executor_addr,
            requester_bind_addr: Self::unspecified_for(requester_addr),
            executor_bind_addr: Self::unspecified_for(executor_addr),
            num_trucks: 1024,
            truck_home: Location::new(0, 0),
            resend_interval: Duration::from_secs(30),
            resend_threshold: Duration::from_secs(30),
            restamp_on_resend: false,
            dedup_window: Duration::from_secs(120 * 60),
            max_transport_failures: 20,
            max_concurrent_handlers_per_peer: 256,
            truck_acquire_timeout: None,
            sim_speed: 100,
            query_truck_status: true,
            handshake_poll_interval: Duration::from_secs(1),
            max_datagram_size: 65507,
        }
    }

    fn unspecified_for(addr: SocketAddr) -> SocketAddr {
        if addr.is_ipv6() {
            SocketAddr::from(([0u16; 8], 0))
        }
        else {
            SocketAddr::from(([0u8; 4], 0))
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.num_trucks == 0 {
            bail!("there must be at least one truck");
        }
        if self.resend_interval.is_zero() {
            bail!("resend interval must not be zero");
        }
        if self.handshake_poll_interval.is_zero() {
            bail!("handshake poll interval must not be zero");
        }
        if self.dedup_window < self.resend_threshold {
            bail!("dedup window {:?} is shorter than the resend threshold {:?}: redelivered messages would be handled twice", self.dedup_window, self.resend_threshold);
        }
        if self.max_transport_failures == 0 {
            bail!("max transport failures must be at least 1");
        }
        if self.max_concurrent_handlers_per_peer == 0 {
            bail!("max concurrent handlers per peer must be at least 1");
        }
        if self.max_datagram_size < size_of::<u64>() {
            bail!("max datagram size {} is too small to hold a checksum", self.max_datagram_size);
        }
        Ok(())
    }
}
