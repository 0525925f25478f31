use std::sync::Arc;

use anyhow::bail;
use tokio::select;
use tracing::info;

use crate::hub::dispatch::{run_executor_loop, run_requester_loop};
use crate::hub::handshake::{connect_executor, connect_requester};
use crate::hub::hub_config::HubConfig;
use crate::hub::hub_context::HubContext;
use crate::protocol::resend::run_resend_loop;
use crate::store::RecordStore;
use crate::transport::udp_socket::UdpDatagramSocket;

/// The coordination hub between a requester and an executor
pub struct Hub {
    ctx: Arc<HubContext>,
}

impl Hub {
    pub fn new(ctx: Arc<HubContext>) -> Hub {
        Hub { ctx }
    }

    /// Creates a hub that talks to its peers over UDP
    pub async fn bind(config: HubConfig, store: Arc<dyn RecordStore>) -> anyhow::Result<Hub> {
        config.validate()?;

        let requester_socket = UdpDatagramSocket::connect(config.requester_bind_addr, config.requester_addr, config.max_datagram_size).await?;
        let executor_socket = UdpDatagramSocket::connect(config.executor_bind_addr, config.executor_addr, config.max_datagram_size).await?;

        let ctx = HubContext::new(Arc::new(config), store, Arc::new(requester_socket), Arc::new(executor_socket));
        Ok(Hub::new(Arc::new(ctx)))
    }

    pub fn context(&self) -> &Arc<HubContext> {
        &self.ctx
    }

    /// Connects to both peers, returning the world id
    pub async fn handshake(&self) -> anyhow::Result<u64> {
        let world_id = connect_executor(&self.ctx).await?;
        connect_requester(&self.ctx, world_id).await?;
        Ok(world_id)
    }

    /// Runs until the transport failure budget is exhausted
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("hub is running");

        select! {
            _ = run_requester_loop(self.ctx.clone()) => bail!("requester loop terminated"),
            _ = run_executor_loop(self.ctx.clone()) => bail!("executor loop terminated"),
            _ = run_resend_loop(self.ctx.clone()) => bail!("resend loop terminated"),
            _ = self.ctx.failures.wait_fatal() => bail!("{} transport failures - shutting down", self.ctx.failures.count()),
        }
    }
}
