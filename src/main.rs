use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use clap_derive::Parser;
use dispatch_hub::hub::hub::Hub;
use dispatch_hub::hub::hub_config::HubConfig;
use dispatch_hub::store::in_memory::InMemoryRecordStore;
use tracing::{info, Level};

#[derive(Parser)]
struct Args {
    /// address of the requester
    #[clap(long, default_value = "127.0.0.1:5555")]
    requester: SocketAddr,

    /// address of the executor
    #[clap(long, default_value = "127.0.0.1:12345")]
    executor: SocketAddr,

    #[clap(long)]
    requester_bind: Option<SocketAddr>,

    #[clap(long)]
    executor_bind: Option<SocketAddr>,

    #[clap(long)]
    num_trucks: Option<u32>,

    #[clap(long)]
    sim_speed: Option<u32>,

    /// give up waiting for a free truck after this many seconds
    #[clap(long)]
    truck_acquire_timeout_secs: Option<u64>,

    #[clap(long, default_value_t = false)]
    restamp_on_resend: bool,

    #[clap(long, default_value_t = false)]
    no_truck_status_query: bool,

    /// user accounts known to the hub's in-memory record store
    #[clap(long)]
    account: Vec<String>,

    #[clap(short, long, default_value_t = false)]
    verbose: bool,

    #[clap(long, default_value_t = false)]
    very_verbose: bool,
}

#[tokio::main]
pub async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match (args.verbose, args.very_verbose) {
        (_, true) => Level::TRACE,
        (true, _) => Level::DEBUG,
        (false, false) => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .try_init()
        .ok();

    let mut config = HubConfig::new(args.requester, args.executor);
    if let Some(addr) = args.requester_bind {
        config.requester_bind_addr = addr;
    }
    if let Some(addr) = args.executor_bind {
        config.executor_bind_addr = addr;
    }
    if let Some(num_trucks) = args.num_trucks {
        config.num_trucks = num_trucks;
    }
    if let Some(sim_speed) = args.sim_speed {
        config.sim_speed = sim_speed;
    }
    config.truck_acquire_timeout = args.truck_acquire_timeout_secs.map(Duration::from_secs);
    config.restamp_on_resend = args.restamp_on_resend;
    config.query_truck_status = !args.no_truck_status_query;

    let store = Arc::new(InMemoryRecordStore::new(args.account));
    let hub = Hub::bind(config, store).await?;

    let world_id = hub.handshake().await?;
    info!("world {} is ready", world_id);

    hub.run().await
}
