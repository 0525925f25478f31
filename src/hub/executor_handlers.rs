use std::sync::Arc;

use anyhow::anyhow;
use tracing::{debug, error, info, warn};

use crate::hub::hub_context::HubContext;
use crate::messages::executor_messages::{DeliveryMade, TruckArrived, TruckStatus};
use crate::messages::outbound::OutboundMessage;
use crate::messages::requester_messages::{DeliveryNotice, LoadRequest};
use crate::messages::{Peer, PeerError};
use crate::store::PackageState;

/// A completion means either that a truck arrived at its warehouse, or (with status "IDLE")
///  that it made all its deliveries
pub async fn on_truck_arrived(ctx: Arc<HubContext>, msg: TruckArrived) {
    if !ctx.accept(Peer::Executor, msg.seq).await {
        return;
    }
    if let Err(e) = do_on_truck_arrived(&ctx, &msg).await {
        error!("error handling completion {} for truck {}: {}", msg.seq, msg.truck_id, e);
    }
}

async fn do_on_truck_arrived(ctx: &HubContext, msg: &TruckArrived) -> anyhow::Result<()> {
    if msg.is_idle() {
        ctx.trucks.release(msg.truck_id).await?;
        info!("truck {} made all its deliveries", msg.truck_id);
        return Ok(());
    }

    ctx.trucks.commit(msg.truck_id).await?;
    let warehouse_id = ctx.trucks.get_warehouse(msg.truck_id).await?
        .ok_or_else(|| anyhow!("truck {} is not assigned to a warehouse", msg.truck_id))?;
    let package_ids = ctx.trucks.get_packages(msg.truck_id).await?;
    info!("truck {} arrived at warehouse {} for {} package(s)", msg.truck_id, warehouse_id, package_ids.len());

    for &package_id in &package_ids {
        ctx.store.set_package_state(package_id, PackageState::WaitingAtWarehouse).await?;
    }

    ctx.send_tracked(|seq| OutboundMessage::LoadRequest(LoadRequest {
        seq,
        truck_id: msg.truck_id,
        warehouse_id,
        shipment_ids: package_ids,
    })).await;
    Ok(())
}

pub async fn on_delivery_made(ctx: Arc<HubContext>, msg: DeliveryMade) {
    if !ctx.accept(Peer::Executor, msg.seq).await {
        return;
    }
    if let Err(e) = do_on_delivery_made(&ctx, &msg).await {
        error!("error handling delivery {} of package {}: {}", msg.seq, msg.package_id, e);
    }
}

async fn do_on_delivery_made(ctx: &HubContext, msg: &DeliveryMade) -> anyhow::Result<()> {
    ctx.store.set_package_state(msg.package_id, PackageState::Delivered).await?;
    debug!("truck {} delivered package {}", msg.truck_id, msg.package_id);

    ctx.send_tracked(|seq| OutboundMessage::Delivery(DeliveryNotice {
        seq,
        shipment_id: msg.package_id,
    })).await;
    Ok(())
}

pub async fn on_truck_status(ctx: Arc<HubContext>, msg: TruckStatus) {
    if !ctx.accept(Peer::Executor, msg.seq).await {
        return;
    }
    debug!("truck {} at ({}, {}): {}", msg.truck_id, msg.location.x, msg.location.y, msg.status);
}

pub async fn on_executor_error(ctx: Arc<HubContext>, msg: PeerError) {
    if !ctx.accept(Peer::Executor, msg.seq).await {
        return;
    }
    warn!("executor reported an error for message {}: {}", msg.origin_seq, msg.message);
}

#[cfg(test)]
mod tests {
    use crate::messages::executor_messages::{ExecutorCommands, IDLE_STATUS};
    use crate::messages::Location;
    use crate::messages::requester_messages::RequesterOutbound;
    use crate::protocol::sequence::SequenceNumber;
    use crate::store::in_memory::InMemoryRecordStore;
    use crate::store::RecordStore;
    use crate::test_util::{test_config, test_hub_context};
    use crate::trucks::truck::TruckState;
    use super::*;

    fn seq(raw: u64) -> SequenceNumber {
        SequenceNumber::from_raw(raw)
    }

    fn arrived(seq_raw: u64, truck_id: u32, status: &str) -> TruckArrived {
        TruckArrived { seq: seq(seq_raw), truck_id, location: Location::new(5, 5), status: status.to_string() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_truck_arrived_at_warehouse() {
        let store = Arc::new(InMemoryRecordStore::default());
        store.create_package(100, Location::new(10, 20), None).await.unwrap();
        let (ctx, requester, executor) = test_hub_context(test_config(), store.clone());

        let truck_id = ctx.trucks.acquire_for_warehouse(3).await.unwrap();
        ctx.trucks.add_package(truck_id, 100).await.unwrap();

        on_truck_arrived(ctx.clone(), arrived(11, truck_id, "ARRIVE WAREHOUSE")).await;

        assert_eq!(executor.recv().await, ExecutorCommands::ack(seq(11)));
        assert_eq!(requester.recv().await, RequesterOutbound {
            load_requests: vec![LoadRequest { seq: seq(0), truck_id, warehouse_id: 3, shipment_ids: vec![100] }],
            ..Default::default()
        });
        assert_eq!(ctx.trucks.reservation(3).await, None);
        assert_eq!(ctx.trucks.get_state(truck_id).await.unwrap(), TruckState::Committed(3));
        assert_eq!(store.package_state(100).await, Some(PackageState::WaitingAtWarehouse));
    }

    #[tokio::test(start_paused = true)]
    async fn test_truck_arrived_idle() {
        let store = Arc::new(InMemoryRecordStore::default());
        let (ctx, requester, executor) = test_hub_context(test_config(), store);

        let truck_id = ctx.trucks.acquire_for_warehouse(3).await.unwrap();
        ctx.trucks.add_package(truck_id, 100).await.unwrap();
        ctx.trucks.commit(truck_id).await.unwrap();

        on_truck_arrived(ctx.clone(), arrived(12, truck_id, IDLE_STATUS)).await;

        assert_eq!(executor.recv().await, ExecutorCommands::ack(seq(12)));
        requester.assert_nothing_received().await;
        assert_eq!(ctx.trucks.get_state(truck_id).await.unwrap(), TruckState::Available);
        assert!(ctx.trucks.get_packages(truck_id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_truck_arrived_unassigned() {
        let store = Arc::new(InMemoryRecordStore::default());
        let (ctx, requester, executor) = test_hub_context(test_config(), store);

        on_truck_arrived(ctx.clone(), arrived(12, 1, "ARRIVE WAREHOUSE")).await;

        assert_eq!(executor.recv().await, ExecutorCommands::ack(seq(12)));
        requester.assert_nothing_received().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_truck_arrived_redelivered() {
        let store = Arc::new(InMemoryRecordStore::default());
        let (ctx, requester, executor) = test_hub_context(test_config(), store);

        let truck_id = ctx.trucks.acquire_for_warehouse(3).await.unwrap();
        on_truck_arrived(ctx.clone(), arrived(12, truck_id, "ARRIVE WAREHOUSE")).await;
        on_truck_arrived(ctx.clone(), arrived(12, truck_id, "ARRIVE WAREHOUSE")).await;

        assert_eq!(executor.recv_all().await, vec![ExecutorCommands::ack(seq(12)); 2]);
        assert_eq!(requester.recv_all().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivery_made() {
        let store = Arc::new(InMemoryRecordStore::default());
        store.create_package(100, Location::new(10, 20), None).await.unwrap();
        store.set_package_state(100, PackageState::OutForDelivery).await.unwrap();
        let (ctx, requester, executor) = test_hub_context(test_config(), store.clone());

        on_delivery_made(ctx.clone(), DeliveryMade { seq: seq(3), truck_id: 1, package_id: 100 }).await;

        assert_eq!(executor.recv().await, ExecutorCommands::ack(seq(3)));
        assert_eq!(requester.recv().await, RequesterOutbound {
            deliveries: vec![DeliveryNotice { seq: seq(0), shipment_id: 100 }],
            ..Default::default()
        });
        assert_eq!(store.package_state(100).await, Some(PackageState::Delivered));
    }

    #[tokio::test(start_paused = true)]
    async fn test_truck_status_and_error() {
        let store = Arc::new(InMemoryRecordStore::default());
        let (ctx, requester, executor) = test_hub_context(test_config(), store);

        on_truck_status(ctx.clone(), TruckStatus { seq: seq(1), truck_id: 2, status: "IDLE".to_string(), location: Location::new(0, 0) }).await;
        on_executor_error(ctx.clone(), PeerError { seq: seq(2), origin_seq: seq(17), message: "invalid truck".to_string() }).await;

        assert_eq!(executor.recv_all().await, vec![ExecutorCommands::ack(seq(1)), ExecutorCommands::ack(seq(2))]);
        requester.assert_nothing_received().await;
    }
}
