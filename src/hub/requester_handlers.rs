//! Handlers for messages from the Requester. Each handler runs in its own task; it acknowledges
//!  the message, and performs the domain action only for the first delivery of a given
//!  sequence number.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::hub::hub_context::HubContext;
use crate::messages::executor_messages::{DeliveryLocation, GoDeliver, GoPickup};
use crate::messages::outbound::OutboundMessage;
use crate::messages::requester_messages::{LoadFinishedRequest, PickupRequest, UserValidationRequest, UserValidationResponse};
use crate::messages::{Peer, PeerError, TruckId, WarehouseId};
use crate::store::PackageState;

pub async fn on_user_validation(ctx: Arc<HubContext>, msg: UserValidationRequest) {
    if !ctx.accept(Peer::Requester, msg.seq).await {
        return;
    }
    if let Err(e) = do_on_user_validation(&ctx, &msg).await {
        error!("error handling user validation request {}: {}", msg.seq, e);
    }
}

async fn do_on_user_validation(ctx: &HubContext, msg: &UserValidationRequest) -> anyhow::Result<()> {
    let is_valid = ctx.store.account_exists(&msg.account).await?;
    debug!("account {:?} for shipment {} is valid: {}", msg.account, msg.shipment_id, is_valid);

    ctx.send_tracked(|seq| OutboundMessage::UserValidation(UserValidationResponse {
        seq,
        shipment_id: msg.shipment_id,
        is_valid,
    })).await;
    Ok(())
}

pub async fn on_pickup(ctx: Arc<HubContext>, msg: PickupRequest) {
    if let Some(truck_id) = await_pickup_truck(&ctx, &msg).await {
        finish_pickup(ctx, msg, truck_id).await;
    }
}

/// The part of handling a pickup request that may wait for a long time: acknowledging the
///  request and acquiring a truck for its warehouse. Returns `None` if the request was handled
///  before, or if no truck could be acquired.
pub async fn await_pickup_truck(ctx: &HubContext, msg: &PickupRequest) -> Option<TruckId> {
    if !ctx.accept(Peer::Requester, msg.seq).await {
        return None;
    }
    match acquire_truck(ctx, msg.warehouse_id).await {
        Ok(truck_id) => Some(truck_id),
        Err(e) => {
            error!("error handling pickup request {} at warehouse {}: {}", msg.seq, msg.warehouse_id, e);
            None
        }
    }
}

/// Loads the request's shipments onto the acquired truck and sends it to the warehouse
pub async fn finish_pickup(ctx: Arc<HubContext>, msg: PickupRequest, truck_id: TruckId) {
    if let Err(e) = do_finish_pickup(&ctx, &msg, truck_id).await {
        error!("error handling pickup request {} at warehouse {}: {}", msg.seq, msg.warehouse_id, e);
    }
}

async fn do_finish_pickup(ctx: &HubContext, msg: &PickupRequest, truck_id: TruckId) -> anyhow::Result<()> {
    info!("truck {} picks up {} shipment(s) at warehouse {}", truck_id, msg.shipments.len(), msg.warehouse_id);

    for shipment in &msg.shipments {
        ctx.store.create_package(shipment.shipment_id, shipment.destination, shipment.account.clone()).await?;
        for product in &shipment.products {
            ctx.store.create_product(shipment.shipment_id, &product.description, product.count).await?;
        }
        ctx.store.set_package_state(shipment.shipment_id, PackageState::EnRouteToWarehouse).await?;
        ctx.trucks.add_package(truck_id, shipment.shipment_id).await?;
    }

    ctx.send_tracked(|seq| OutboundMessage::Pickup(GoPickup {
        seq,
        truck_id,
        warehouse_id: msg.warehouse_id,
    })).await;
    Ok(())
}

async fn acquire_truck(ctx: &HubContext, warehouse_id: WarehouseId) -> anyhow::Result<TruckId> {
    match ctx.config.truck_acquire_timeout {
        Some(timeout) => ctx.trucks.acquire_for_warehouse_timeout(warehouse_id, timeout).await,
        None => ctx.trucks.acquire_for_warehouse(warehouse_id).await,
    }
}

pub async fn on_load_finished(ctx: Arc<HubContext>, msg: LoadFinishedRequest) {
    if !ctx.accept(Peer::Requester, msg.seq).await {
        return;
    }
    if let Err(e) = do_on_load_finished(&ctx, &msg).await {
        error!("error handling load finished request {} for truck {}: {}", msg.seq, msg.truck_id, e);
    }
}

async fn do_on_load_finished(ctx: &HubContext, msg: &LoadFinishedRequest) -> anyhow::Result<()> {
    let mut packages = Vec::new();
    for &package_id in &msg.shipment_ids {
        packages.push(DeliveryLocation {
            package_id,
            location: ctx.store.package_destination(package_id).await?,
        });
    }

    for &package_id in &msg.shipment_ids {
        ctx.store.set_package_state(package_id, PackageState::OutForDelivery).await?;
    }

    info!("truck {} delivers {} package(s)", msg.truck_id, packages.len());
    ctx.send_tracked(|seq| OutboundMessage::Deliver(GoDeliver {
        seq,
        truck_id: msg.truck_id,
        packages,
    })).await;
    Ok(())
}

pub async fn on_requester_error(ctx: Arc<HubContext>, msg: PeerError) {
    if !ctx.accept(Peer::Requester, msg.seq).await {
        return;
    }
    warn!("requester reported an error for message {}: {}", msg.origin_seq, msg.message);
}
