use std::sync::Arc;

use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::hub::hub_context::HubContext;
use crate::messages::executor_messages::TruckQuery;
use crate::messages::outbound::OutboundMessage;

/// Periodically evicts stale entries from both dedup caches, and sends overdue messages again
///  under their original sequence numbers
pub async fn run_resend_loop(ctx: Arc<HubContext>) {
    info!("resending unacknowledged messages every {:?}", ctx.config.resend_interval);

    let mut ticks = interval(ctx.config.resend_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticks.tick().await;

    loop {
        ticks.tick().await;
        on_resend_tick(&ctx, Instant::now()).await;
    }
}

pub async fn on_resend_tick(ctx: &HubContext, now: Instant) {
    tokio::join!(
        evict_stale(ctx, now),
        resend_due(ctx, now),
    );

    if ctx.config.query_truck_status {
        query_trucks(ctx).await;
    }
}

async fn evict_stale(ctx: &HubContext, now: Instant) {
    ctx.requester_dedup.evict_stale(now).await;
    ctx.executor_dedup.evict_stale(now).await;
}

async fn resend_due(ctx: &HubContext, now: Instant) {
    let due = ctx.allocator.due_for_resend(now).await;
    if due.is_empty() {
        return;
    }

    debug!("resending {} unacknowledged message(s)", due.len());
    let messages = due.into_iter()
        .map(|entry| entry.payload)
        .collect::<Vec<_>>();
    ctx.send_messages(&messages).await;
}

/// Asks the executor for the status of every truck, in a single batch
async fn query_trucks(ctx: &HubContext) {
    let mut queries = Vec::new();
    for truck in ctx.trucks.trucks() {
        let seq = ctx.allocator.allocate().await;
        let query = OutboundMessage::TruckQuery(TruckQuery { seq, truck_id: truck.id });
        ctx.allocator.record_sent(query.clone()).await;
        queries.push(query);
    }
    ctx.send_messages(&queries).await;
}
