use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info, span, trace, warn, Instrument, Level, Span};
use uuid::Uuid;

use crate::hub::executor_handlers::{on_delivery_made, on_executor_error, on_truck_arrived, on_truck_status};
use crate::hub::hub_context::HubContext;
use crate::hub::requester_handlers::{await_pickup_truck, finish_pickup, on_load_finished, on_requester_error, on_user_validation};
use crate::messages::executor_messages::ExecutorResponses;
use crate::messages::requester_messages::RequesterInbound;
use crate::messages::Peer;

/// Runs each handler in a task of its own, with a limit on the number of handlers per peer
///  that run at the same time. Once the limit is reached, the receive loop waits for a
///  running handler to finish before it spawns the next one.
///
/// A handler that may wait for a resource which only a later message frees up (i.e. a pickup
///  waiting for a truck) must do that waiting without a permit, see
///  [HandlerSpawner::spawn_after_wait]. Otherwise waiting handlers could use up all permits
///  and stall the receive loop for good.
pub struct HandlerSpawner {
    peer: Peer,
    permits: Arc<Semaphore>,
}

impl HandlerSpawner {
    pub fn new(peer: Peer, max_concurrent: usize) -> HandlerSpawner {
        HandlerSpawner {
            peer,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    pub async fn spawn(&self, handler: impl Future<Output = ()> + Send + 'static) {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                error!("handler semaphore for {} was closed - dropping message", self.peer);
                return;
            }
        };

        tokio::spawn(async move {
            handler.await;
            drop(permit);
        }.instrument(Span::current()));
    }

    /// Spawns a task that first runs `wait` without holding a permit, and then `handler`
    ///  with a permit. If `wait` returns `None`, there is nothing left to do. This never blocks
    ///  the caller.
    pub fn spawn_after_wait<W, T, F, H>(&self, wait: W, handler: F)
    where
        W: Future<Output = Option<T>> + Send + 'static,
        T: Send + 'static,
        F: FnOnce(T) -> H + Send + 'static,
        H: Future<Output = ()> + Send + 'static,
    {
        let peer = self.peer;
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let Some(value) = wait.await else {
                return;
            };
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    error!("handler semaphore for {} was closed - dropping message", peer);
                    return;
                }
            };
            handler(value).await;
        }.instrument(Span::current()));
    }

    pub fn num_available(&self) -> usize {
        self.permits.available_permits()
    }
}

pub async fn run_requester_loop(ctx: Arc<HubContext>) {
    info!("starting receive loop for requester");
    let spawner = HandlerSpawner::new(Peer::Requester, ctx.config.max_concurrent_handlers_per_peer);

    loop {
        let Some(batch) = ctx.requester.receive().await else {
            continue;
        };

        let correlation_id = Uuid::new_v4();
        let span = span!(Level::INFO, "batch_received", peer = %Peer::Requester, ?correlation_id);
        dispatch_requester_batch(&ctx, &spawner, batch).instrument(span).await;
    }
}

pub async fn dispatch_requester_batch(ctx: &Arc<HubContext>, spawner: &HandlerSpawner, batch: RequesterInbound) {
    trace!("received {:?}", batch);

    for ack in batch.acks {
        ctx.allocator.acknowledge(ack).await;
    }
    if batch.disconnect {
        warn!("requester asked to disconnect - ignoring");
    }

    for msg in batch.user_validations {
        spawner.spawn(on_user_validation(ctx.clone(), msg)).await;
    }
    for msg in batch.pickups {
        let ctx = ctx.clone();
        spawner.spawn_after_wait(
            async move {
                let truck_id = await_pickup_truck(&ctx, &msg).await?;
                Some((ctx, msg, truck_id))
            },
            |(ctx, msg, truck_id)| finish_pickup(ctx, msg, truck_id),
        );
    }
    for msg in batch.load_finished {
        spawner.spawn(on_load_finished(ctx.clone(), msg)).await;
    }
    for msg in batch.errors {
        spawner.spawn(on_requester_error(ctx.clone(), msg)).await;
    }
}

pub async fn run_executor_loop(ctx: Arc<HubContext>) {
    info!("starting receive loop for executor");
    let spawner = HandlerSpawner::new(Peer::Executor, ctx.config.max_concurrent_handlers_per_peer);

    loop {
        let Some(batch) = ctx.executor.receive().await else {
            continue;
        };

        let correlation_id = Uuid::new_v4();
        let span = span!(Level::INFO, "batch_received", peer = %Peer::Executor, ?correlation_id);
        dispatch_executor_batch(&ctx, &spawner, batch).instrument(span).await;
    }
}

pub async fn dispatch_executor_batch(ctx: &Arc<HubContext>, spawner: &HandlerSpawner, batch: ExecutorResponses) {
    trace!("received {:?}", batch);

    for ack in batch.acks {
        ctx.allocator.acknowledge(ack).await;
    }
    if let Some(connected) = batch.connected {
        warn!("unexpected connection response for world {} after the handshake: {}", connected.world_id, connected.result);
    }
    if batch.finished {
        warn!("executor reports that it finished - ignoring");
    }

    for msg in batch.completions {
        spawner.spawn(on_truck_arrived(ctx.clone(), msg)).await;
    }
    for msg in batch.delivered {
        spawner.spawn(on_delivery_made(ctx.clone(), msg)).await;
    }
    for msg in batch.truck_status {
        spawner.spawn(on_truck_status(ctx.clone(), msg)).await;
    }
    for msg in batch.errors {
        spawner.spawn(on_executor_error(ctx.clone(), msg)).await;
    }
}
