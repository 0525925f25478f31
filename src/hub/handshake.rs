//! Connection setup with both peers. The executor is connected first since the requester
//!  needs to know the world id the executor assigned.

use anyhow::bail;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::hub::hub_context::HubContext;
use crate::messages::executor_messages::{ExecutorCommands, ExecutorConnect, TruckInit};
use crate::messages::requester_messages::{RequesterConnect, RequesterOutbound};
use crate::protocol::sequence::SequenceNumber;

/// Sends the trucks' initial positions to the executor, and waits for it to confirm the
///  connection. The connect message is sent only once, since every connect request makes the
///  executor create a new world. Rejections are logged, and waiting continues.
///
/// Returns the world id assigned by the executor.
pub async fn connect_executor(ctx: &HubContext) -> anyhow::Result<u64> {
    let connect = ExecutorCommands {
        connect: Some(ExecutorConnect {
            world_id: None,
            trucks: ctx.trucks.trucks().iter()
                .map(|truck| TruckInit { id: truck.id, location: truck.home })
                .collect(),
        }),
        ..Default::default()
    };

    while !ctx.executor.send(&connect).await {
        check_not_fatal(ctx)?;
    }
    debug!("sent connect request with {} trucks to executor", ctx.trucks.trucks().len());

    let world_id = await_connected(ctx).await?;
    info!("connected to executor, world id is {}", world_id);
    Ok(world_id)
}

async fn await_connected(ctx: &HubContext) -> anyhow::Result<u64> {
    loop {
        match ctx.executor.receive().await {
            Some(batch) => match batch.connected {
                Some(connected) if connected.is_success() => return Ok(connected.world_id),
                Some(connected) => warn!("executor rejected connection to world {}: {}", connected.world_id, connected.result),
                None => debug!("ignoring executor batch while waiting for connection response"),
            },
            None => check_not_fatal(ctx)?,
        }
    }
}

/// Sends a sequence-numbered connect message to the requester until the requester
///  acknowledges that sequence number
pub async fn connect_requester(ctx: &HubContext, world_id: u64) -> anyhow::Result<()> {
    let seq = ctx.allocator.allocate().await;
    let connect = RequesterOutbound {
        connect: vec![RequesterConnect { seq, world_id }],
        ..Default::default()
    };

    loop {
        while !ctx.requester.send(&connect).await {
            check_not_fatal(ctx)?;
        }
        debug!("sent connect request {} for world {} to requester", seq, world_id);

        if let Ok(result) = timeout(ctx.config.handshake_poll_interval, await_ack(ctx, seq)).await {
            result?;
            ctx.allocator.acknowledge(seq).await;
            info!("connected to requester");
            return Ok(());
        }
        debug!("no acknowledgment from requester yet");
    }
}

async fn await_ack(ctx: &HubContext, seq: SequenceNumber) -> anyhow::Result<()> {
    loop {
        match ctx.requester.receive().await {
            Some(batch) => {
                if batch.acks.contains(&seq) {
                    return Ok(());
                }
                debug!("ignoring requester batch while waiting for connection ack");
            }
            None => check_not_fatal(ctx)?,
        }
    }
}

fn check_not_fatal(ctx: &HubContext) -> anyhow::Result<()> {
    if ctx.failures.is_fatal() {
        bail!("giving up connecting after {} transport failures", ctx.failures.count());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use crate::messages::executor_messages::{Connected, ExecutorResponses};
    use crate::messages::Location;
    use crate::messages::requester_messages::RequesterInbound;
    use crate::store::in_memory::InMemoryRecordStore;
    use crate::test_util::{test_config, test_hub_context};
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_connect_executor() {
        let (ctx, _requester, executor) = test_hub_context(test_config(), Arc::new(InMemoryRecordStore::default()));

        let connecting = {
            let ctx = ctx.clone();
            tokio::spawn(async move { connect_executor(&ctx).await })
        };

        let connect = executor.recv().await.connect.unwrap();
        assert_eq!(connect.world_id, None);
        assert_eq!(connect.trucks.len(), 4);
        assert_eq!(connect.trucks[3], TruckInit { id: 3, location: Location::new(0, 0) });

        executor.send(ExecutorResponses {
            connected: Some(Connected { world_id: 42, result: Connected::SUCCESS.to_string() }),
            ..Default::default()
        }).await;

        assert_eq!(connecting.await.unwrap().unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_executor_sends_once() {
        let (ctx, _requester, executor) = test_hub_context(test_config(), Arc::new(InMemoryRecordStore::default()));

        let connecting = {
            let ctx = ctx.clone();
            tokio::spawn(async move { connect_executor(&ctx).await })
        };

        // a slow executor does not get a second connect request
        assert!(executor.recv().await.connect.is_some());
        assert!(executor.try_recv(Duration::from_secs(30)).await.is_none());
        assert!(!connecting.is_finished());

        executor.send(ExecutorResponses {
            connected: Some(Connected { world_id: 1, result: "error: no such world".to_string() }),
            ..Default::default()
        }).await;
        executor.send(ExecutorResponses::default()).await;
        assert!(executor.try_recv(Duration::from_secs(30)).await.is_none());
        assert!(!connecting.is_finished());

        executor.send(ExecutorResponses {
            connected: Some(Connected { world_id: 2, result: Connected::SUCCESS.to_string() }),
            ..Default::default()
        }).await;
        assert_eq!(connecting.await.unwrap().unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_requester() {
        let (ctx, requester, _executor) = test_hub_context(test_config(), Arc::new(InMemoryRecordStore::default()));

        let connecting = {
            let ctx = ctx.clone();
            tokio::spawn(async move { connect_requester(&ctx, 42).await })
        };

        let connect = requester.recv().await.connect;
        assert_eq!(connect, vec![RequesterConnect { seq: SequenceNumber::ZERO, world_id: 42 }]);

        requester.send(RequesterInbound { acks: vec![SequenceNumber::from_raw(17)], ..Default::default() }).await;
        assert!(!requester.recv().await.connect.is_empty());

        requester.send(RequesterInbound { acks: vec![SequenceNumber::ZERO], ..Default::default() }).await;
        connecting.await.unwrap().unwrap();
        assert_eq!(ctx.allocator.num_in_flight().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_when_fatal() {
        let mut config = test_config();
        config.max_transport_failures = 1;
        let (ctx, _requester, executor) = test_hub_context(config, Arc::new(InMemoryRecordStore::default()));
        drop(executor);

        assert!(connect_executor(&ctx).await.is_err());
    }
}
