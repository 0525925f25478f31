use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{anyhow, bail};
use rustc_hash::FxHashMap;
use tokio::select;
use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::{debug, trace};

use crate::messages::{Location, PackageId, TruckId, WarehouseId};
use crate::trucks::truck::{Truck, TruckState};

struct PoolState {
    available: VecDeque<TruckId>,
    /// at most one truck per warehouse, and only while that truck is in state `Reserved`
    reservations: FxHashMap<WarehouseId, TruckId>,
    states: Vec<TruckState>,
}

impl PoolState {
    fn state(&self, truck_id: TruckId) -> anyhow::Result<TruckState> {
        self.states.get(truck_id as usize)
            .copied()
            .ok_or_else(|| anyhow!("unknown truck {}", truck_id))
    }
}

/// The hub's trucks, and their assignment to warehouses.
///
/// Pickup requests for a warehouse are merged onto the truck that is currently reserved for it.
///  If there is no such truck, a requester waits until a truck becomes available: the pool
///  holds one semaphore permit per available truck, and a waiter also wakes up when some other
///  waiter reserves a truck for the same warehouse.
pub struct TruckPool {
    trucks: Vec<Truck>,
    state: Mutex<PoolState>,
    available_permits: Semaphore,
    reservation_made: Notify,
}

impl TruckPool {
    pub fn new(num_trucks: u32, home: Location) -> TruckPool {
        TruckPool {
            trucks: (0..num_trucks)
                .map(|id| Truck::new(id, home))
                .collect(),
            state: Mutex::new(PoolState {
                available: (0..num_trucks).collect(),
                reservations: Default::default(),
                states: vec![TruckState::Available; num_trucks as usize],
            }),
            available_permits: Semaphore::new(num_trucks as usize),
            reservation_made: Notify::new(),
        }
    }

    pub fn trucks(&self) -> &[Truck] {
        &self.trucks
    }

    fn truck(&self, truck_id: TruckId) -> anyhow::Result<&Truck> {
        self.trucks.get(truck_id as usize)
            .ok_or_else(|| anyhow!("unknown truck {}", truck_id))
    }

    /// Returns the truck reserved for a warehouse, reserving one if there is none. This waits
    ///  for as long as it takes for a truck to become available.
    pub async fn acquire_for_warehouse(&self, warehouse_id: WarehouseId) -> anyhow::Result<TruckId> {
        loop {
            // registered before checking so that a reservation made in between is not missed
            let reservation_made = self.reservation_made.notified();

            if let Some(&truck_id) = self.state.lock().await.reservations.get(&warehouse_id) {
                trace!("merging pickup at warehouse {} onto truck {}", warehouse_id, truck_id);
                return Ok(truck_id);
            }

            select! {
                permit = self.available_permits.acquire() => {
                    let permit = permit?;
                    let mut state = self.state.lock().await;

                    if let Some(&truck_id) = state.reservations.get(&warehouse_id) {
                        // dropping the permit leaves it for the next waiter
                        return Ok(truck_id);
                    }

                    let truck_id = match state.available.pop_front() {
                        Some(truck_id) => truck_id,
                        None => bail!("truck pool is inconsistent: permit without available truck"),
                    };
                    permit.forget();

                    state.states[truck_id as usize] = TruckState::Reserved(warehouse_id);
                    state.reservations.insert(warehouse_id, truck_id);
                    self.reservation_made.notify_waiters();

                    debug!("reserved truck {} for warehouse {}", truck_id, warehouse_id);
                    return Ok(truck_id);
                }
                _ = reservation_made => {}
            }
        }
    }

    pub async fn acquire_for_warehouse_timeout(&self, warehouse_id: WarehouseId, timeout: Duration) -> anyhow::Result<TruckId> {
        tokio::time::timeout(timeout, self.acquire_for_warehouse(warehouse_id)).await
            .map_err(|_| anyhow!("no truck available for warehouse {} within {:?}", warehouse_id, timeout))?
    }

    /// The truck left for its warehouse: subsequent pickups there need a different truck
    pub async fn commit(&self, truck_id: TruckId) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        match state.state(truck_id)? {
            TruckState::Available => bail!("truck {} can not be committed: it is not reserved", truck_id),
            TruckState::Committed(warehouse_id) => {
                debug!("truck {} is already committed to warehouse {}", truck_id, warehouse_id);
            }
            TruckState::Reserved(warehouse_id) => {
                if state.reservations.get(&warehouse_id) == Some(&truck_id) {
                    state.reservations.remove(&warehouse_id);
                }
                state.states[truck_id as usize] = TruckState::Committed(warehouse_id);
                debug!("truck {} committed to warehouse {}", truck_id, warehouse_id);
            }
        }
        Ok(())
    }

    pub async fn add_package(&self, truck_id: TruckId, package_id: PackageId) -> anyhow::Result<()> {
        if self.state.lock().await.state(truck_id)? == TruckState::Available {
            bail!("package {} can not be added to truck {}: the truck is not assigned", package_id, truck_id);
        }
        self.truck(truck_id)?.add_package(package_id).await;
        Ok(())
    }

    /// All deliveries are done: the truck's packages are cleared, and it is available for any
    ///  warehouse again. Releasing an available truck is a no-op.
    pub async fn release(&self, truck_id: TruckId) -> anyhow::Result<()> {
        let truck = self.truck(truck_id)?;

        let mut state = self.state.lock().await;
        match state.state(truck_id)? {
            TruckState::Available => {
                debug!("truck {} is already available", truck_id);
                return Ok(());
            }
            TruckState::Reserved(warehouse_id) => {
                if state.reservations.get(&warehouse_id) == Some(&truck_id) {
                    state.reservations.remove(&warehouse_id);
                }
            }
            TruckState::Committed(_) => {}
        }

        truck.clear_packages().await;
        state.states[truck_id as usize] = TruckState::Available;
        state.available.push_back(truck_id);
        self.available_permits.add_permits(1);

        debug!("truck {} is available again", truck_id);
        Ok(())
    }

    pub async fn get_packages(&self, truck_id: TruckId) -> anyhow::Result<Vec<PackageId>> {
        Ok(self.truck(truck_id)?.packages().await)
    }

    pub async fn get_warehouse(&self, truck_id: TruckId) -> anyhow::Result<Option<WarehouseId>> {
        Ok(self.state.lock().await.state(truck_id)?.warehouse())
    }

    pub async fn get_state(&self, truck_id: TruckId) -> anyhow::Result<TruckState> {
        self.state.lock().await.state(truck_id)
    }

    pub async fn reservation(&self, warehouse_id: WarehouseId) -> Option<TruckId> {
        self.state.lock().await.reservations.get(&warehouse_id).copied()
    }

    pub fn num_available(&self) -> usize {
        self.available_permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use super::*;

    fn pool(num_trucks: u32) -> Arc<TruckPool> {
        Arc::new(TruckPool::new(num_trucks, Location::new(0, 0)))
    }

    #[tokio::test]
    async fn test_new() {
        let pool = pool(3);
        assert_eq!(pool.trucks().len(), 3);
        assert_eq!(pool.num_available(), 3);
        assert_eq!(pool.get_state(2).await.unwrap(), TruckState::Available);
        assert!(pool.get_state(3).await.is_err());
    }

    #[tokio::test]
    async fn test_acquire_merges_same_warehouse() {
        let pool = pool(4);

        let (a, b) = tokio::join!(pool.acquire_for_warehouse(5), pool.acquire_for_warehouse(5));
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(pool.num_available(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_acquire_merges_concurrent_tasks() {
        let pool = pool(8);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let pool = pool.clone();
            handles.push(tokio::spawn(async move { pool.acquire_for_warehouse(5).await.unwrap() }));
        }
        let mut truck_ids = Vec::new();
        for handle in handles {
            truck_ids.push(handle.await.unwrap());
        }

        truck_ids.dedup();
        assert_eq!(truck_ids.len(), 1);
        assert_eq!(pool.num_available(), 7);
    }

    #[tokio::test]
    async fn test_acquire_different_warehouses() {
        let pool = pool(4);
        let a = pool.acquire_for_warehouse(1).await.unwrap();
        let b = pool.acquire_for_warehouse(2).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.get_warehouse(a).await.unwrap(), Some(1));
        assert_eq!(pool.get_warehouse(b).await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_commit_releases_reservation() {
        let pool = pool(4);
        let first = pool.acquire_for_warehouse(5).await.unwrap();
        pool.commit(first).await.unwrap();

        assert_eq!(pool.reservation(5).await, None);
        assert_eq!(pool.get_state(first).await.unwrap(), TruckState::Committed(5));
        assert_eq!(pool.get_warehouse(first).await.unwrap(), Some(5));

        let second = pool.acquire_for_warehouse(5).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_blocks_when_exhausted() {
        let pool = pool(1);
        let truck_id = pool.acquire_for_warehouse(5).await.unwrap();
        pool.commit(truck_id).await.unwrap();

        assert!(pool.acquire_for_warehouse_timeout(5, Duration::from_secs(10)).await.is_err());
        assert!(pool.acquire_for_warehouse_timeout(6, Duration::from_secs(10)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_wakes_waiter() {
        let pool = pool(1);
        let truck_id = pool.acquire_for_warehouse(1).await.unwrap();
        pool.commit(truck_id).await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire_for_warehouse(2).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(!waiter.is_finished());

        pool.release(truck_id).await.unwrap();
        assert_eq!(waiter.await.unwrap(), truck_id);
        assert_eq!(pool.get_state(truck_id).await.unwrap(), TruckState::Reserved(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_waiters_merge_on_reservation() {
        let pool = pool(2);
        let a = pool.acquire_for_warehouse(1).await.unwrap();
        let b = pool.acquire_for_warehouse(2).await.unwrap();
        pool.commit(a).await.unwrap();
        pool.commit(b).await.unwrap();

        let mut waiters = Vec::new();
        for _ in 0..2 {
            let pool = pool.clone();
            waiters.push(tokio::spawn(async move { pool.acquire_for_warehouse(7).await.unwrap() }));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        pool.release(a).await.unwrap();
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), a);
        }
        // the second truck was never needed
        assert_eq!(pool.num_available(), 0);
        pool.release(b).await.unwrap();
        assert_eq!(pool.num_available(), 1);
    }

    #[tokio::test]
    async fn test_release_recycles_truck() {
        let pool = pool(1);
        let truck_id = pool.acquire_for_warehouse(3).await.unwrap();
        pool.add_package(truck_id, 100).await.unwrap();
        pool.add_package(truck_id, 101).await.unwrap();
        pool.commit(truck_id).await.unwrap();
        assert_eq!(pool.get_packages(truck_id).await.unwrap(), vec![100, 101]);

        pool.release(truck_id).await.unwrap();
        assert!(pool.get_packages(truck_id).await.unwrap().is_empty());
        assert_eq!(pool.get_state(truck_id).await.unwrap(), TruckState::Available);
        assert_eq!(pool.get_warehouse(truck_id).await.unwrap(), None);

        assert_eq!(pool.acquire_for_warehouse(9).await.unwrap(), truck_id);
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let pool = pool(2);
        let truck_id = pool.acquire_for_warehouse(3).await.unwrap();
        pool.release(truck_id).await.unwrap();
        pool.release(truck_id).await.unwrap();
        assert_eq!(pool.num_available(), 2);
    }

    #[tokio::test]
    async fn test_release_reserved_clears_reservation() {
        let pool = pool(2);
        let truck_id = pool.acquire_for_warehouse(3).await.unwrap();
        pool.release(truck_id).await.unwrap();
        assert_eq!(pool.reservation(3).await, None);
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let pool = pool(2);
        assert!(pool.commit(0).await.is_err());
        assert!(pool.add_package(0, 1).await.is_err());
        assert!(pool.release(17).await.is_err());
        assert!(pool.get_packages(17).await.is_err());
    }
}
