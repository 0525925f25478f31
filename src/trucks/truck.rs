use tokio::sync::Mutex;

use crate::messages::{Location, PackageId, TruckId, WarehouseId};

/// Where a truck is in its pickup / delivery cycle
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TruckState {
    Available,
    /// earmarked for a pickup at the warehouse, further pickups there are merged onto it
    Reserved(WarehouseId),
    /// on its way to (or at) the warehouse, or delivering
    Committed(WarehouseId),
}
impl TruckState {
    pub fn warehouse(&self) -> Option<WarehouseId> {
        match self {
            TruckState::Available => None,
            TruckState::Reserved(w) | TruckState::Committed(w) => Some(*w),
        }
    }
}

pub struct Truck {
    pub id: TruckId,
    pub home: Location,
    /// guarded separately so that appending packages does not contend on the pool lock
    packages: Mutex<Vec<PackageId>>,
}

impl Truck {
    pub fn new(id: TruckId, home: Location) -> Truck {
        Truck {
            id,
            home,
            packages: Default::default(),
        }
    }

    pub async fn add_package(&self, package_id: PackageId) {
        self.packages.lock().await.push(package_id);
    }

    pub async fn packages(&self) -> Vec<PackageId> {
        self.packages.lock().await.clone()
    }

    pub async fn clear_packages(&self) {
        self.packages.lock().await.clear();
    }
}
