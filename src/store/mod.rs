//! The record store owns packages, products and user accounts. The hub only references
//!  packages by id, and never caches their state beyond a single handler invocation.

use std::fmt::{Display, Formatter};

use async_trait::async_trait;
#[cfg(test)] use mockall::automock;
use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::messages::{Location, PackageId};

pub mod in_memory;

/// Package states are ordered, and a package only ever moves forward
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum PackageState {
    Created = 0,
    EnRouteToWarehouse = 1,
    WaitingAtWarehouse = 2,
    OutForDelivery = 3,
    Delivered = 4,
}
impl Display for PackageState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PackageState::Created => "Created",
            PackageState::EnRouteToWarehouse => "Truck en route to warehouse",
            PackageState::WaitingAtWarehouse => "Truck waiting for package",
            PackageState::OutForDelivery => "Out for delivery",
            PackageState::Delivered => "Delivered",
        };
        write!(f, "{}", name)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    async fn account_exists(&self, account: &str) -> anyhow::Result<bool>;

    async fn create_package(&self, package_id: PackageId, destination: Location, owner: Option<String>) -> anyhow::Result<()>;

    async fn set_package_state(&self, package_id: PackageId, state: PackageState) -> anyhow::Result<()>;

    async fn package_destination(&self, package_id: PackageId) -> anyhow::Result<Location>;

    async fn create_product(&self, package_id: PackageId, description: &str, count: u32) -> anyhow::Result<()>;
}
