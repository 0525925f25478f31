use anyhow::{anyhow, bail};
use async_trait::async_trait;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::messages::{Location, PackageId};
use crate::store::{PackageState, RecordStore};

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PackageRecord {
    pub destination: Location,
    pub owner: Option<String>,
    pub state: PackageState,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ProductRecord {
    pub package_id: PackageId,
    pub description: String,
    pub count: u32,
}

#[derive(Default)]
struct StoreData {
    accounts: FxHashSet<String>,
    packages: FxHashMap<PackageId, PackageRecord>,
    products: Vec<ProductRecord>,
}

/// A [RecordStore] that keeps everything in memory, for running the hub without a database
///  and for tests
#[derive(Default)]
pub struct InMemoryRecordStore {
    data: RwLock<StoreData>,
}

impl InMemoryRecordStore {
    pub fn new(accounts: impl IntoIterator<Item = String>) -> InMemoryRecordStore {
        InMemoryRecordStore {
            data: RwLock::new(StoreData {
                accounts: accounts.into_iter().collect(),
                ..Default::default()
            }),
        }
    }

    pub async fn package(&self, package_id: PackageId) -> Option<PackageRecord> {
        self.data.read().await.packages.get(&package_id).cloned()
    }

    pub async fn package_state(&self, package_id: PackageId) -> Option<PackageState> {
        self.data.read().await.packages.get(&package_id).map(|p| p.state)
    }

    pub async fn products(&self, package_id: PackageId) -> Vec<ProductRecord> {
        self.data.read().await.products.iter()
            .filter(|p| p.package_id == package_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn account_exists(&self, account: &str) -> anyhow::Result<bool> {
        Ok(self.data.read().await.accounts.contains(account))
    }

    async fn create_package(&self, package_id: PackageId, destination: Location, owner: Option<String>) -> anyhow::Result<()> {
        let mut data = self.data.write().await;
        if data.packages.contains_key(&package_id) {
            bail!("package {} exists already", package_id);
        }
        data.packages.insert(package_id, PackageRecord {
            destination,
            owner,
            state: PackageState::Created,
        });
        trace!("created package {}", package_id);
        Ok(())
    }

    async fn set_package_state(&self, package_id: PackageId, state: PackageState) -> anyhow::Result<()> {
        let mut data = self.data.write().await;
        let package = data.packages.get_mut(&package_id)
            .ok_or_else(|| anyhow!("unknown package {}", package_id))?;

        if state < package.state {
            bail!("package {} can not go back from '{}' to '{}'", package_id, package.state, state);
        }
        if state != package.state {
            debug!("package {}: '{}' -> '{}'", package_id, package.state, state);
            package.state = state;
        }
        Ok(())
    }

    async fn package_destination(&self, package_id: PackageId) -> anyhow::Result<Location> {
        self.data.read().await.packages.get(&package_id)
            .map(|p| p.destination)
            .ok_or_else(|| anyhow!("unknown package {}", package_id))
    }

    async fn create_product(&self, package_id: PackageId, description: &str, count: u32) -> anyhow::Result<()> {
        let mut data = self.data.write().await;
        if !data.packages.contains_key(&package_id) {
            bail!("product for unknown package {}", package_id);
        }
        data.products.push(ProductRecord {
            package_id,
            description: description.to_string(),
            count,
        });
        Ok(())
    }
}
