//! Collaborator interfaces of the maintainer and the resolver, with a
//! Postgres and an in-memory implementation.

mod memory;
mod postgres;

pub use crate::repository::comp_depends::ReconcileStats;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::{
    error::{LeaseError, StoreError},
    types::{
        ChangeNotification, CompId, DbComputation, DependencyRecord, GroupId, NotifyKind, SiteId,
        TimeSeriesIdentifier, TsGroup, TsKey, TsidParts,
    },
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

#[async_trait]
pub trait TimeSeriesCatalog: Send + Sync {
    async fn get_by_key(&self, key: TsKey) -> Result<Option<TimeSeriesIdentifier>, StoreError>;
    async fn get_by_unique_string(
        &self,
        unique_string: &str,
    ) -> Result<Option<TimeSeriesIdentifier>, StoreError>;
    async fn list_all(&self) -> Result<Vec<TimeSeriesIdentifier>, StoreError>;
    async fn create(
        &self,
        parts: TsidParts,
        site_id: Option<SiteId>,
    ) -> Result<TimeSeriesIdentifier, StoreError>;
}

#[async_trait]
pub trait ComputationCatalog: Send + Sync {
    async fn get_by_id(&self, id: CompId) -> Result<Option<DbComputation>, StoreError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<DbComputation>, StoreError>;
    async fn list_enabled(&self) -> Result<Vec<DbComputation>, StoreError>;
    async fn write(&self, comp: &DbComputation) -> Result<(), StoreError>;
}

#[async_trait]
pub trait GroupCatalog: Send + Sync {
    async fn get_by_id(&self, id: GroupId) -> Result<Option<TsGroup>, StoreError>;
    async fn get_by_name(&self, name: &str) -> Result<Option<TsGroup>, StoreError>;
    async fn list_all(&self) -> Result<Vec<TsGroup>, StoreError>;
    async fn write(&self, group: &TsGroup) -> Result<(), StoreError>;
    async fn delete(&self, id: GroupId) -> Result<(), StoreError>;
}

/// Persisted map from time series to the computations they trigger.
#[async_trait]
pub trait DependencyIndex: Send + Sync {
    async fn all(&self) -> Result<Vec<DependencyRecord>, StoreError>;
    async fn comp_ids_for(&self, ts_key: TsKey) -> Result<Vec<CompId>, StoreError>;
    /// Every time series known to trigger `comp_id`.
    async fn triggers_for(&self, comp_id: CompId) -> Result<Vec<TsKey>, StoreError>;
    async fn delete_for_ts(&self, ts_key: TsKey) -> Result<u64, StoreError>;
    async fn delete_for_comps(&self, comp_ids: &[CompId]) -> Result<u64, StoreError>;
    /// Inserts records that are not present yet.
    async fn add(&self, records: &[DependencyRecord]) -> Result<(), StoreError>;
    /// Replaces every record of one computation.
    async fn replace_for_comp(
        &self,
        comp_id: CompId,
        records: &[DependencyRecord],
    ) -> Result<(), StoreError>;
    /// Makes the index equal to `records`.
    async fn reconcile(&self, records: &[DependencyRecord]) -> Result<ReconcileStats, StoreError>;
}

#[async_trait]
pub trait NotificationQueue: Send + Sync {
    /// Removes and returns the oldest pending notification.
    async fn next(&self) -> Result<Option<ChangeNotification>, StoreError>;
    async fn enqueue(&self, kind: NotifyKind, key: i64) -> Result<ChangeNotification, StoreError>;
}

/// Identity of a lease holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub app_name: String,
    pub pid: i64,
    pub hostname: String,
}

impl Lease {
    pub fn for_current_process(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            pid: std::process::id() as i64,
            hostname: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
        }
    }
}

#[async_trait]
pub trait InstanceLease: Send + Sync {
    async fn obtain(&self, lease: &Lease, stale_after: Duration) -> Result<(), LeaseError>;
    async fn renew(&self, lease: &Lease, status: &str) -> Result<(), LeaseError>;
    async fn release(&self, lease: &Lease) -> Result<(), LeaseError>;
}

/// Every collaborator the maintainer needs.
#[derive(Clone)]
pub struct Stores {
    pub tsids: Arc<dyn TimeSeriesCatalog>,
    pub comps: Arc<dyn ComputationCatalog>,
    pub groups: Arc<dyn GroupCatalog>,
    pub depends: Arc<dyn DependencyIndex>,
    pub notifications: Arc<dyn NotificationQueue>,
    pub lease: Arc<dyn InstanceLease>,
}

impl Stores {
    pub fn postgres(store: Arc<PostgresStore>) -> Self {
        Self {
            tsids: store.clone(),
            comps: store.clone(),
            groups: store.clone(),
            depends: store.clone(),
            notifications: store.clone(),
            lease: store,
        }
    }

    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            tsids: store.clone(),
            comps: store.clone(),
            groups: store.clone(),
            depends: store.clone(),
            notifications: store.clone(),
            lease: store,
        }
    }
}
