use super::{
    ComputationCatalog, DependencyIndex, GroupCatalog, InstanceLease, Lease, NotificationQueue,
    ReconcileStats, TimeSeriesCatalog,
};
use crate::{
    error::{LeaseError, StoreError},
    types::{
        tsid::normalize_unique_string, ChangeNotification, CompId, DbComputation,
        DependencyRecord, GroupId, NotifyKind, SiteId, TimeSeriesIdentifier, TsGroup, TsKey,
        TsidParts,
    },
};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use parking_lot::Mutex;
use sea_orm::DbErr;
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    time::Duration,
};

#[derive(Debug)]
struct HeldLease {
    lease: Lease,
    heartbeat: NaiveDateTime,
    status: Option<String>,
}

#[derive(Debug, Default)]
struct Inner {
    tsids: BTreeMap<TsKey, TimeSeriesIdentifier>,
    last_ts_key: i64,
    comps: BTreeMap<CompId, DbComputation>,
    groups: BTreeMap<GroupId, TsGroup>,
    depends: BTreeSet<DependencyRecord>,
    queue: VecDeque<ChangeNotification>,
    last_record_num: i64,
    lease: Option<HeldLease>,
    fail_reconcile_after_delete: bool,
}

impl Inner {
    fn push_notification(
        &mut self,
        kind: NotifyKind,
        key: i64,
        loaded_at: NaiveDateTime,
    ) -> ChangeNotification {
        self.last_record_num += 1;
        let notification = ChangeNotification {
            record_num: self.last_record_num,
            kind,
            key,
            loaded_at,
        };
        self.queue.push_back(notification.clone());
        notification
    }

    fn notify(&mut self, kind: NotifyKind, key: i64) -> ChangeNotification {
        self.push_notification(kind, key, Utc::now().naive_utc())
    }
}

/// Process-local implementation of every store. Catalog writes enqueue the
/// same notifications the database triggers do.
///
/// Reconciliation runs as two separate steps, so a failure between them
/// leaves the index partially updated until the next full evaluation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a time series without going through the notification queue.
    pub fn seed_time_series(&self, unique_string: &str) -> Option<TimeSeriesIdentifier> {
        let parts = TsidParts::parse(unique_string)?;
        let mut inner = self.inner.lock();
        inner.last_ts_key += 1;
        let tsid = TimeSeriesIdentifier::new(TsKey(inner.last_ts_key), parts);
        inner.tsids.insert(tsid.key, tsid.clone());
        Some(tsid)
    }

    pub fn seed_computation(&self, comp: DbComputation) {
        self.inner.lock().comps.insert(comp.id, comp);
    }

    pub fn seed_group(&self, group: TsGroup) {
        self.inner.lock().groups.insert(group.id, group);
    }

    pub fn seed_dependencies(&self, records: impl IntoIterator<Item = DependencyRecord>) {
        self.inner.lock().depends.extend(records);
    }

    /// Removes a time series and enqueues its deletion.
    pub fn delete_time_series(&self, key: TsKey) -> Option<TimeSeriesIdentifier> {
        let mut inner = self.inner.lock();
        let removed = inner.tsids.remove(&key)?;
        inner.notify(NotifyKind::TsDeleted, key.0);
        Some(removed)
    }

    /// Changes the unique string of a time series and enqueues its
    /// modification.
    pub fn rename_time_series(
        &self,
        key: TsKey,
        unique_string: &str,
    ) -> Option<TimeSeriesIdentifier> {
        let parts = TsidParts::parse(unique_string)?;
        let mut inner = self.inner.lock();
        let previous = inner.tsids.get(&key)?;
        let mut renamed = TimeSeriesIdentifier::new(key, parts);
        renamed.site_id = previous.site_id;
        renamed.storage_units = previous.storage_units.clone();
        inner.tsids.insert(key, renamed.clone());
        inner.notify(NotifyKind::TsModified, key.0);
        Some(renamed)
    }

    pub fn delete_computation(&self, id: CompId) -> Option<DbComputation> {
        let mut inner = self.inner.lock();
        let removed = inner.comps.remove(&id)?;
        inner.notify(NotifyKind::ComputationModified, id.0);
        Some(removed)
    }

    pub fn enqueue_at(
        &self,
        kind: NotifyKind,
        key: i64,
        loaded_at: NaiveDateTime,
    ) -> ChangeNotification {
        self.inner.lock().push_notification(kind, key, loaded_at)
    }

    /// Makes the next reconcile fail after stale records were deleted and
    /// before missing ones were inserted.
    pub fn fail_next_reconcile_after_delete(&self) {
        self.inner.lock().fail_reconcile_after_delete = true;
    }

    pub fn dependencies(&self) -> Vec<DependencyRecord> {
        self.inner.lock().depends.iter().copied().collect()
    }

    pub fn computation(&self, id: CompId) -> Option<DbComputation> {
        self.inner.lock().comps.get(&id).cloned()
    }

    pub fn group(&self, id: GroupId) -> Option<TsGroup> {
        self.inner.lock().groups.get(&id).cloned()
    }

    pub fn pending_notifications(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn lease_status(&self) -> Option<String> {
        self.inner
            .lock()
            .lease
            .as_ref()
            .and_then(|held| held.status.clone())
    }
}

#[async_trait]
impl TimeSeriesCatalog for MemoryStore {
    async fn get_by_key(&self, key: TsKey) -> Result<Option<TimeSeriesIdentifier>, StoreError> {
        Ok(self.inner.lock().tsids.get(&key).cloned())
    }

    async fn get_by_unique_string(
        &self,
        unique_string: &str,
    ) -> Result<Option<TimeSeriesIdentifier>, StoreError> {
        let normalized = normalize_unique_string(unique_string);
        Ok(self
            .inner
            .lock()
            .tsids
            .values()
            .find(|tsid| normalize_unique_string(tsid.unique_string()) == normalized)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<TimeSeriesIdentifier>, StoreError> {
        Ok(self.inner.lock().tsids.values().cloned().collect())
    }

    async fn create(
        &self,
        parts: TsidParts,
        site_id: Option<SiteId>,
    ) -> Result<TimeSeriesIdentifier, StoreError> {
        let mut inner = self.inner.lock();
        let unique_string = parts.unique_string();
        if inner
            .tsids
            .values()
            .any(|tsid| tsid.same_unique_string(&unique_string))
        {
            return Err(StoreError::Db(DbErr::Custom(format!(
                "time series '{unique_string}' already exists"
            ))));
        }
        inner.last_ts_key += 1;
        let mut tsid = TimeSeriesIdentifier::new(TsKey(inner.last_ts_key), parts);
        tsid.site_id = site_id;
        inner.tsids.insert(tsid.key, tsid.clone());
        inner.notify(NotifyKind::TsCreated, tsid.key.0);
        Ok(tsid)
    }
}

#[async_trait]
impl ComputationCatalog for MemoryStore {
    async fn get_by_id(&self, id: CompId) -> Result<Option<DbComputation>, StoreError> {
        Ok(self.inner.lock().comps.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<DbComputation>, StoreError> {
        Ok(self
            .inner
            .lock()
            .comps
            .values()
            .find(|comp| comp.name == name)
            .cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<DbComputation>, StoreError> {
        Ok(self
            .inner
            .lock()
            .comps
            .values()
            .filter(|comp| comp.enabled)
            .cloned()
            .collect())
    }

    async fn write(&self, comp: &DbComputation) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.comps.insert(comp.id, comp.clone());
        inner.notify(NotifyKind::ComputationModified, comp.id.0);
        Ok(())
    }
}

#[async_trait]
impl GroupCatalog for MemoryStore {
    async fn get_by_id(&self, id: GroupId) -> Result<Option<TsGroup>, StoreError> {
        Ok(self.inner.lock().groups.get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<TsGroup>, StoreError> {
        Ok(self
            .inner
            .lock()
            .groups
            .values()
            .find(|group| group.name == name)
            .cloned())
    }

    async fn list_all(&self) -> Result<Vec<TsGroup>, StoreError> {
        Ok(self.inner.lock().groups.values().cloned().collect())
    }

    async fn write(&self, group: &TsGroup) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let stored = TsGroup::new(group.id, group.name.clone(), group.definition.clone());
        inner.groups.insert(group.id, stored);
        inner.notify(NotifyKind::GroupModified, group.id.0);
        Ok(())
    }

    async fn delete(&self, id: GroupId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.groups.remove(&id).is_some() {
            inner.notify(NotifyKind::GroupModified, id.0);
        }
        Ok(())
    }
}

#[async_trait]
impl DependencyIndex for MemoryStore {
    async fn all(&self) -> Result<Vec<DependencyRecord>, StoreError> {
        Ok(self.dependencies())
    }

    async fn comp_ids_for(&self, ts_key: TsKey) -> Result<Vec<CompId>, StoreError> {
        Ok(self
            .inner
            .lock()
            .depends
            .iter()
            .filter(|record| record.ts_key == ts_key)
            .map(|record| record.comp_id)
            .collect())
    }

    async fn triggers_for(&self, comp_id: CompId) -> Result<Vec<TsKey>, StoreError> {
        Ok(self
            .inner
            .lock()
            .depends
            .iter()
            .filter(|record| record.comp_id == comp_id)
            .map(|record| record.ts_key)
            .collect())
    }

    async fn delete_for_ts(&self, ts_key: TsKey) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.depends.len();
        inner.depends.retain(|record| record.ts_key != ts_key);
        Ok((before - inner.depends.len()) as u64)
    }

    async fn delete_for_comps(&self, comp_ids: &[CompId]) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.depends.len();
        inner
            .depends
            .retain(|record| !comp_ids.contains(&record.comp_id));
        Ok((before - inner.depends.len()) as u64)
    }

    async fn add(&self, records: &[DependencyRecord]) -> Result<(), StoreError> {
        self.inner.lock().depends.extend(records.iter().copied());
        Ok(())
    }

    async fn replace_for_comp(
        &self,
        comp_id: CompId,
        records: &[DependencyRecord],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner.depends.retain(|record| record.comp_id != comp_id);
        inner.depends.extend(records.iter().copied());
        Ok(())
    }

    async fn reconcile(&self, records: &[DependencyRecord]) -> Result<ReconcileStats, StoreError> {
        let scratchpad: BTreeSet<DependencyRecord> = records.iter().copied().collect();
        let mut inner = self.inner.lock();

        let before = inner.depends.len();
        inner.depends.retain(|record| scratchpad.contains(record));
        let deleted = (before - inner.depends.len()) as u64;

        if std::mem::take(&mut inner.fail_reconcile_after_delete) {
            return Err(StoreError::Db(DbErr::Custom(
                "reconcile interrupted before insert".to_string(),
            )));
        }

        let before = inner.depends.len();
        inner.depends.extend(scratchpad);
        let inserted = (inner.depends.len() - before) as u64;
        Ok(ReconcileStats { deleted, inserted })
    }
}

#[async_trait]
impl NotificationQueue for MemoryStore {
    async fn next(&self) -> Result<Option<ChangeNotification>, StoreError> {
        Ok(self.inner.lock().queue.pop_front())
    }

    async fn enqueue(&self, kind: NotifyKind, key: i64) -> Result<ChangeNotification, StoreError> {
        Ok(self.inner.lock().notify(kind, key))
    }
}

#[async_trait]
impl InstanceLease for MemoryStore {
    async fn obtain(&self, lease: &Lease, stale_after: Duration) -> Result<(), LeaseError> {
        let now = Utc::now().naive_utc();
        let mut inner = self.inner.lock();
        if let Some(held) = &inner.lease {
            let is_fresh = (now - held.heartbeat)
                .to_std()
                .map(|age| age < stale_after)
                .unwrap_or(true);
            if held.lease != *lease && is_fresh {
                return Err(LeaseError::Busy {
                    app_name: lease.app_name.clone(),
                    pid: held.lease.pid,
                    hostname: held.lease.hostname.clone(),
                });
            }
        }
        inner.lease = Some(HeldLease {
            lease: lease.clone(),
            heartbeat: now,
            status: None,
        });
        Ok(())
    }

    async fn renew(&self, lease: &Lease, status: &str) -> Result<(), LeaseError> {
        let mut inner = self.inner.lock();
        match inner.lease.as_mut() {
            Some(held) if held.lease == *lease => {
                held.heartbeat = Utc::now().naive_utc();
                held.status = Some(status.to_string());
                Ok(())
            }
            _ => Err(LeaseError::Lost(lease.app_name.clone())),
        }
    }

    async fn release(&self, lease: &Lease) -> Result<(), LeaseError> {
        let mut inner = self.inner.lock();
        if inner.lease.as_ref().is_some_and(|held| held.lease == *lease) {
            inner.lease = None;
        }
        Ok(())
    }
}
