mod snapshot;

pub use snapshot::Snapshot;

use crate::{
    error::{MaintainerError, StoreError},
    metrics,
    settings::MaintainerSettings,
    storage::{Lease, Stores},
    template,
    types::{
        ChangeNotification, CompId, DependencyRecord, GroupId, MissingAction, NotifyKind,
        ParmBinding, TsKey,
    },
};
use itertools::Itertools;
use std::{collections::BTreeSet, path::Path, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintainerState {
    Starting,
    Running,
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    /// The notification could not be fully applied, but the loop can go on.
    Skipped,
}

/// Keeps the dependency index in line with the catalogs by draining the
/// change notification queue. At most one maintainer runs per application.
pub struct Maintainer {
    stores: Stores,
    settings: MaintainerSettings,
    lease: Lease,
    state: MaintainerState,
    snapshot: Snapshot,
    last_refresh: Option<Instant>,
    last_notification: Option<ChangeNotification>,
    done: u64,
    errs: u64,
}

impl Maintainer {
    pub fn new(stores: Stores, settings: MaintainerSettings) -> Self {
        let lease = Lease::for_current_process(settings.app_name.clone());
        Self::with_lease(stores, settings, lease)
    }

    pub fn with_lease(stores: Stores, settings: MaintainerSettings, lease: Lease) -> Self {
        Self {
            stores,
            settings,
            lease,
            state: MaintainerState::Starting,
            snapshot: Snapshot::default(),
            last_refresh: None,
            last_notification: None,
            done: 0,
            errs: 0,
        }
    }

    pub fn state(&self) -> MaintainerState {
        self.state
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Lease status line: `Done=<n>, Errs=<m>`.
    pub fn status(&self) -> String {
        format!("Done={}, Errs={}", self.done, self.errs)
    }

    /// Runs until `shutdown` is cancelled, or once through a full evaluation
    /// when `full_eval_only` is set. The notification being processed when
    /// shutdown is requested always completes.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), MaintainerError> {
        let result = self.run_inner(shutdown).await;
        self.stop().await;
        if let Err(err) = &result {
            tracing::error!(error = %err, "dependency maintainer stopped");
        }
        result
    }

    async fn run_inner(&mut self, shutdown: CancellationToken) -> Result<(), MaintainerError> {
        self.start().await?;
        if self.settings.full_eval_only {
            tracing::info!("full evaluation done, exiting");
            return Ok(());
        }

        while !shutdown.is_cancelled() {
            if !self.run_once().await? {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.polling_interval) => {}
                }
            }
        }
        Ok(())
    }

    /// Takes the lease, loads the caches and runs the startup full
    /// evaluation if configured.
    pub async fn start(&mut self) -> Result<(), MaintainerError> {
        self.state = MaintainerState::Starting;
        self.stores
            .lease
            .obtain(&self.lease, self.settings.lease_timeout)
            .await?;
        tracing::info!(
            app_name = %self.lease.app_name,
            pid = self.lease.pid,
            hostname = %self.lease.hostname,
            "lease obtained"
        );

        self.refresh_caches().await?;
        if self.settings.full_eval_on_startup || self.settings.full_eval_only {
            self.full_eval().await?;
        }
        self.state = MaintainerState::Running;
        Ok(())
    }

    /// One loop iteration: renew the lease, refresh caches when due, then
    /// process the oldest notification. Returns `false` if the queue was
    /// empty.
    pub async fn run_once(&mut self) -> Result<bool, MaintainerError> {
        self.stores.lease.renew(&self.lease, &self.status()).await?;

        let refresh_due = self
            .last_refresh
            .map_or(true, |last| last.elapsed() >= self.settings.cache_refresh_interval);
        if refresh_due {
            self.refresh_caches().await?;
        }

        let Some(notification) = self.stores.notifications.next().await? else {
            return Ok(false);
        };
        self.process(notification).await?;
        Ok(true)
    }

    /// Processes notifications until the queue is empty.
    pub async fn drain(&mut self) -> Result<usize, MaintainerError> {
        let mut processed = 0;
        while self.run_once().await? {
            processed += 1;
        }
        Ok(processed)
    }

    pub async fn stop(&mut self) {
        self.state = MaintainerState::ShuttingDown;
        if let Err(err) = self.stores.lease.release(&self.lease).await {
            tracing::warn!(error = %err, "failed to release lease");
        }
    }

    /// Reloads every cache from the stores.
    pub async fn refresh_caches(&mut self) -> Result<(), StoreError> {
        tracing::info!("refreshing caches");
        self.snapshot = Snapshot::load(&self.stores).await?;
        self.last_refresh = Some(Instant::now());

        metrics::CACHE_REFRESHES.inc();
        metrics::DEPENDENCY_RECORDS.set(self.snapshot.depends.len() as i64);
        tracing::info!(
            tsids = self.snapshot.tsids.len(),
            groups = self.snapshot.groups.len(),
            computations = self.snapshot.comps.len(),
            dependencies = self.snapshot.depends.len(),
            "caches refreshed"
        );

        if let Some(dir) = self.settings.group_cache_dump_dir.clone() {
            if let Err(err) = self.dump_group_cache(&dir).await {
                tracing::warn!(dir = %dir.display(), error = %err, "failed to dump group cache");
            }
        }
        Ok(())
    }

    async fn dump_group_cache(&self, dir: &Path) -> std::io::Result<()> {
        tokio::fs::create_dir_all(dir).await?;

        let tsids = self
            .snapshot
            .tsids
            .iter()
            .map(|tsid| format!("{} {}\n", tsid.key, tsid.unique_string()))
            .join("");
        tokio::fs::write(dir.join("tsids"), tsids).await?;

        for group in self.snapshot.groups.iter() {
            let members = group
                .expanded
                .iter()
                .map(|key| {
                    let unique_string = self
                        .snapshot
                        .tsids
                        .get(*key)
                        .map(|tsid| tsid.unique_string())
                        .unwrap_or("?");
                    format!("{key} {unique_string}\n")
                })
                .join("");
            let contents = format!("{} {}\n{members}", group.id, group.name);
            tokio::fs::write(dir.join(format!("group-{}", group.id)), contents).await?;
        }
        Ok(())
    }

    async fn process(&mut self, notification: ChangeNotification) -> Result<(), MaintainerError> {
        if self
            .last_notification
            .as_ref()
            .is_some_and(|last| notification.is_duplicate_of(last))
        {
            tracing::debug!(
                record_num = notification.record_num,
                "skipping duplicate notification"
            );
            return Ok(());
        }
        self.last_notification = Some(notification.clone());

        let kind = notification.kind;
        tracing::info!(
            record_num = notification.record_num,
            event_type = %kind,
            key = notification.key,
            "processing notification"
        );
        match self.apply(&notification).await {
            Ok(Outcome::Applied) => {
                self.done += 1;
                metrics::NOTIFICATIONS_PROCESSED
                    .with_label_values(&[kind.as_str()])
                    .inc();
                Ok(())
            }
            Ok(Outcome::Skipped) => {
                self.errs += 1;
                metrics::NOTIFICATIONS_FAILED
                    .with_label_values(&[kind.as_str()])
                    .inc();
                Ok(())
            }
            Err(err) => {
                self.errs += 1;
                metrics::NOTIFICATIONS_FAILED
                    .with_label_values(&[kind.as_str()])
                    .inc();
                Err(err.into())
            }
        }
    }

    /// Applies one notification to the snapshot and the stores.
    pub async fn apply(&mut self, notification: &ChangeNotification) -> Result<Outcome, StoreError> {
        match notification.kind {
            NotifyKind::TsCreated => self.ts_created(notification.ts_key()).await,
            NotifyKind::TsDeleted => self.ts_deleted(notification.ts_key()).await,
            NotifyKind::TsModified => {
                self.ts_deleted(notification.ts_key()).await?;
                self.ts_created(notification.ts_key()).await
            }
            NotifyKind::ComputationModified => {
                self.computation_modified(notification.comp_id()).await
            }
            NotifyKind::GroupModified => self.group_modified(notification.group_id()).await,
            NotifyKind::FullEval => self.full_eval().await,
        }
    }

    #[instrument(skip_all, fields(ts_key = %key))]
    async fn ts_created(&mut self, key: TsKey) -> Result<Outcome, StoreError> {
        let Some(tsid) = self.stores.tsids.get_by_key(key).await? else {
            tracing::warn!("created time series does not exist, assuming deleted");
            return self.ts_deleted(key).await;
        };
        self.snapshot.tsids.insert(tsid.clone());

        let groups = self.snapshot.groups.add_matching(&tsid);
        tracing::debug!(groups = ?groups, "time series joined groups");

        let mut records = BTreeSet::new();
        for comp in self.snapshot.comps.values_mut() {
            if comp.is_group() {
                continue;
            }
            let mut matched = false;
            for parm in comp.parms.iter_mut().filter(|parm| parm.is_input()) {
                if let ParmBinding::Concrete {
                    unique_string,
                    ts_key,
                } = &mut parm.binding
                {
                    if tsid.same_unique_string(unique_string) {
                        *ts_key = Some(key);
                        matched = true;
                    }
                }
            }
            if matched {
                records.insert(DependencyRecord::new(key, comp.id));
            }
        }

        for comp in self.snapshot.comps.values().filter(|comp| comp.is_group()) {
            let Some(members) = comp
                .group_id
                .and_then(|group_id| self.snapshot.groups.expanded(group_id))
            else {
                tracing::warn!(comp_id = %comp.id, "computation has an invalid group, skipping");
                continue;
            };
            let triggers = members
                .iter()
                .filter_map(|member| self.snapshot.tsids.get(*member))
                .any(|member| {
                    comp.inputs().any(|parm| {
                        template::bind_unique_string(parm, member)
                            .is_some_and(|unique_string| tsid.same_unique_string(&unique_string))
                    })
                });
            if triggers {
                records.insert(DependencyRecord::new(key, comp.id));
            }
        }

        let records: Vec<_> = records.into_iter().collect();
        self.stores.depends.add(&records).await?;
        self.snapshot.depends.extend(records.iter().copied());
        tracing::info!(
            unique_string = %tsid.unique_string(),
            computations = records.len(),
            "time series created"
        );
        Ok(Outcome::Applied)
    }

    #[instrument(skip_all, fields(ts_key = %key))]
    async fn ts_deleted(&mut self, key: TsKey) -> Result<Outcome, StoreError> {
        let removed = self.snapshot.tsids.remove(key);

        for group in self.snapshot.groups.remove_member(key) {
            tracing::info!(group_id = %group.id, "removing deleted time series from group");
            self.stores.groups.write(&group).await?;
        }

        let deleted = self.stores.depends.delete_for_ts(key).await?;
        self.snapshot.depends.retain(|record| record.ts_key != key);

        let mut to_disable = Vec::new();
        for comp in self.snapshot.comps.values_mut() {
            if comp.is_group() {
                continue;
            }
            let mut disable = false;
            for parm in comp.parms.iter_mut().filter(|parm| parm.is_input()) {
                let ParmBinding::Concrete {
                    unique_string,
                    ts_key,
                } = &mut parm.binding
                else {
                    continue;
                };
                let bound = *ts_key == Some(key)
                    || removed
                        .as_ref()
                        .is_some_and(|tsid| tsid.same_unique_string(unique_string));
                if bound {
                    *ts_key = None;
                    disable |= parm.missing_action != MissingAction::Ignore;
                }
            }
            if disable {
                to_disable.push(comp.id);
            }
        }

        for comp_id in to_disable {
            let Some(mut comp) = self.snapshot.comps.remove(&comp_id) else {
                continue;
            };
            comp.enabled = false;
            self.stores.comps.write(&comp).await?;
            self.stores.depends.delete_for_comps(&[comp_id]).await?;
            self.snapshot.depends.retain(|record| record.comp_id != comp_id);
            tracing::info!(
                comp_id = %comp_id,
                comp_name = %comp.name,
                "input deleted, computation disabled"
            );
        }

        tracing::info!(records = deleted, "time series deleted");
        Ok(Outcome::Applied)
    }

    #[instrument(skip_all, fields(comp_id = %comp_id))]
    async fn computation_modified(&mut self, comp_id: CompId) -> Result<Outcome, StoreError> {
        let comp = match self.stores.comps.get_by_id(comp_id).await? {
            Some(comp) if comp.is_timed() => {
                tracing::info!("timed computation, no dependencies");
                None
            }
            Some(comp) => Some(comp),
            None => {
                tracing::info!("computation no longer exists, assuming deleted");
                None
            }
        };

        self.snapshot.comps.remove(&comp_id);

        match comp {
            Some(mut comp) if comp.enabled => {
                comp.resolve_concrete_keys(|unique_string| {
                    self.snapshot.tsids.key_of(unique_string)
                });
                let records = self.snapshot.evaluate_computation(&comp);
                self.write_comp_records(comp_id, records).await?;
                self.snapshot.comps.insert(comp_id, comp);
            }
            _ => {
                self.stores.depends.delete_for_comps(&[comp_id]).await?;
                self.snapshot.depends.retain(|record| record.comp_id != comp_id);
            }
        }
        Ok(Outcome::Applied)
    }

    #[instrument(skip_all, fields(group_id = %group_id))]
    async fn group_modified(&mut self, group_id: GroupId) -> Result<Outcome, StoreError> {
        let deleted = match self.stores.groups.get_by_id(group_id).await? {
            Some(group) => {
                self.snapshot.groups.insert(group);
                self.snapshot.groups.expand(group_id, &self.snapshot.tsids);
                false
            }
            None => {
                tracing::info!("group no longer exists, assuming deleted");
                self.snapshot.groups.remove(group_id);
                true
            }
        };

        let mut affected = self.snapshot.groups.find_ancestors(group_id);
        for ancestor in &affected {
            self.snapshot.groups.expand(*ancestor, &self.snapshot.tsids);
        }
        affected.insert(group_id);

        let bound: Vec<CompId> = self
            .snapshot
            .comps
            .values()
            .filter(|comp| comp.group_id.is_some_and(|id| affected.contains(&id)))
            .map(|comp| comp.id)
            .collect();

        let mut outcome = Outcome::Applied;
        let mut disabled = Vec::new();
        for comp_id in bound {
            let Some(comp) = self.snapshot.comps.get(&comp_id).cloned() else {
                continue;
            };
            // Checked against the store: the snapshot may still hold an
            // ancestor whose deletion is queued behind this notification.
            let group_exists = match comp.group_id {
                Some(id) if id == group_id => !deleted,
                Some(id) => self.stores.groups.get_by_id(id).await?.is_some(),
                None => false,
            };
            if group_exists {
                let records = self.snapshot.evaluate_computation(&comp);
                self.write_comp_records(comp_id, records).await?;
                continue;
            }

            let mut comp = comp;
            comp.enabled = false;
            comp.group_id = None;
            self.stores.comps.write(&comp).await?;
            self.snapshot.comps.remove(&comp_id);
            disabled.push(comp_id);
            tracing::warn!(
                comp_id = %comp_id,
                comp_name = %comp.name,
                "group deleted, computation disabled"
            );
            if !deleted {
                tracing::warn!(comp_id = %comp_id, "stale group binding");
                outcome = Outcome::Skipped;
            }
        }

        if !disabled.is_empty() {
            self.stores.depends.delete_for_comps(&disabled).await?;
            self.snapshot
                .depends
                .retain(|record| !disabled.contains(&record.comp_id));
        }
        Ok(outcome)
    }

    /// Re-evaluates every computation and reconciles the index with the
    /// result.
    #[instrument(skip_all)]
    pub async fn full_eval(&mut self) -> Result<Outcome, StoreError> {
        tracing::info!("starting full evaluation");
        self.refresh_caches().await?;

        let records: Vec<DependencyRecord> = self.snapshot.evaluate_all().into_iter().collect();
        let stats = self.stores.depends.reconcile(&records).await?;
        self.snapshot.depends = records.into_iter().collect();
        metrics::DEPENDENCY_RECORDS.set(self.snapshot.depends.len() as i64);

        tracing::info!(
            deleted = stats.deleted,
            inserted = stats.inserted,
            total = self.snapshot.depends.len(),
            "full evaluation done"
        );
        Ok(Outcome::Applied)
    }

    /// Replaces the records of one computation in the store and the
    /// snapshot.
    async fn write_comp_records(
        &mut self,
        comp_id: CompId,
        records: BTreeSet<DependencyRecord>,
    ) -> Result<(), StoreError> {
        let existing = self.snapshot.records_of(comp_id);
        if existing == records {
            return Ok(());
        }
        let records: Vec<_> = records.into_iter().collect();
        self.stores.depends.replace_for_comp(comp_id, &records).await?;
        self.snapshot.depends.retain(|record| record.comp_id != comp_id);
        self.snapshot.depends.extend(records.iter().copied());
        tracing::debug!(
            comp_id = %comp_id,
            records = records.len(),
            "computation dependencies written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::LeaseError,
        storage::MemoryStore,
        types::{CompParm, DbComputation, ParmBinding},
    };
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn lease(pid: i64) -> Lease {
        Lease {
            app_name: "compdepends".to_string(),
            pid,
            hostname: "localhost".to_string(),
        }
    }

    fn maintainer(store: &Arc<MemoryStore>, pid: i64) -> Maintainer {
        Maintainer::with_lease(
            Stores::memory(store.clone()),
            MaintainerSettings::default(),
            lease(pid),
        )
    }

    #[tokio::test]
    async fn adjacent_duplicate_notifications_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let tsid = store.seed_time_series("Dam.Elev").unwrap();
        store.seed_computation(
            DbComputation::new(CompId(1), "copy", "Copy")
                .with_parm(CompParm::input("input", ParmBinding::concrete("Dam.Elev"))),
        );
        let loaded_at = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        store.enqueue_at(NotifyKind::TsCreated, tsid.key.0, loaded_at);
        store.enqueue_at(NotifyKind::TsCreated, tsid.key.0, loaded_at);

        let mut maintainer = maintainer(&store, 1);
        maintainer.start().await.unwrap();
        assert_eq!(maintainer.state(), MaintainerState::Running);
        assert_eq!(maintainer.drain().await.unwrap(), 2);

        assert_eq!(maintainer.status(), "Done=1, Errs=0");
        assert_eq!(store.lease_status().as_deref(), Some("Done=1, Errs=0"));
        assert_eq!(
            store.dependencies(),
            vec![DependencyRecord::new(tsid.key, CompId(1))]
        );
    }

    #[tokio::test]
    async fn second_instance_cannot_take_a_fresh_lease() {
        let store = Arc::new(MemoryStore::new());
        let mut first = maintainer(&store, 1);
        first.start().await.unwrap();

        let mut second = maintainer(&store, 2);
        let err = second.start().await.unwrap_err();
        assert!(matches!(
            err,
            MaintainerError::Lease(LeaseError::Busy { pid: 1, .. })
        ));

        first.stop().await;
        assert_eq!(first.state(), MaintainerState::ShuttingDown);
        second.start().await.unwrap();
    }

    #[tokio::test]
    async fn run_releases_lease_on_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        maintainer(&store, 1).run(shutdown).await.unwrap();

        assert_eq!(store.lease_status(), None);
        maintainer(&store, 2).start().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_group_comp_does_not_block_creation() {
        let store = Arc::new(MemoryStore::new());
        store.seed_computation(
            DbComputation::new(CompId(1), "orphan", "Copy")
                .with_group(GroupId(9))
                .with_parm(CompParm::input(
                    "input",
                    ParmBinding::template(Default::default()),
                )),
        );
        let mut maintainer = maintainer(&store, 1);
        maintainer.start().await.unwrap();

        let created = store.seed_time_series("Dam.Elev").unwrap();
        store.enqueue_at(
            NotifyKind::TsCreated,
            created.key.0,
            chrono::Utc::now().naive_utc(),
        );
        maintainer.drain().await.unwrap();

        assert!(store.dependencies().is_empty());
        assert!(maintainer.snapshot().tsids.contains(created.key));
    }
}
