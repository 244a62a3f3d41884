use super::{
    ComputationCatalog, DependencyIndex, GroupCatalog, InstanceLease, Lease, NotificationQueue,
    ReconcileStats, TimeSeriesCatalog,
};
use crate::{
    error::{LeaseError, StoreError},
    repository::{comp_depends, computations, depends_notify, groups, proc_lock, ts_ids},
    types::{
        ChangeNotification, CompId, DbComputation, DependencyRecord, GroupId, NotifyKind, SiteId,
        TimeSeriesIdentifier, TsGroup, TsKey, TsidParts,
    },
};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};

pub struct PostgresStore {
    db: Arc<DatabaseConnection>,
}

impl PostgresStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TimeSeriesCatalog for PostgresStore {
    async fn get_by_key(&self, key: TsKey) -> Result<Option<TimeSeriesIdentifier>, StoreError> {
        ts_ids::find_by_key(self.db.as_ref(), key).await
    }

    async fn get_by_unique_string(
        &self,
        unique_string: &str,
    ) -> Result<Option<TimeSeriesIdentifier>, StoreError> {
        ts_ids::find_by_unique_string(self.db.as_ref(), unique_string).await
    }

    async fn list_all(&self) -> Result<Vec<TimeSeriesIdentifier>, StoreError> {
        ts_ids::list_all(self.db.as_ref()).await
    }

    async fn create(
        &self,
        parts: TsidParts,
        site_id: Option<SiteId>,
    ) -> Result<TimeSeriesIdentifier, StoreError> {
        ts_ids::insert(self.db.as_ref(), parts, site_id).await
    }
}

#[async_trait]
impl ComputationCatalog for PostgresStore {
    async fn get_by_id(&self, id: CompId) -> Result<Option<DbComputation>, StoreError> {
        computations::find_by_id(self.db.as_ref(), id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<DbComputation>, StoreError> {
        computations::find_by_name(self.db.as_ref(), name).await
    }

    async fn list_enabled(&self) -> Result<Vec<DbComputation>, StoreError> {
        computations::list_enabled(self.db.as_ref()).await
    }

    async fn write(&self, comp: &DbComputation) -> Result<(), StoreError> {
        computations::upsert(self.db.as_ref(), comp).await
    }
}

#[async_trait]
impl GroupCatalog for PostgresStore {
    async fn get_by_id(&self, id: GroupId) -> Result<Option<TsGroup>, StoreError> {
        groups::find_by_id(self.db.as_ref(), id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<TsGroup>, StoreError> {
        groups::find_by_name(self.db.as_ref(), name).await
    }

    async fn list_all(&self) -> Result<Vec<TsGroup>, StoreError> {
        groups::list_all(self.db.as_ref()).await
    }

    async fn write(&self, group: &TsGroup) -> Result<(), StoreError> {
        groups::upsert(self.db.as_ref(), group).await
    }

    async fn delete(&self, id: GroupId) -> Result<(), StoreError> {
        groups::delete(self.db.as_ref(), id).await
    }
}

#[async_trait]
impl DependencyIndex for PostgresStore {
    async fn all(&self) -> Result<Vec<DependencyRecord>, StoreError> {
        comp_depends::list_all(self.db.as_ref()).await
    }

    async fn comp_ids_for(&self, ts_key: TsKey) -> Result<Vec<CompId>, StoreError> {
        comp_depends::comp_ids_for_ts(self.db.as_ref(), ts_key).await
    }

    async fn triggers_for(&self, comp_id: CompId) -> Result<Vec<TsKey>, StoreError> {
        comp_depends::ts_keys_for_comp(self.db.as_ref(), comp_id).await
    }

    async fn delete_for_ts(&self, ts_key: TsKey) -> Result<u64, StoreError> {
        comp_depends::delete_for_ts(self.db.as_ref(), ts_key).await
    }

    async fn delete_for_comps(&self, comp_ids: &[CompId]) -> Result<u64, StoreError> {
        comp_depends::delete_for_comps(self.db.as_ref(), comp_ids).await
    }

    async fn add(&self, records: &[DependencyRecord]) -> Result<(), StoreError> {
        comp_depends::insert_many(self.db.as_ref(), records).await
    }

    async fn replace_for_comp(
        &self,
        comp_id: CompId,
        records: &[DependencyRecord],
    ) -> Result<(), StoreError> {
        comp_depends::replace_for_comp(self.db.as_ref(), comp_id, records).await
    }

    async fn reconcile(&self, records: &[DependencyRecord]) -> Result<ReconcileStats, StoreError> {
        comp_depends::reconcile(self.db.as_ref(), records).await
    }
}

#[async_trait]
impl NotificationQueue for PostgresStore {
    async fn next(&self) -> Result<Option<ChangeNotification>, StoreError> {
        depends_notify::pop_oldest(self.db.as_ref()).await
    }

    async fn enqueue(&self, kind: NotifyKind, key: i64) -> Result<ChangeNotification, StoreError> {
        depends_notify::insert(self.db.as_ref(), kind, key).await
    }
}

#[async_trait]
impl InstanceLease for PostgresStore {
    async fn obtain(&self, lease: &Lease, stale_after: Duration) -> Result<(), LeaseError> {
        proc_lock::obtain(self.db.as_ref(), lease, stale_after).await
    }

    async fn renew(&self, lease: &Lease, status: &str) -> Result<(), LeaseError> {
        proc_lock::renew(self.db.as_ref(), lease, status).await
    }

    async fn release(&self, lease: &Lease) -> Result<(), LeaseError> {
        proc_lock::release(self.db.as_ref(), lease).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{tsid::PARAM, CompParm, GroupDefinition, ParmBinding, PartFilter};
    use blockscout_service_launcher::test_database::TestDbGuard;
    use migration::Migrator;
    use pretty_assertions::assert_eq;

    async fn init_store(name: &str) -> (TestDbGuard, PostgresStore) {
        let db = TestDbGuard::new::<Migrator>(name).await;
        let store = PostgresStore::new(db.client());
        (db, store)
    }

    fn parts(unique_string: &str) -> TsidParts {
        TsidParts::parse(unique_string).unwrap()
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn time_series_lookup_ignores_case() {
        let (_db, store) = init_store("time_series_lookup_ignores_case").await;

        let created = store.create(parts("Dam.Elev.Inst"), None).await.unwrap();
        let found = store
            .get_by_unique_string("DAM.ELEV.INST")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.key, created.key);
        assert_eq!(found.unique_string(), "Dam.Elev.Inst");
        assert_eq!(TimeSeriesCatalog::list_all(&store).await.unwrap().len(), 1);
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn catalog_mutations_enqueue_notifications() {
        let (_db, store) = init_store("catalog_mutations_enqueue_notifications").await;

        let tsid = store.create(parts("Dam.Elev"), None).await.unwrap();
        let group = TsGroup::new(
            GroupId(1),
            "elevations",
            GroupDefinition {
                filters: vec![PartFilter::new(PARAM, "Elev")],
                ..Default::default()
            },
        );
        GroupCatalog::write(&store, &group).await.unwrap();

        let created = store.next().await.unwrap().unwrap();
        assert_eq!(created.kind, NotifyKind::TsCreated);
        assert_eq!(created.key, tsid.key.0);
        let modified = store.next().await.unwrap().unwrap();
        assert_eq!(modified.kind, NotifyKind::GroupModified);
        assert_eq!(modified.key, 1);
        assert!(store.next().await.unwrap().is_none());

        let stored = GroupCatalog::get_by_name(&store, "elevations")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.definition, group.definition);
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn computations_round_trip_through_json_columns() {
        let (_db, store) = init_store("computations_round_trip_through_json_columns").await;

        let comp = DbComputation::new(CompId(7), "copy", "Copy")
            .with_parm(CompParm::input("input", ParmBinding::concrete("Dam.Elev")))
            .with_property("units", "ft");
        ComputationCatalog::write(&store, &comp).await.unwrap();

        let mut disabled = comp.clone();
        disabled.enabled = false;
        ComputationCatalog::write(&store, &disabled).await.unwrap();

        assert_eq!(
            ComputationCatalog::get_by_id(&store, CompId(7)).await.unwrap(),
            Some(disabled)
        );
        assert!(store.list_enabled().await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn reconcile_converges_live_records() {
        let (_db, store) = init_store("reconcile_converges_live_records").await;
        let record = |ts, comp| DependencyRecord::new(TsKey(ts), CompId(comp));

        store
            .add(&[record(1, 1), record(2, 1), record(3, 2)])
            .await
            .unwrap();
        let stats = store
            .reconcile(&[record(1, 1), record(3, 2), record(4, 2)])
            .await
            .unwrap();

        assert_eq!(
            stats,
            ReconcileStats {
                deleted: 1,
                inserted: 1
            }
        );
        assert_eq!(
            store.all().await.unwrap(),
            vec![record(1, 1), record(3, 2), record(4, 2)]
        );
        assert_eq!(store.triggers_for(CompId(2)).await.unwrap(), vec![TsKey(3), TsKey(4)]);

        store.replace_for_comp(CompId(2), &[record(5, 2)]).await.unwrap();
        assert_eq!(store.comp_ids_for(TsKey(3)).await.unwrap(), vec![]);
        assert_eq!(store.comp_ids_for(TsKey(5)).await.unwrap(), vec![CompId(2)]);
    }

    #[tokio::test]
    #[ignore = "needs database to run"]
    async fn lease_is_exclusive_until_stale() {
        let (_db, store) = init_store("lease_is_exclusive_until_stale").await;
        let holder = Lease {
            app_name: "compdepends".to_string(),
            pid: 1,
            hostname: "a".to_string(),
        };
        let other = Lease {
            pid: 2,
            ..holder.clone()
        };

        store.obtain(&holder, Duration::from_secs(300)).await.unwrap();
        let err = store
            .obtain(&other, Duration::from_secs(300))
            .await
            .unwrap_err();
        assert!(matches!(err, LeaseError::Busy { pid: 1, .. }));

        store.renew(&holder, "Done=0, Errs=0").await.unwrap();
        store.obtain(&other, Duration::ZERO).await.unwrap();
        assert!(matches!(
            store.renew(&holder, "Done=1, Errs=0").await,
            Err(LeaseError::Lost(_))
        ));
        store.release(&other).await.unwrap();
    }
}
