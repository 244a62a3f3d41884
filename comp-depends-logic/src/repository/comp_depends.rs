use crate::{
    error::StoreError,
    types::{CompId, DependencyRecord, TsKey},
};
use entity::{
    cp_comp_depends::{ActiveModel, Column, Entity},
    cp_comp_depends_scratchpad,
};
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};

/// Two bind parameters per row keep a chunk well below the Postgres limit.
const INSERT_CHUNK_SIZE: usize = 10_000;

/// Counts of records removed and added by a reconcile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub deleted: u64,
    pub inserted: u64,
}

pub async fn list_all<C>(db: &C) -> Result<Vec<DependencyRecord>, StoreError>
where
    C: ConnectionTrait,
{
    let records = Entity::find()
        .order_by_asc(Column::TsId)
        .order_by_asc(Column::ComputationId)
        .all(db)
        .await?
        .into_iter()
        .map(DependencyRecord::from)
        .collect();
    Ok(records)
}

pub async fn comp_ids_for_ts<C>(db: &C, ts_key: TsKey) -> Result<Vec<CompId>, StoreError>
where
    C: ConnectionTrait,
{
    let ids = Entity::find()
        .select_only()
        .column(Column::ComputationId)
        .filter(Column::TsId.eq(ts_key.0))
        .order_by_asc(Column::ComputationId)
        .into_tuple::<i64>()
        .all(db)
        .await?;
    Ok(ids.into_iter().map(CompId).collect())
}

pub async fn ts_keys_for_comp<C>(db: &C, comp_id: CompId) -> Result<Vec<TsKey>, StoreError>
where
    C: ConnectionTrait,
{
    let keys = Entity::find()
        .select_only()
        .column(Column::TsId)
        .filter(Column::ComputationId.eq(comp_id.0))
        .order_by_asc(Column::TsId)
        .into_tuple::<i64>()
        .all(db)
        .await?;
    Ok(keys.into_iter().map(TsKey).collect())
}

pub async fn delete_for_ts<C>(db: &C, ts_key: TsKey) -> Result<u64, StoreError>
where
    C: ConnectionTrait,
{
    let result = Entity::delete_many()
        .filter(Column::TsId.eq(ts_key.0))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

pub async fn delete_for_comps<C>(db: &C, comp_ids: &[CompId]) -> Result<u64, StoreError>
where
    C: ConnectionTrait,
{
    if comp_ids.is_empty() {
        return Ok(0);
    }
    let result = Entity::delete_many()
        .filter(Column::ComputationId.is_in(comp_ids.iter().map(|id| id.0)))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Inserts records, skipping those already present.
pub async fn insert_many<C>(db: &C, records: &[DependencyRecord]) -> Result<(), StoreError>
where
    C: ConnectionTrait,
{
    for chunk in records.chunks(INSERT_CHUNK_SIZE) {
        Entity::insert_many(chunk.iter().copied().map(ActiveModel::from))
            .on_conflict(
                OnConflict::columns([Column::TsId, Column::ComputationId])
                    .do_nothing()
                    .to_owned(),
            )
            .on_empty_do_nothing()
            .exec(db)
            .await?;
    }
    Ok(())
}

/// Replaces every record of `comp_id` with `records` in one transaction.
pub async fn replace_for_comp(
    db: &DatabaseConnection,
    comp_id: CompId,
    records: &[DependencyRecord],
) -> Result<(), StoreError> {
    let txn = db.begin().await?;
    delete_for_comps(&txn, &[comp_id]).await?;
    insert_many(&txn, records).await?;
    txn.commit().await?;
    Ok(())
}

/// Makes the live table equal to `records`. The target set is staged in the
/// scratchpad table, then stale rows are deleted and missing rows inserted,
/// all in one transaction.
pub async fn reconcile(
    db: &DatabaseConnection,
    records: &[DependencyRecord],
) -> Result<ReconcileStats, StoreError> {
    let txn = db.begin().await?;

    cp_comp_depends_scratchpad::Entity::delete_many()
        .exec(&txn)
        .await?;
    for chunk in records.chunks(INSERT_CHUNK_SIZE) {
        cp_comp_depends_scratchpad::Entity::insert_many(
            chunk
                .iter()
                .copied()
                .map(cp_comp_depends_scratchpad::ActiveModel::from),
        )
        .on_conflict(
            OnConflict::columns([
                cp_comp_depends_scratchpad::Column::TsId,
                cp_comp_depends_scratchpad::Column::ComputationId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .on_empty_do_nothing()
        .exec(&txn)
        .await?;
    }

    let deleted = txn
        .execute_unprepared(
            r#"
            DELETE FROM cp_comp_depends d
            WHERE NOT EXISTS (
                SELECT 1 FROM cp_comp_depends_scratchpad s
                WHERE s.ts_id = d.ts_id AND s.computation_id = d.computation_id
            )
            "#,
        )
        .await?
        .rows_affected();
    let inserted = txn
        .execute_unprepared(
            r#"
            INSERT INTO cp_comp_depends (ts_id, computation_id)
            SELECT s.ts_id, s.computation_id FROM cp_comp_depends_scratchpad s
            WHERE NOT EXISTS (
                SELECT 1 FROM cp_comp_depends d
                WHERE d.ts_id = s.ts_id AND d.computation_id = s.computation_id
            )
            "#,
        )
        .await?
        .rows_affected();

    cp_comp_depends_scratchpad::Entity::delete_many()
        .exec(&txn)
        .await?;
    txn.commit().await?;

    Ok(ReconcileStats { deleted, inserted })
}
