use crate::{error::LeaseError, error::StoreError, storage::Lease};
use chrono::Utc;
use entity::cp_comp_proc_lock::{ActiveModel, Column, Entity};
use sea_orm::{
    prelude::Expr, ActiveValue::Set, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QuerySelect, TransactionTrait,
};
use std::time::Duration;

/// Takes the lease of `lease.app_name`. A lease held by another process is
/// taken over only when its heartbeat is older than `stale_after`.
pub async fn obtain(
    db: &DatabaseConnection,
    lease: &Lease,
    stale_after: Duration,
) -> Result<(), LeaseError> {
    let now = Utc::now().naive_utc();
    let txn = db.begin().await.map_err(StoreError::from)?;

    let existing = Entity::find_by_id(lease.app_name.clone())
        .lock_exclusive()
        .one(&txn)
        .await
        .map_err(StoreError::from)?;

    if let Some(existing) = &existing {
        let same_holder = existing.pid == lease.pid && existing.hostname == lease.hostname;
        let is_fresh = (now - existing.heartbeat)
            .to_std()
            .map(|age| age < stale_after)
            .unwrap_or(true);
        if !same_holder && is_fresh {
            return Err(LeaseError::Busy {
                app_name: lease.app_name.clone(),
                pid: existing.pid,
                hostname: existing.hostname.clone(),
            });
        }
        tracing::warn!(
            app_name = %lease.app_name,
            previous_pid = existing.pid,
            previous_hostname = %existing.hostname,
            "taking over stale lease"
        );
    }

    let model = ActiveModel {
        loading_application_name: Set(lease.app_name.clone()),
        pid: Set(lease.pid),
        hostname: Set(lease.hostname.clone()),
        heartbeat: Set(now),
        cur_status: Set(None),
    };
    if existing.is_some() {
        Entity::update(model)
            .exec(&txn)
            .await
            .map_err(StoreError::from)?;
    } else {
        Entity::insert(model)
            .exec_without_returning(&txn)
            .await
            .map_err(StoreError::from)?;
    }
    txn.commit().await.map_err(StoreError::from)?;
    Ok(())
}

pub async fn renew(db: &DatabaseConnection, lease: &Lease, status: &str) -> Result<(), LeaseError> {
    let result = Entity::update_many()
        .col_expr(Column::Heartbeat, Expr::value(Utc::now().naive_utc()))
        .col_expr(Column::CurStatus, Expr::value(status))
        .filter(Column::LoadingApplicationName.eq(lease.app_name.as_str()))
        .filter(Column::Pid.eq(lease.pid))
        .filter(Column::Hostname.eq(lease.hostname.as_str()))
        .exec(db)
        .await
        .map_err(StoreError::from)?;
    if result.rows_affected == 0 {
        return Err(LeaseError::Lost(lease.app_name.clone()));
    }
    Ok(())
}

pub async fn release(db: &DatabaseConnection, lease: &Lease) -> Result<(), LeaseError> {
    Entity::delete_many()
        .filter(Column::LoadingApplicationName.eq(lease.app_name.as_str()))
        .filter(Column::Pid.eq(lease.pid))
        .filter(Column::Hostname.eq(lease.hostname.as_str()))
        .exec(db)
        .await
        .map_err(StoreError::from)?;
    Ok(())
}
