use crate::{
    error::StoreError,
    types::{ChangeNotification, NotifyKind},
};
use chrono::Utc;
use entity::cp_depends_notify::{ActiveModel, Column, Entity, Model};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ConnectionTrait, EntityTrait, QueryOrder,
};

/// Removes and returns the oldest notification. Rows with an unknown event
/// type are dropped with a warning.
pub async fn pop_oldest<C>(db: &C) -> Result<Option<ChangeNotification>, StoreError>
where
    C: ConnectionTrait,
{
    loop {
        let Some(model) = Entity::find()
            .order_by_asc(Column::RecordNum)
            .one(db)
            .await?
        else {
            return Ok(None);
        };
        Entity::delete_by_id(model.record_num).exec(db).await?;

        match ChangeNotification::try_from(model) {
            Ok(notification) => return Ok(Some(notification)),
            Err(err) => tracing::warn!(error = %err, "skipping notification"),
        }
    }
}

pub async fn insert<C>(
    db: &C,
    kind: NotifyKind,
    key: i64,
) -> Result<ChangeNotification, StoreError>
where
    C: ConnectionTrait,
{
    let model = ActiveModel {
        record_num: NotSet,
        event_type: Set(kind.code().to_string()),
        key: Set(key),
        date_time_loaded: Set(Utc::now().naive_utc()),
    };
    let model = Entity::insert(model).exec_with_returning(db).await?;
    ChangeNotification::try_from(model)
}

impl TryFrom<Model> for ChangeNotification {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let kind = model
            .event_type
            .trim()
            .chars()
            .next()
            .and_then(NotifyKind::from_code)
            .ok_or_else(|| {
                StoreError::Corrupted(format!(
                    "notification {}: unknown event type '{}'",
                    model.record_num, model.event_type
                ))
            })?;
        Ok(Self {
            record_num: model.record_num,
            kind,
            key: model.key,
            loaded_at: model.date_time_loaded,
        })
    }
}
