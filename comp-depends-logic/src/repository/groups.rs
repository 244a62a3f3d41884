use crate::{
    error::StoreError,
    types::{GroupDefinition, GroupId, TsGroup},
};
use entity::tsdb_group::{ActiveModel, Column, Entity, Model};
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder,
};

pub async fn find_by_id<C>(db: &C, id: GroupId) -> Result<Option<TsGroup>, StoreError>
where
    C: ConnectionTrait,
{
    Entity::find_by_id(id.0)
        .one(db)
        .await?
        .map(TsGroup::try_from)
        .transpose()
}

pub async fn find_by_name<C>(db: &C, name: &str) -> Result<Option<TsGroup>, StoreError>
where
    C: ConnectionTrait,
{
    Entity::find()
        .filter(Column::GroupName.eq(name))
        .one(db)
        .await?
        .map(TsGroup::try_from)
        .transpose()
}

pub async fn list_all<C>(db: &C) -> Result<Vec<TsGroup>, StoreError>
where
    C: ConnectionTrait,
{
    let models = Entity::find()
        .order_by_asc(Column::GroupId)
        .all(db)
        .await?;
    Ok(decode_all(models))
}

fn decode_all(models: Vec<Model>) -> Vec<TsGroup> {
    models
        .into_iter()
        .filter_map(|model| {
            let group_id = model.group_id;
            TsGroup::try_from(model)
                .inspect_err(|err| {
                    tracing::warn!(group_id, error = %err, "skipping corrupted group")
                })
                .ok()
        })
        .collect()
}

pub async fn upsert<C>(db: &C, group: &TsGroup) -> Result<(), StoreError>
where
    C: ConnectionTrait,
{
    let model = ActiveModel {
        group_id: Set(group.id.0),
        group_name: Set(group.name.clone()),
        definition: Set(serde_json::to_value(&group.definition)?),
    };
    Entity::insert(model)
        .on_conflict(
            OnConflict::column(Column::GroupId)
                .update_columns([Column::GroupName, Column::Definition])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

pub async fn delete<C>(db: &C, id: GroupId) -> Result<(), StoreError>
where
    C: ConnectionTrait,
{
    Entity::delete_by_id(id.0).exec(db).await?;
    Ok(())
}

impl TryFrom<Model> for TsGroup {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let definition: GroupDefinition = serde_json::from_value(model.definition)?;
        Ok(Self::new(GroupId(model.group_id), model.group_name, definition))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn corrupted_group_rows_are_skipped() {
        let model = |group_id: i64, definition: serde_json::Value| Model {
            group_id,
            group_name: format!("group-{group_id}"),
            definition,
        };
        let decoded = decode_all(vec![
            model(1, json!({})),
            model(2, json!({ "members": "everything" })),
            model(3, json!({ "members": [7] })),
        ]);
        let ids: Vec<GroupId> = decoded.iter().map(|group| group.id).collect();
        assert_eq!(ids, vec![GroupId(1), GroupId(3)]);
    }
}
