use crate::{
    error::StoreError,
    types::{AppId, CompId, CompParm, DbComputation, GroupId},
};
use chrono::Utc;
use entity::cp_computation::{ActiveModel, Column, Entity, Model};
use sea_orm::{
    sea_query::OnConflict, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder,
};
use std::collections::BTreeMap;

pub async fn find_by_id<C>(db: &C, id: CompId) -> Result<Option<DbComputation>, StoreError>
where
    C: ConnectionTrait,
{
    Entity::find_by_id(id.0)
        .one(db)
        .await?
        .map(DbComputation::try_from)
        .transpose()
}

pub async fn find_by_name<C>(db: &C, name: &str) -> Result<Option<DbComputation>, StoreError>
where
    C: ConnectionTrait,
{
    Entity::find()
        .filter(Column::ComputationName.eq(name))
        .one(db)
        .await?
        .map(DbComputation::try_from)
        .transpose()
}

pub async fn list_enabled<C>(db: &C) -> Result<Vec<DbComputation>, StoreError>
where
    C: ConnectionTrait,
{
    let models = Entity::find()
        .filter(Column::Enabled.eq(true))
        .order_by_asc(Column::ComputationId)
        .all(db)
        .await?;
    Ok(decode_all(models))
}

/// Rows whose json columns do not decode are skipped with a warning.
fn decode_all(models: Vec<Model>) -> Vec<DbComputation> {
    models
        .into_iter()
        .filter_map(|model| {
            let computation_id = model.computation_id;
            DbComputation::try_from(model)
                .inspect_err(|err| {
                    tracing::warn!(computation_id, error = %err, "skipping corrupted computation")
                })
                .ok()
        })
        .collect()
}

pub async fn upsert<C>(db: &C, comp: &DbComputation) -> Result<(), StoreError>
where
    C: ConnectionTrait,
{
    let model = ActiveModel {
        computation_id: Set(comp.id.0),
        computation_name: Set(comp.name.clone()),
        enabled: Set(comp.enabled),
        algorithm_name: Set(comp.algorithm.clone()),
        loading_application_id: Set(comp.app_id.map(|app| app.0)),
        group_id: Set(comp.group_id.map(|group| group.0)),
        properties: Set(serde_json::to_value(&comp.properties)?),
        parms: Set(serde_json::to_value(&comp.parms)?),
        date_time_loaded: Set(Utc::now().naive_utc()),
    };
    Entity::insert(model)
        .on_conflict(
            OnConflict::column(Column::ComputationId)
                .update_columns([
                    Column::ComputationName,
                    Column::Enabled,
                    Column::AlgorithmName,
                    Column::LoadingApplicationId,
                    Column::GroupId,
                    Column::Properties,
                    Column::Parms,
                    Column::DateTimeLoaded,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}

impl TryFrom<Model> for DbComputation {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let properties: BTreeMap<String, String> = serde_json::from_value(model.properties)?;
        let parms: Vec<CompParm> = serde_json::from_value(model.parms)?;
        Ok(Self {
            id: CompId(model.computation_id),
            name: model.computation_name,
            enabled: model.enabled,
            algorithm: model.algorithm_name,
            app_id: model.loading_application_id.map(AppId),
            group_id: model.group_id.map(GroupId),
            properties,
            parms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn model(computation_id: i64, parms: serde_json::Value) -> Model {
        Model {
            computation_id,
            computation_name: format!("comp-{computation_id}"),
            enabled: true,
            algorithm_name: "CopyAlgorithm".to_string(),
            loading_application_id: None,
            group_id: None,
            properties: json!({}),
            parms,
            date_time_loaded: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn corrupted_computation_rows_are_skipped() {
        let decoded = decode_all(vec![
            model(1, json!([])),
            model(2, json!("not a parm list")),
            model(3, json!([])),
        ]);
        let ids: Vec<CompId> = decoded.iter().map(|comp| comp.id).collect();
        assert_eq!(ids, vec![CompId(1), CompId(3)]);
    }
}
