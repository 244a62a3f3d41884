use crate::{
    error::StoreError,
    types::{tsid::normalize_unique_string, SiteId, TimeSeriesIdentifier, TsKey, TsidParts},
};
use entity::ts_id::{ActiveModel, Column, Entity, Model};
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveValue::{NotSet, Set},
    ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
};

pub async fn find_by_key<C>(db: &C, key: TsKey) -> Result<Option<TimeSeriesIdentifier>, StoreError>
where
    C: ConnectionTrait,
{
    Entity::find_by_id(key.0)
        .one(db)
        .await?
        .map(TimeSeriesIdentifier::try_from)
        .transpose()
}

pub async fn find_by_unique_string<C>(
    db: &C,
    unique_string: &str,
) -> Result<Option<TimeSeriesIdentifier>, StoreError>
where
    C: ConnectionTrait,
{
    Entity::find()
        .filter(
            Expr::expr(Func::lower(Expr::col(Column::UniqueString)))
                .eq(normalize_unique_string(unique_string)),
        )
        .one(db)
        .await?
        .map(TimeSeriesIdentifier::try_from)
        .transpose()
}

pub async fn list_all<C>(db: &C) -> Result<Vec<TimeSeriesIdentifier>, StoreError>
where
    C: ConnectionTrait,
{
    let models = Entity::find().order_by_asc(Column::TsId).all(db).await?;
    Ok(decode_all(models))
}

fn decode_all(models: Vec<Model>) -> Vec<TimeSeriesIdentifier> {
    models
        .into_iter()
        .filter_map(|model| {
            let ts_id = model.ts_id;
            TimeSeriesIdentifier::try_from(model)
                .inspect_err(|err| {
                    tracing::warn!(ts_id, error = %err, "skipping corrupted time series")
                })
                .ok()
        })
        .collect()
}

pub async fn insert<C>(
    db: &C,
    parts: TsidParts,
    site_id: Option<SiteId>,
) -> Result<TimeSeriesIdentifier, StoreError>
where
    C: ConnectionTrait,
{
    let model = ActiveModel {
        ts_id: NotSet,
        unique_string: Set(parts.unique_string()),
        parts: Set(serde_json::to_value(&parts)?),
        site_id: Set(site_id.map(|site| site.0)),
        storage_units: Set(None),
    };
    let model = Entity::insert(model).exec_with_returning(db).await?;
    TimeSeriesIdentifier::try_from(model)
}

impl TryFrom<Model> for TimeSeriesIdentifier {
    type Error = StoreError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let parts: TsidParts = serde_json::from_value(model.parts)?;
        let parts = if parts.is_empty() {
            TsidParts::parse(&model.unique_string).ok_or_else(|| {
                StoreError::Corrupted(format!(
                    "ts_id {}: invalid unique string '{}'",
                    model.ts_id, model.unique_string
                ))
            })?
        } else {
            parts
        };
        let mut tsid = TimeSeriesIdentifier::new(TsKey(model.ts_id), parts);
        tsid.site_id = model.site_id.map(SiteId);
        tsid.storage_units = model.storage_units;
        Ok(tsid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn model(ts_id: i64, unique_string: &str, parts: serde_json::Value) -> Model {
        Model {
            ts_id,
            unique_string: unique_string.to_string(),
            parts,
            site_id: None,
            storage_units: None,
        }
    }

    #[test]
    fn corrupted_time_series_rows_are_skipped() {
        let decoded = decode_all(vec![
            model(1, "Dam.Elev", json!({ "location": "Dam", "param": "Elev" })),
            model(2, "Dam.Flow", json!(["Dam", "Flow"])),
            model(3, "Dam..Inst", json!({})),
            model(4, "Lake.Stage", json!({})),
        ]);
        let unique_strings: Vec<&str> = decoded.iter().map(|tsid| tsid.unique_string()).collect();
        assert_eq!(unique_strings, vec!["Dam.Elev", "Lake.Stage"]);
    }
}
