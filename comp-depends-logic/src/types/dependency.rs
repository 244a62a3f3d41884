use super::{computation::CompId, tsid::TsKey};

/// One edge of the dependency index: `ts_key` triggers `comp_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyRecord {
    pub ts_key: TsKey,
    pub comp_id: CompId,
}

impl DependencyRecord {
    pub fn new(ts_key: TsKey, comp_id: CompId) -> Self {
        Self { ts_key, comp_id }
    }
}

impl From<entity::cp_comp_depends::Model> for DependencyRecord {
    fn from(model: entity::cp_comp_depends::Model) -> Self {
        Self::new(TsKey(model.ts_id), CompId(model.computation_id))
    }
}

impl From<DependencyRecord> for entity::cp_comp_depends::ActiveModel {
    fn from(record: DependencyRecord) -> Self {
        use sea_orm::ActiveValue::Set;
        Self {
            ts_id: Set(record.ts_key.0),
            computation_id: Set(record.comp_id.0),
        }
    }
}

impl From<DependencyRecord> for entity::cp_comp_depends_scratchpad::ActiveModel {
    fn from(record: DependencyRecord) -> Self {
        use sea_orm::ActiveValue::Set;
        Self {
            ts_id: Set(record.ts_key.0),
            computation_id: Set(record.comp_id.0),
        }
    }
}
