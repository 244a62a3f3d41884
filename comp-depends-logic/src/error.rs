use sea_orm::DbErr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("db error: {0}")]
    Db(#[from] DbErr),
    #[error("corrupted row: invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("corrupted row: {0}")]
    Corrupted(String),
}

#[derive(Error, Debug)]
pub enum LeaseError {
    #[error("lease for '{app_name}' is held by pid {pid} on {hostname}")]
    Busy {
        app_name: String,
        pid: i64,
        hostname: String,
    },
    #[error("lease for '{0}' was lost")]
    Lost(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum MaterializeError {
    #[error("part '{0}' cannot be bound from the trigger")]
    UnboundPart(String),
    #[error("input '{role}' resolves to unknown time series '{unique_string}'")]
    MissingInput {
        role: String,
        unique_string: String,
    },
    #[error("trigger is not among the bound inputs")]
    TriggerNotInput,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum MaintainerError {
    #[error("lease error: {0}")]
    Lease(#[from] LeaseError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<DbErr> for MaintainerError {
    fn from(err: DbErr) -> Self {
        Self::Store(StoreError::Db(err))
    }
}
