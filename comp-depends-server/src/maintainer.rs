use comp_depends_logic::{
    storage::{PostgresStore, Stores},
    Maintainer, MaintainerSettings,
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs the dependency maintainer until `shutdown` is cancelled.
pub async fn run(
    settings: MaintainerSettings,
    db_connection: Arc<DatabaseConnection>,
    shutdown: CancellationToken,
) -> Result<(), anyhow::Error> {
    let store = Arc::new(PostgresStore::new(db_connection));
    let maintainer = Maintainer::new(Stores::postgres(store), settings);
    maintainer.run(shutdown).await?;
    Ok(())
}
