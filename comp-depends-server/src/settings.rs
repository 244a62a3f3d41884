use blockscout_service_launcher::{
    database::{DatabaseConnectSettings, DatabaseSettings},
    launcher::{ConfigSettings, MetricsSettings},
    tracing::{JaegerSettings, TracingSettings},
};
use comp_depends_logic::MaintainerSettings;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,

    pub database: DatabaseSettings,
    #[serde(default)]
    pub maintainer: MaintainerSettings,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "COMP_DEPENDS";

    fn validate(&self) -> anyhow::Result<()> {
        if self.maintainer.polling_interval.is_zero() {
            anyhow::bail!("maintainer polling interval must be positive");
        }
        if self.maintainer.lease_timeout <= self.maintainer.polling_interval {
            anyhow::bail!("maintainer lease timeout must exceed the polling interval");
        }
        Ok(())
    }
}

impl Settings {
    pub fn default(database_url: String) -> Self {
        Self {
            tracing: Default::default(),
            jaeger: Default::default(),
            metrics: Default::default(),
            database: DatabaseSettings {
                connect: DatabaseConnectSettings::Url(database_url),
                connect_options: Default::default(),
                create_database: Default::default(),
                run_migrations: Default::default(),
            },
            maintainer: Default::default(),
        }
    }
}
