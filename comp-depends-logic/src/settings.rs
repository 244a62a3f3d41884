use serde::Deserialize;
use serde_with::serde_as;
use std::{path::PathBuf, time};

#[serde_as]
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MaintainerSettings {
    /// Loading application the lease is taken for.
    #[serde(default = "default_app_name")]
    pub app_name: String,

    #[serde(default = "default_cache_refresh_interval")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub cache_refresh_interval: time::Duration,

    /// Sleep between polls of an empty notification queue.
    #[serde(default = "default_polling_interval")]
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub polling_interval: time::Duration,

    /// Heartbeat age after which a lease held elsewhere may be taken over.
    #[serde(default = "default_lease_timeout")]
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub lease_timeout: time::Duration,

    #[serde(default)]
    pub full_eval_on_startup: bool,

    #[serde(default)]
    pub full_eval_only: bool,

    #[serde(default)]
    pub group_cache_dump_dir: Option<PathBuf>,
}

fn default_app_name() -> String {
    "compdepends".to_string()
}

fn default_cache_refresh_interval() -> time::Duration {
    time::Duration::from_secs(15 * 60)
}

fn default_polling_interval() -> time::Duration {
    time::Duration::from_millis(1000)
}

fn default_lease_timeout() -> time::Duration {
    time::Duration::from_secs(300)
}

impl Default for MaintainerSettings {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            cache_refresh_interval: default_cache_refresh_interval(),
            polling_interval: default_polling_interval(),
            lease_timeout: default_lease_timeout(),
            full_eval_on_startup: false,
            full_eval_only: false,
            group_cache_dump_dir: None,
        }
    }
}
