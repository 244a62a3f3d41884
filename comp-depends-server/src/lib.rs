mod maintainer;
mod metrics;
mod settings;

pub use maintainer::run as run_maintainer;
pub use metrics::run_server as run_metrics_server;
pub use settings::Settings;
