pub mod catalog;
pub mod error;
pub mod groups;
pub mod maintainer;
mod metrics;
pub mod repository;
pub mod resolver;
pub mod settings;
pub mod storage;
pub mod template;
pub mod types;

pub use maintainer::{Maintainer, MaintainerState};
pub use resolver::{ExecutableComputation, Resolver, TriggeringTimeSeries};
pub use settings::MaintainerSettings;
