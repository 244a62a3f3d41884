pub mod computation;
pub mod dependency;
pub mod group;
pub mod notify;
pub mod tsid;

pub use computation::{
    AppId, CompId, CompParm, DbComputation, MissingAction, ParmBinding, ParmDirection,
    ParmTemplate,
};
pub use dependency::DependencyRecord;
pub use group::{GroupDefinition, GroupId, PartFilter, PartScope, TsGroup};
pub use notify::{ChangeNotification, NotifyKind};
pub use tsid::{SiteId, TimeSeriesIdentifier, TsKey, TsidParts};
