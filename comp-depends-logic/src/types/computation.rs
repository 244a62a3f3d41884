use super::{
    group::GroupId,
    tsid::{normalize_unique_string, TsKey},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Property that turns a computation into a timer-driven one.
pub const TIMED_COMP_PROPERTY: &str = "timedCompInterval";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompId(pub i64);

impl fmt::Display for CompId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParmDirection {
    Input,
    Output,
}

/// What the algorithm does when an input value is missing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingAction {
    #[default]
    Fail,
    Ignore,
    Prev,
    Next,
    Interp,
    Closest,
}

/// Part overrides applied to a trigger when binding a group computation.
/// A value containing `*` is filled from the corresponding part of the trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParmTemplate {
    pub parts: BTreeMap<String, String>,
}

impl ParmTemplate {
    pub fn with_part(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParmBinding {
    /// Bound to one time series. `ts_key` is filled once the unique string
    /// is found in the catalog.
    Concrete {
        unique_string: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ts_key: Option<TsKey>,
    },
    Template(ParmTemplate),
}

impl ParmBinding {
    pub fn concrete(unique_string: impl Into<String>) -> Self {
        Self::Concrete {
            unique_string: unique_string.into(),
            ts_key: None,
        }
    }

    pub fn template(template: ParmTemplate) -> Self {
        Self::Template(template)
    }

    pub fn concrete_key(&self) -> Option<TsKey> {
        match self {
            Self::Concrete { ts_key, .. } => *ts_key,
            Self::Template(_) => None,
        }
    }

    pub fn concrete_unique_string(&self) -> Option<&str> {
        match self {
            Self::Concrete { unique_string, .. } => Some(unique_string),
            Self::Template(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompParm {
    pub role_name: String,
    pub direction: ParmDirection,
    #[serde(default)]
    pub interval: Option<String>,
    /// Table selector, applied to the `duration` part.
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub delta_t: i64,
    #[serde(default)]
    pub missing_action: MissingAction,
    pub binding: ParmBinding,
}

impl CompParm {
    pub fn input(role_name: impl Into<String>, binding: ParmBinding) -> Self {
        Self {
            role_name: role_name.into(),
            direction: ParmDirection::Input,
            interval: None,
            duration: None,
            delta_t: 0,
            missing_action: MissingAction::Fail,
            binding,
        }
    }

    pub fn output(role_name: impl Into<String>, binding: ParmBinding) -> Self {
        Self {
            direction: ParmDirection::Output,
            ..Self::input(role_name, binding)
        }
    }

    pub fn with_missing_action(mut self, action: MissingAction) -> Self {
        self.missing_action = action;
        self
    }

    pub fn with_interval(mut self, interval: impl Into<String>) -> Self {
        self.interval = Some(interval.into());
        self
    }

    pub fn is_input(&self) -> bool {
        self.direction == ParmDirection::Input
    }

    /// True if this parm is concretely bound to the given unique string.
    pub fn is_bound_to(&self, unique_string: &str) -> bool {
        self.binding
            .concrete_unique_string()
            .is_some_and(|bound| bound.eq_ignore_ascii_case(unique_string))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbComputation {
    pub id: CompId,
    pub name: String,
    pub enabled: bool,
    pub algorithm: String,
    pub app_id: Option<AppId>,
    pub group_id: Option<GroupId>,
    pub properties: BTreeMap<String, String>,
    pub parms: Vec<CompParm>,
}

impl DbComputation {
    pub fn new(id: CompId, name: impl Into<String>, algorithm: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            enabled: true,
            algorithm: algorithm.into(),
            app_id: None,
            group_id: None,
            properties: BTreeMap::new(),
            parms: Vec::new(),
        }
    }

    pub fn with_parm(mut self, parm: CompParm) -> Self {
        self.parms.push(parm);
        self
    }

    pub fn with_group(mut self, group_id: GroupId) -> Self {
        self.group_id = Some(group_id);
        self
    }

    pub fn with_app(mut self, app_id: AppId) -> Self {
        self.app_id = Some(app_id);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn is_group(&self) -> bool {
        self.group_id.is_some()
    }

    /// Timed computations run on a schedule and never have triggers.
    pub fn is_timed(&self) -> bool {
        self.properties
            .keys()
            .any(|name| name.eq_ignore_ascii_case(TIMED_COMP_PROPERTY))
    }

    pub fn inputs(&self) -> impl Iterator<Item = &CompParm> {
        self.parms.iter().filter(|parm| parm.is_input())
    }

    /// Fills in `ts_key` for concrete bindings using the given lookup.
    /// Bindings that cannot be found are left unresolved.
    pub fn resolve_concrete_keys<F>(&mut self, mut lookup: F)
    where
        F: FnMut(&str) -> Option<TsKey>,
    {
        for parm in self.parms.iter_mut() {
            if let ParmBinding::Concrete {
                unique_string,
                ts_key,
            } = &mut parm.binding
            {
                *ts_key = lookup(&normalize_unique_string(unique_string));
            }
        }
    }
}
