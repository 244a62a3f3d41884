use super::tsid::{SiteId, TsKey};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub i64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which portion of a part value a filter is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartScope {
    #[default]
    Full,
    Base,
    Sub,
}

/// A wildcard predicate on one part of a time series identifier.
/// Filters on the same part (the "category") are OR'ed together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartFilter {
    pub part: String,
    #[serde(default)]
    pub scope: PartScope,
    pub pattern: String,
}

impl PartFilter {
    pub fn new(part: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            part: part.into(),
            scope: PartScope::Full,
            pattern: pattern.into(),
        }
    }

    pub fn with_scope(mut self, scope: PartScope) -> Self {
        self.scope = scope;
        self
    }
}

/// Stored shape of a group. Persisted as a json document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupDefinition {
    pub description: Option<String>,
    pub members: Vec<TsKey>,
    pub sites: Vec<SiteId>,
    pub filters: Vec<PartFilter>,
    pub included: Vec<GroupId>,
    pub excluded: Vec<GroupId>,
    pub intersected: Vec<GroupId>,
}

impl GroupDefinition {
    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty() || !self.sites.is_empty()
    }

    pub fn subgroups(&self) -> impl Iterator<Item = GroupId> + '_ {
        self.included
            .iter()
            .chain(self.excluded.iter())
            .chain(self.intersected.iter())
            .copied()
    }

    pub fn references(&self, id: GroupId) -> bool {
        self.subgroups().any(|sub| sub == id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsGroup {
    pub id: GroupId,
    pub name: String,
    pub definition: GroupDefinition,
    pub expanded: BTreeSet<TsKey>,
    pub is_expanded: bool,
}

impl TsGroup {
    pub fn new(id: GroupId, name: impl Into<String>, definition: GroupDefinition) -> Self {
        Self {
            id,
            name: name.into(),
            definition,
            expanded: BTreeSet::new(),
            is_expanded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn definition_json_defaults_missing_fields() {
        let definition: GroupDefinition = serde_json::from_value(serde_json::json!({
            "members": [1, 2],
            "filters": [{"part": "param", "pattern": "Elev*"}],
            "intersected": [7]
        }))
        .unwrap();

        assert_eq!(definition.members, vec![TsKey(1), TsKey(2)]);
        assert_eq!(definition.filters[0].scope, PartScope::Full);
        assert!(definition.included.is_empty());
        assert!(definition.references(GroupId(7)));
        assert!(!definition.references(GroupId(8)));
    }

    #[test]
    fn sites_count_as_filters() {
        let definition = GroupDefinition {
            sites: vec![SiteId(3)],
            ..Default::default()
        };
        assert!(definition.has_filters());
        assert!(!GroupDefinition::default().has_filters());
    }
}
