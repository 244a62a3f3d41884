use super::filter::GroupFilters;
use crate::{
    catalog::TsidCache,
    types::{GroupId, TimeSeriesIdentifier, TsGroup, TsKey},
};
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone)]
struct GroupEntry {
    group: TsGroup,
    filters: GroupFilters,
    /// Expansion the group contributes when it is reached again while its
    /// own evaluation is in progress. Frozen at the value it had when the
    /// registry was last fully evaluated.
    cycle_seed: BTreeSet<TsKey>,
}

#[derive(Debug, Clone)]
enum Visit<T> {
    InProgress,
    Done(T),
}

/// Id-keyed arena of groups. Subgroup references are resolved through the
/// registry at evaluation time, so a group edited or removed here is seen by
/// every group that refers to it.
///
/// Expansion of a group is a function of the definitions, the catalog and
/// the cycle seeds only, so [`GroupRegistry::matches`] and
/// [`GroupRegistry::expand`] agree for every group, cyclic or not, and
/// repeated expansion between two full evaluations is stable.
#[derive(Debug, Clone, Default)]
pub struct GroupRegistry {
    groups: BTreeMap<GroupId, GroupEntry>,
}

impl GroupRegistry {
    pub fn new(groups: impl IntoIterator<Item = TsGroup>) -> Self {
        let mut registry = Self::default();
        for group in groups {
            registry.insert(group);
        }
        registry
    }

    /// Inserts or replaces a group. A replaced group keeps its cached
    /// expansion until it is expanded again. A filter that fails to compile
    /// leaves the group without filters.
    pub fn insert(&mut self, mut group: TsGroup) {
        let filters =
            GroupFilters::compile(&group.definition.filters, &group.definition.sites)
                .unwrap_or_else(|err| {
                    tracing::warn!(
                        group_id = %group.id,
                        group_name = %group.name,
                        error = ?err,
                        "invalid group filter, filters ignored"
                    );
                    GroupFilters::default()
                });
        let cycle_seed = match self.groups.remove(&group.id) {
            Some(previous) => {
                if !group.is_expanded {
                    group.expanded = previous.group.expanded;
                }
                previous.cycle_seed
            }
            None => group.expanded.clone(),
        };
        self.groups.insert(
            group.id,
            GroupEntry {
                group,
                filters,
                cycle_seed,
            },
        );
    }

    pub fn remove(&mut self, id: GroupId) -> Option<TsGroup> {
        self.groups.remove(&id).map(|entry| entry.group)
    }

    pub fn get(&self, id: GroupId) -> Option<&TsGroup> {
        self.groups.get(&id).map(|entry| &entry.group)
    }

    pub fn contains(&self, id: GroupId) -> bool {
        self.groups.contains_key(&id)
    }

    pub fn ids(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TsGroup> {
        self.groups.values().map(|entry| &entry.group)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Recomputes and caches the expanded member list of a group.
    /// An unknown group expands to the empty set.
    pub fn expand(&mut self, id: GroupId, catalog: &TsidCache) -> BTreeSet<TsKey> {
        let mut visits = HashMap::new();
        let expanded = self.expand_inner(id, catalog, &mut visits);
        if let Some(entry) = self.groups.get_mut(&id) {
            entry.group.expanded = expanded.clone();
            entry.group.is_expanded = true;
        }
        expanded
    }

    fn expand_inner(
        &self,
        id: GroupId,
        catalog: &TsidCache,
        visits: &mut HashMap<GroupId, Visit<BTreeSet<TsKey>>>,
    ) -> BTreeSet<TsKey> {
        match visits.get(&id) {
            Some(Visit::Done(expanded)) => return expanded.clone(),
            Some(Visit::InProgress) => {
                return self
                    .groups
                    .get(&id)
                    .map(|entry| entry.cycle_seed.clone())
                    .unwrap_or_default()
            }
            None => {}
        }
        let Some(entry) = self.groups.get(&id) else {
            tracing::debug!(group_id = %id, "subgroup not found, treated as empty");
            return BTreeSet::new();
        };
        visits.insert(id, Visit::InProgress);
        let definition = &entry.group.definition;

        let mut expanded: BTreeSet<TsKey> = definition.members.iter().copied().collect();
        if !entry.filters.is_empty() {
            expanded.extend(
                catalog
                    .iter()
                    .filter(|tsid| entry.filters.matches(tsid))
                    .map(|tsid| tsid.key),
            );
        }
        for sub in &definition.included {
            let included = self.expand_inner(*sub, catalog, visits);
            expanded.extend(included);
        }
        for sub in &definition.excluded {
            let excluded = self.expand_inner(*sub, catalog, visits);
            expanded.retain(|key| !excluded.contains(key));
        }
        for sub in &definition.intersected {
            let intersected = self.expand_inner(*sub, catalog, visits);
            expanded.retain(|key| intersected.contains(key));
        }

        visits.insert(id, Visit::Done(expanded.clone()));
        expanded
    }

    /// Whether `tsid` belongs to the group, following the same rules as
    /// [`Self::expand`] without touching any cached expansion.
    pub fn matches(&self, id: GroupId, tsid: &TimeSeriesIdentifier) -> bool {
        let mut visits = HashMap::new();
        self.matches_inner(id, tsid, &mut visits)
    }

    fn matches_inner(
        &self,
        id: GroupId,
        tsid: &TimeSeriesIdentifier,
        visits: &mut HashMap<GroupId, Visit<bool>>,
    ) -> bool {
        match visits.get(&id) {
            Some(Visit::Done(result)) => return *result,
            Some(Visit::InProgress) => {
                return self
                    .groups
                    .get(&id)
                    .is_some_and(|entry| entry.cycle_seed.contains(&tsid.key))
            }
            None => {}
        }
        let Some(entry) = self.groups.get(&id) else {
            return false;
        };
        visits.insert(id, Visit::InProgress);
        let definition = &entry.group.definition;

        let mut result = definition.members.contains(&tsid.key) || entry.filters.matches(tsid);
        // Every subgroup is visited, so memoized results match the order
        // `expand_inner` evaluates them in.
        for sub in &definition.included {
            result |= self.matches_inner(*sub, tsid, visits);
        }
        for sub in &definition.excluded {
            if self.matches_inner(*sub, tsid, visits) {
                result = false;
            }
        }
        for sub in &definition.intersected {
            if !self.matches_inner(*sub, tsid, visits) {
                result = false;
            }
        }

        visits.insert(id, Visit::Done(result));
        result
    }

    /// Every group that includes, excludes or intersects `id`, directly or
    /// transitively. Contains `id` itself when it sits on a cycle.
    pub fn find_ancestors(&self, id: GroupId) -> BTreeSet<GroupId> {
        let mut ancestors = BTreeSet::new();
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            for entry in self.groups.values() {
                if entry.group.definition.references(current) && ancestors.insert(entry.group.id)
                {
                    pending.push(entry.group.id);
                }
            }
        }
        ancestors
    }

    /// Re-expands every group. Cycle seeds are frozen at the expansions
    /// cached before this pass.
    pub fn eval_all(&mut self, catalog: &TsidCache) {
        for entry in self.groups.values_mut() {
            entry.cycle_seed = entry.group.expanded.clone();
        }
        for id in self.ids() {
            self.expand(id, catalog);
        }
    }

    /// Adds `tsid` to the cached expansion of every group it now matches.
    /// Returns the ids of those groups.
    pub fn add_matching(&mut self, tsid: &TimeSeriesIdentifier) -> Vec<GroupId> {
        let matching: Vec<GroupId> = self
            .groups
            .keys()
            .copied()
            .filter(|id| self.matches(*id, tsid))
            .collect();
        for id in &matching {
            if let Some(entry) = self.groups.get_mut(id) {
                entry.group.expanded.insert(tsid.key);
            }
        }
        matching
    }

    /// Drops `key` from every cached expansion and from explicit member
    /// lists. Returns the groups whose explicit members changed.
    pub fn remove_member(&mut self, key: TsKey) -> Vec<TsGroup> {
        let mut changed = Vec::new();
        for entry in self.groups.values_mut() {
            entry.group.expanded.remove(&key);
            entry.cycle_seed.remove(&key);
            let before = entry.group.definition.members.len();
            entry.group.definition.members.retain(|member| *member != key);
            if entry.group.definition.members.len() != before {
                changed.push(entry.group.clone());
            }
        }
        changed
    }

    pub fn expanded(&self, id: GroupId) -> Option<&BTreeSet<TsKey>> {
        self.get(id).map(|group| &group.expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{tsid::PARAM, GroupDefinition, PartFilter};
    use pretty_assertions::assert_eq;

    fn catalog(unique_strings: &[&str]) -> TsidCache {
        TsidCache::new(unique_strings.iter().enumerate().map(|(i, unique)| {
            TimeSeriesIdentifier::parse(TsKey(i as i64 + 1), unique).unwrap()
        }))
    }

    fn group(id: i64, definition: GroupDefinition) -> TsGroup {
        TsGroup::new(GroupId(id), format!("group-{id}"), definition)
    }

    fn members(keys: &[i64]) -> Vec<TsKey> {
        keys.iter().copied().map(TsKey).collect()
    }

    fn keys(keys: &[i64]) -> BTreeSet<TsKey> {
        keys.iter().copied().map(TsKey).collect()
    }

    #[test]
    fn mutually_including_groups_terminate() {
        let catalog = catalog(&["a.Elev", "b.Elev"]);
        let mut registry = GroupRegistry::new([
            group(
                1,
                GroupDefinition {
                    members: members(&[1]),
                    included: vec![GroupId(2)],
                    ..Default::default()
                },
            ),
            group(
                2,
                GroupDefinition {
                    members: members(&[2]),
                    included: vec![GroupId(1)],
                    ..Default::default()
                },
            ),
        ]);

        assert_eq!(registry.expand(GroupId(1), &catalog), keys(&[1, 2]));
        assert_eq!(registry.expand(GroupId(2), &catalog), keys(&[1, 2]));
        assert!(registry.get(GroupId(1)).unwrap().is_expanded);
    }

    #[test]
    fn include_and_exclude_apply_before_intersect() {
        // a = 1, b = 2, c = 3
        let catalog = catalog(&["a.Elev", "b.Elev", "c.Elev"]);
        let mut registry = GroupRegistry::new([
            group(
                10,
                GroupDefinition {
                    included: vec![GroupId(1)],
                    excluded: vec![GroupId(2)],
                    intersected: vec![GroupId(3)],
                    ..Default::default()
                },
            ),
            group(1, GroupDefinition { members: members(&[1, 2]), ..Default::default() }),
            group(2, GroupDefinition { members: members(&[2]), ..Default::default() }),
            group(3, GroupDefinition { members: members(&[1, 3]), ..Default::default() }),
        ]);

        assert_eq!(registry.expand(GroupId(10), &catalog), keys(&[1]));
    }

    #[test]
    fn missing_subgroup_is_empty() {
        let catalog = catalog(&["a.Elev"]);
        let mut registry = GroupRegistry::new([group(
            1,
            GroupDefinition {
                members: members(&[1]),
                intersected: vec![GroupId(404)],
                ..Default::default()
            },
        )]);
        assert!(registry.expand(GroupId(1), &catalog).is_empty());
        assert!(registry.expand(GroupId(404), &catalog).is_empty());
    }

    #[test]
    fn matches_agrees_with_expand() {
        let catalog = catalog(&[
            "Dam.Elev",
            "Dam.Flow",
            "Lake.Elev",
            "Lake.Stage",
            "River-Upper.Elev",
            "River-Lower.Flow",
        ]);
        let mut registry = GroupRegistry::new([
            group(
                1,
                GroupDefinition {
                    filters: vec![PartFilter::new(PARAM, "Elev")],
                    ..Default::default()
                },
            ),
            group(
                2,
                GroupDefinition {
                    members: members(&[2, 4]),
                    included: vec![GroupId(1)],
                    excluded: vec![GroupId(3)],
                    ..Default::default()
                },
            ),
            group(
                3,
                GroupDefinition {
                    members: members(&[3]),
                    ..Default::default()
                },
            ),
            group(
                4,
                GroupDefinition {
                    included: vec![GroupId(2), GroupId(3)],
                    intersected: vec![GroupId(1)],
                    ..Default::default()
                },
            ),
            group(
                5,
                GroupDefinition {
                    included: vec![GroupId(4), GroupId(2)],
                    excluded: vec![GroupId(404)],
                    ..Default::default()
                },
            ),
            group(
                6,
                GroupDefinition {
                    members: members(&[1, 3]),
                    excluded: vec![GroupId(7)],
                    ..Default::default()
                },
            ),
            group(
                7,
                GroupDefinition {
                    members: members(&[3]),
                    included: vec![GroupId(6)],
                    ..Default::default()
                },
            ),
        ]);

        for _ in 0..2 {
            for id in registry.ids() {
                let expanded = registry.expand(id, &catalog);
                for tsid in catalog.iter() {
                    assert_eq!(
                        registry.matches(id, tsid),
                        expanded.contains(&tsid.key),
                        "group {id}, tsid {}",
                        tsid.unique_string()
                    );
                }
            }
            registry.eval_all(&catalog);
        }
        for id in registry.ids() {
            for tsid in catalog.iter() {
                assert_eq!(
                    registry.matches(id, tsid),
                    registry.expanded(id).unwrap().contains(&tsid.key),
                    "group {id}, tsid {}",
                    tsid.unique_string()
                );
            }
        }
    }

    #[test]
    fn cyclic_exclusion_is_stable_between_full_evaluations() {
        let catalog = catalog(&["a.Elev"]);
        let ts1 = catalog.get(TsKey(1)).unwrap().clone();
        let mut registry = GroupRegistry::new([
            group(
                1,
                GroupDefinition {
                    members: members(&[1]),
                    excluded: vec![GroupId(2)],
                    ..Default::default()
                },
            ),
            group(
                2,
                GroupDefinition {
                    included: vec![GroupId(1)],
                    ..Default::default()
                },
            ),
        ]);

        for _ in 0..3 {
            assert_eq!(registry.expand(GroupId(1), &catalog), keys(&[1]));
            assert!(registry.matches(GroupId(1), &ts1));
        }

        // The cached {1} becomes the contribution of group 1 inside the cycle.
        registry.eval_all(&catalog);
        assert_eq!(registry.expanded(GroupId(1)), Some(&keys(&[])));
        assert_eq!(registry.expanded(GroupId(2)), Some(&keys(&[1])));
        for _ in 0..3 {
            assert_eq!(registry.expand(GroupId(1), &catalog), keys(&[]));
            assert!(!registry.matches(GroupId(1), &ts1));
            assert_eq!(registry.expand(GroupId(2), &catalog), keys(&[1]));
            assert!(registry.matches(GroupId(2), &ts1));
        }
    }

    #[test]
    fn ancestors_follow_every_reference_kind() {
        let registry = GroupRegistry::new([
            group(1, GroupDefinition::default()),
            group(
                2,
                GroupDefinition {
                    intersected: vec![GroupId(1)],
                    ..Default::default()
                },
            ),
            group(
                3,
                GroupDefinition {
                    excluded: vec![GroupId(2)],
                    ..Default::default()
                },
            ),
            group(
                4,
                GroupDefinition {
                    included: vec![GroupId(3)],
                    ..Default::default()
                },
            ),
            group(5, GroupDefinition::default()),
        ]);

        assert_eq!(
            registry.find_ancestors(GroupId(1)),
            [GroupId(2), GroupId(3), GroupId(4)].into_iter().collect()
        );
        assert!(registry.find_ancestors(GroupId(5)).is_empty());
    }

    #[test]
    fn ancestors_of_a_cycle_include_itself() {
        let registry = GroupRegistry::new([
            group(
                1,
                GroupDefinition {
                    included: vec![GroupId(2)],
                    ..Default::default()
                },
            ),
            group(
                2,
                GroupDefinition {
                    included: vec![GroupId(1)],
                    ..Default::default()
                },
            ),
        ]);
        assert_eq!(
            registry.find_ancestors(GroupId(1)),
            [GroupId(1), GroupId(2)].into_iter().collect()
        );
    }

    #[test]
    fn remove_member_reports_explicit_changes() {
        let catalog = catalog(&["a.Elev", "b.Elev"]);
        let mut registry = GroupRegistry::new([
            group(
                1,
                GroupDefinition {
                    members: members(&[1, 2]),
                    ..Default::default()
                },
            ),
            group(
                2,
                GroupDefinition {
                    included: vec![GroupId(1)],
                    ..Default::default()
                },
            ),
        ]);
        registry.eval_all(&catalog);

        let changed = registry.remove_member(TsKey(1));

        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].definition.members, members(&[2]));
        assert_eq!(registry.expanded(GroupId(2)), Some(&keys(&[2])));
    }
}
