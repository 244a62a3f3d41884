use crate::{
    catalog::TsidCache,
    error::StoreError,
    groups::GroupRegistry,
    storage::Stores,
    template,
    types::{CompId, DbComputation, DependencyRecord, TsKey},
};
use std::collections::{BTreeMap, BTreeSet};

/// Everything the maintainer keeps in memory between refreshes.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tsids: TsidCache,
    pub groups: GroupRegistry,
    /// Enabled, triggered computations with concrete input keys resolved.
    pub comps: BTreeMap<CompId, DbComputation>,
    pub depends: BTreeSet<DependencyRecord>,
}

impl Snapshot {
    pub async fn load(stores: &Stores) -> Result<Self, StoreError> {
        let tsids = TsidCache::new(stores.tsids.list_all().await?);

        let mut groups = GroupRegistry::new(stores.groups.list_all().await?);
        groups.eval_all(&tsids);

        let mut comps = BTreeMap::new();
        for mut comp in stores.comps.list_enabled().await? {
            if comp.is_timed() {
                tracing::debug!(comp_id = %comp.id, "timed computation has no triggers");
                continue;
            }
            comp.resolve_concrete_keys(|unique_string| tsids.key_of(unique_string));
            comps.insert(comp.id, comp);
        }

        let depends = stores.depends.all().await?.into_iter().collect();

        Ok(Self {
            tsids,
            groups,
            comps,
            depends,
        })
    }

    /// Dependency records `comp` should have given the current catalog and
    /// group expansions.
    pub fn evaluate_computation(&self, comp: &DbComputation) -> BTreeSet<DependencyRecord> {
        if !comp.enabled || comp.is_timed() {
            return BTreeSet::new();
        }

        let Some(group_id) = comp.group_id else {
            return comp
                .inputs()
                .filter_map(|parm| {
                    parm.binding.concrete_key().or_else(|| {
                        parm.binding
                            .concrete_unique_string()
                            .and_then(|unique_string| self.tsids.key_of(unique_string))
                    })
                })
                .map(|ts_key| DependencyRecord::new(ts_key, comp.id))
                .collect();
        };

        let Some(members) = self.groups.expanded(group_id) else {
            tracing::warn!(
                comp_id = %comp.id,
                comp_name = %comp.name,
                group_id = %group_id,
                "computation refers to an unknown group, skipping"
            );
            return BTreeSet::new();
        };
        members
            .iter()
            .filter_map(|key| self.tsids.get(*key))
            .flat_map(|member| {
                comp.inputs()
                    .filter_map(|parm| template::bind_unique_string(parm, member))
                    .filter_map(|unique_string| self.tsids.key_of(&unique_string))
                    .collect::<Vec<TsKey>>()
            })
            .map(|ts_key| DependencyRecord::new(ts_key, comp.id))
            .collect()
    }

    pub fn evaluate_all(&self) -> BTreeSet<DependencyRecord> {
        self.comps
            .values()
            .flat_map(|comp| self.evaluate_computation(comp))
            .collect()
    }

    pub fn records_of(&self, comp_id: CompId) -> BTreeSet<DependencyRecord> {
        self.depends
            .iter()
            .filter(|record| record.comp_id == comp_id)
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        tsid::PARAM, CompParm, GroupDefinition, GroupId, ParmBinding, ParmTemplate, PartFilter,
        TimeSeriesIdentifier, TsGroup,
    };
    use pretty_assertions::assert_eq;

    fn snapshot(unique_strings: &[&str], groups: Vec<TsGroup>) -> Snapshot {
        let tsids = TsidCache::new(unique_strings.iter().enumerate().map(|(i, unique)| {
            TimeSeriesIdentifier::parse(TsKey(i as i64 + 1), unique).unwrap()
        }));
        let mut groups = GroupRegistry::new(groups);
        groups.eval_all(&tsids);
        Snapshot {
            tsids,
            groups,
            ..Default::default()
        }
    }

    fn records(pairs: &[(i64, i64)]) -> BTreeSet<DependencyRecord> {
        pairs
            .iter()
            .map(|(ts, comp)| DependencyRecord::new(TsKey(*ts), CompId(*comp)))
            .collect()
    }

    #[test]
    fn concrete_computation_depends_on_existing_inputs() {
        let snapshot = snapshot(&["Dam.Elev", "Dam.Flow"], vec![]);
        let comp = DbComputation::new(CompId(1), "sum", "Add")
            .with_parm(CompParm::input("a", ParmBinding::concrete("dam.elev")))
            .with_parm(CompParm::input("b", ParmBinding::concrete("Dam.Missing")))
            .with_parm(CompParm::output("out", ParmBinding::concrete("Dam.Flow")));

        assert_eq!(snapshot.evaluate_computation(&comp), records(&[(1, 1)]));
    }

    #[test]
    fn group_computation_depends_on_transformed_members() {
        let snapshot = snapshot(
            &["loc1.Elev", "loc2.Elev", "loc1.Flow", "loc3.Elev"],
            vec![TsGroup::new(
                GroupId(1),
                "elev",
                GroupDefinition {
                    filters: vec![PartFilter::new(PARAM, "Elev")],
                    ..Default::default()
                },
            )],
        );
        let comp = DbComputation::new(CompId(2), "rating", "Rating")
            .with_group(GroupId(1))
            .with_parm(CompParm::input(
                "flow",
                ParmBinding::template(ParmTemplate::default().with_part(PARAM, "Flow")),
            ));

        // Only loc1 has a matching flow series.
        assert_eq!(snapshot.evaluate_computation(&comp), records(&[(3, 2)]));
    }

    #[test]
    fn timed_and_orphaned_computations_have_no_records() {
        let snapshot = snapshot(&["Dam.Elev"], vec![]);
        let timed = DbComputation::new(CompId(1), "daily", "Average")
            .with_property("timedCompInterval", "1Day")
            .with_parm(CompParm::input("a", ParmBinding::concrete("Dam.Elev")));
        let orphan = DbComputation::new(CompId(2), "orphan", "Copy")
            .with_group(GroupId(404))
            .with_parm(CompParm::input(
                "a",
                ParmBinding::template(ParmTemplate::default()),
            ));

        assert!(snapshot.evaluate_computation(&timed).is_empty());
        assert!(snapshot.evaluate_computation(&orphan).is_empty());
    }
}
