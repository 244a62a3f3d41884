use crate::types::{
    tsid::{base_of, sub_of, LOCATION},
    PartFilter, PartScope, SiteId, TimeSeriesIdentifier,
};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

const WILDCARD: char = '*';
const WILDCARD_REGEX: &str = "[^-]+";

#[derive(Debug, Clone)]
struct CompiledFilter {
    scope: PartScope,
    regex: Regex,
}

impl CompiledFilter {
    fn compile(filter: &PartFilter) -> Result<Self, regex::Error> {
        let body = filter
            .pattern
            .to_uppercase()
            .split(WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(WILDCARD_REGEX);
        Ok(Self {
            scope: filter.scope,
            regex: Regex::new(&format!("^{body}$"))?,
        })
    }

    fn is_match(&self, value: &str) -> bool {
        let scoped = match self.scope {
            PartScope::Full => Some(value),
            PartScope::Base => Some(base_of(value)),
            PartScope::Sub => sub_of(value),
        };
        scoped.is_some_and(|scoped| self.regex.is_match(&scoped.to_uppercase()))
    }
}

/// Part-value predicates of one group. Filters are grouped into categories
/// by part name; a TSID passes when every category has a matching filter.
/// Sites belong to the `location` category.
#[derive(Debug, Clone, Default)]
pub struct GroupFilters {
    categories: BTreeMap<String, Vec<CompiledFilter>>,
    sites: BTreeSet<SiteId>,
}

impl GroupFilters {
    pub fn compile(filters: &[PartFilter], sites: &[SiteId]) -> Result<Self, regex::Error> {
        let mut categories: BTreeMap<String, Vec<CompiledFilter>> = BTreeMap::new();
        for filter in filters {
            categories
                .entry(filter.part.clone())
                .or_default()
                .push(CompiledFilter::compile(filter)?);
        }
        Ok(Self {
            categories,
            sites: sites.iter().copied().collect(),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.sites.is_empty()
    }

    pub fn matches(&self, tsid: &TimeSeriesIdentifier) -> bool {
        if self.is_empty() {
            return false;
        }
        if !self.sites.is_empty() && !self.categories.contains_key(LOCATION) {
            let site_matches = tsid.site_id.is_some_and(|site| self.sites.contains(&site));
            if !site_matches {
                return false;
            }
        }
        self.categories.iter().all(|(part, filters)| {
            let value = tsid.part(part);
            let filter_matches =
                value.is_some_and(|value| filters.iter().any(|filter| filter.is_match(value)));
            let site_matches = part == LOCATION
                && tsid.site_id.is_some_and(|site| self.sites.contains(&site));
            filter_matches || site_matches
        })
    }
}
