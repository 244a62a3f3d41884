use crate::types::{tsid::normalize_unique_string, TimeSeriesIdentifier, TsKey};
use std::collections::{BTreeMap, HashMap};

/// In-memory view of the time series catalog, indexed by key and by
/// normalized unique string.
#[derive(Debug, Clone, Default)]
pub struct TsidCache {
    by_key: BTreeMap<TsKey, TimeSeriesIdentifier>,
    by_unique_string: HashMap<String, TsKey>,
}

impl TsidCache {
    pub fn new(tsids: impl IntoIterator<Item = TimeSeriesIdentifier>) -> Self {
        let mut cache = Self::default();
        for tsid in tsids {
            cache.insert(tsid);
        }
        cache
    }

    /// Inserts or replaces the entry with the same key.
    pub fn insert(&mut self, tsid: TimeSeriesIdentifier) {
        if let Some(previous) = self.by_key.get(&tsid.key) {
            self.by_unique_string
                .remove(&normalize_unique_string(previous.unique_string()));
        }
        self.by_unique_string
            .insert(normalize_unique_string(tsid.unique_string()), tsid.key);
        self.by_key.insert(tsid.key, tsid);
    }

    pub fn remove(&mut self, key: TsKey) -> Option<TimeSeriesIdentifier> {
        let removed = self.by_key.remove(&key)?;
        self.by_unique_string
            .remove(&normalize_unique_string(removed.unique_string()));
        Some(removed)
    }

    pub fn get(&self, key: TsKey) -> Option<&TimeSeriesIdentifier> {
        self.by_key.get(&key)
    }

    pub fn get_by_unique_string(&self, unique_string: &str) -> Option<&TimeSeriesIdentifier> {
        self.by_unique_string
            .get(&normalize_unique_string(unique_string))
            .and_then(|key| self.by_key.get(key))
    }

    pub fn key_of(&self, unique_string: &str) -> Option<TsKey> {
        self.by_unique_string
            .get(&normalize_unique_string(unique_string))
            .copied()
    }

    pub fn contains(&self, key: TsKey) -> bool {
        self.by_key.contains_key(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimeSeriesIdentifier> {
        self.by_key.values()
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tsid(key: i64, unique_string: &str) -> TimeSeriesIdentifier {
        TimeSeriesIdentifier::parse(TsKey(key), unique_string).unwrap()
    }

    #[test]
    fn lookup_by_unique_string_ignores_case() {
        let cache = TsidCache::new([tsid(1, "Dam.Elev"), tsid(2, "Dam.Flow")]);
        assert_eq!(cache.key_of("DAM.elev"), Some(TsKey(1)));
        assert_eq!(
            cache.get_by_unique_string("dam.flow").map(|t| t.key),
            Some(TsKey(2))
        );
        assert_eq!(cache.key_of("Dam.Stage"), None);
    }

    #[test]
    fn replace_and_remove_keep_indexes_in_sync() {
        let mut cache = TsidCache::new([tsid(1, "Dam.Elev")]);
        cache.insert(tsid(1, "Dam.Stage"));
        assert_eq!(cache.key_of("Dam.Elev"), None);
        assert_eq!(cache.key_of("Dam.Stage"), Some(TsKey(1)));

        assert!(cache.remove(TsKey(1)).is_some());
        assert!(cache.is_empty());
        assert_eq!(cache.key_of("Dam.Stage"), None);
    }
}
