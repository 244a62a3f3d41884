use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// Separator between the parts of a time series unique string.
pub const PART_SEPARATOR: char = '.';

/// Separator between the base and the sub component of a single part
/// (e.g. `Dam-Spillway` has base `Dam` and sub `Spillway`).
pub const SUB_PART_SEPARATOR: char = '-';

pub const LOCATION: &str = "location";
pub const PARAM: &str = "param";
pub const PARAM_TYPE: &str = "param_type";
pub const INTERVAL: &str = "interval";
pub const DURATION: &str = "duration";
pub const VERSION: &str = "version";

/// Canonical order of the parts of a unique string.
pub const TSID_PARTS: [&str; 6] = [LOCATION, PARAM, PARAM_TYPE, INTERVAL, DURATION, VERSION];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TsKey(pub i64);

impl fmt::Display for TsKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub i64);

/// Named parts of a time series identifier, always kept in canonical order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TsidParts(BTreeMap<String, String>);

impl TsidParts {
    /// Splits a unique string positionally over [`TSID_PARTS`].
    /// Returns `None` if it has more parts than known or any positional
    /// part is empty.
    pub fn parse(unique_string: &str) -> Option<Self> {
        let values: Vec<&str> = unique_string.split(PART_SEPARATOR).collect();
        if values.len() > TSID_PARTS.len() || values.iter().any(|value| value.is_empty()) {
            return None;
        }
        let parts = TSID_PARTS
            .iter()
            .zip(values)
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        Some(Self(parts))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Returns `false` if `name` is not one of [`TSID_PARTS`].
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> bool {
        if !is_known_part(name) {
            return false;
        }
        self.0.insert(name.to_string(), value.into());
        true
    }

    pub fn unique_string(&self) -> String {
        TSID_PARTS
            .iter()
            .filter_map(|name| self.get(name))
            .collect::<Vec<_>>()
            .join(&PART_SEPARATOR.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn is_known_part(name: &str) -> bool {
    TSID_PARTS.contains(&name)
}

/// Text before the first [`SUB_PART_SEPARATOR`].
pub fn base_of(value: &str) -> &str {
    value
        .split_once(SUB_PART_SEPARATOR)
        .map_or(value, |(base, _)| base)
}

/// Text after the first [`SUB_PART_SEPARATOR`], if any.
pub fn sub_of(value: &str) -> Option<&str> {
    value.split_once(SUB_PART_SEPARATOR).map(|(_, sub)| sub)
}

/// Lookup key for unique strings, which compare case-insensitively.
pub fn normalize_unique_string(unique_string: &str) -> String {
    unique_string.to_lowercase()
}

/// A catalog entry of one time series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeSeriesIdentifier {
    pub key: TsKey,
    pub site_id: Option<SiteId>,
    pub storage_units: Option<String>,
    parts: TsidParts,
    unique_string: String,
}

impl TimeSeriesIdentifier {
    pub fn new(key: TsKey, parts: TsidParts) -> Self {
        let unique_string = parts.unique_string();
        Self {
            key,
            site_id: None,
            storage_units: None,
            parts,
            unique_string,
        }
    }

    pub fn parse(key: TsKey, unique_string: &str) -> Option<Self> {
        TsidParts::parse(unique_string).map(|parts| Self::new(key, parts))
    }

    pub fn with_site(mut self, site_id: SiteId) -> Self {
        self.site_id = Some(site_id);
        self
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.storage_units = Some(units.into());
        self
    }

    pub fn unique_string(&self) -> &str {
        &self.unique_string
    }

    pub fn parts(&self) -> &TsidParts {
        &self.parts
    }

    pub fn part(&self, name: &str) -> Option<&str> {
        self.parts.get(name)
    }

    pub fn same_unique_string(&self, other: &str) -> bool {
        self.unique_string.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for TimeSeriesIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.unique_string, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn parse_assigns_parts_positionally() {
        let tsid = TimeSeriesIdentifier::parse(TsKey(1), "Dam-Spillway.Flow.Inst.1Hour").unwrap();
        assert_eq!(tsid.part(LOCATION), Some("Dam-Spillway"));
        assert_eq!(tsid.part(PARAM), Some("Flow"));
        assert_eq!(tsid.part(INTERVAL), Some("1Hour"));
        assert_eq!(tsid.part(VERSION), None);
        assert_eq!(tsid.unique_string(), "Dam-Spillway.Flow.Inst.1Hour");
    }

    #[rstest]
    #[case::too_many_parts("a.b.c.d.e.f.g")]
    #[case::empty("")]
    #[case::empty_middle_part("Dam..Inst")]
    #[case::leading_separator(".Elev")]
    #[case::trailing_separator("Dam.Elev.")]
    fn parse_rejects_malformed_unique_strings(#[case] unique_string: &str) {
        assert_eq!(TsidParts::parse(unique_string), None);
    }

    #[test]
    fn parts_keep_their_positions() {
        let parts = TsidParts::parse("Dam.Elev.Inst").unwrap();
        assert_eq!(parts.get(PARAM_TYPE), Some("Inst"));
        assert_eq!(parts.get(INTERVAL), None);
    }

    #[test]
    fn base_and_sub_parts() {
        assert_eq!(base_of("Dam-Spillway-Gate1"), "Dam");
        assert_eq!(sub_of("Dam-Spillway-Gate1"), Some("Spillway-Gate1"));
        assert_eq!(base_of("Dam"), "Dam");
        assert_eq!(sub_of("Dam"), None);
    }

    #[test]
    fn unknown_part_is_not_set() {
        let mut parts = TsidParts::default();
        assert!(!parts.set("color", "red"));
        assert!(parts.set(PARAM, "Stage"));
        assert_eq!(parts.unique_string(), "Stage");
    }
}
