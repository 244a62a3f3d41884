//! Binding of computation parms against a triggering time series.

use crate::types::{
    tsid::{is_known_part, DURATION, INTERVAL},
    CompParm, ParmBinding, TimeSeriesIdentifier, TsidParts,
};

const WILDCARD: char = '*';

/// Concrete identity a parm refers to when `trigger` fires it.
///
/// Concrete bindings are returned as they are. Template bindings start from
/// the trigger's parts, apply the parm's interval and duration, then the
/// template's own part values, where `*` is replaced by the trigger's value
/// of that part. Returns `None` when the template names an unknown part or
/// needs a part the trigger does not have.
pub fn bind(parm: &CompParm, trigger: &TimeSeriesIdentifier) -> Option<TsidParts> {
    let template = match &parm.binding {
        ParmBinding::Concrete { unique_string, .. } => return TsidParts::parse(unique_string),
        ParmBinding::Template(template) => template,
    };

    let mut parts = trigger.parts().clone();
    if let Some(interval) = &parm.interval {
        parts.set(INTERVAL, interval.as_str());
    }
    if let Some(duration) = &parm.duration {
        parts.set(DURATION, duration.as_str());
    }
    for (name, value) in &template.parts {
        if !is_known_part(name) {
            return None;
        }
        let value = if value.contains(WILDCARD) {
            let from_trigger = trigger.part(name)?;
            value.replace(WILDCARD, from_trigger)
        } else {
            value.clone()
        };
        parts.set(name, value);
    }
    Some(parts)
}

/// Unique string produced by [`bind`].
pub fn bind_unique_string(parm: &CompParm, trigger: &TimeSeriesIdentifier) -> Option<String> {
    bind(parm, trigger).map(|parts| parts.unique_string())
}
