//! Deterministic YAML dump.
//!
//! Mapping keys are sorted recursively and sequences are emitted in block
//! style, so two dumps of equal records are byte-identical. serde_yaml does
//! not wrap long scalars.

use serde::Serialize;
use serde_yaml::value::TaggedValue;
use serde_yaml::{Mapping, Value};

use crate::error::RecordError;

/// Serialize `value` with sorted keys.
pub fn dump<T: Serialize>(value: &T) -> Result<String, RecordError> {
    let value = serde_yaml::to_value(value)?;
    Ok(serde_yaml::to_string(&sorted(value))?)
}

fn sorted(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut entries: Vec<(Value, Value)> =
                map.into_iter().map(|(k, v)| (k, sorted(v))).collect();
            entries.sort_by(|(a, _), (b, _)| sort_key(a).cmp(&sort_key(b)));
            Value::Mapping(entries.into_iter().collect::<Mapping>())
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(sorted).collect()),
        Value::Tagged(tagged) => {
            let TaggedValue { tag, value } = *tagged;
            Value::Tagged(Box::new(TaggedValue {
                tag,
                value: sorted(value),
            }))
        }
        other => other,
    }
}

fn sort_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other).unwrap_or_default(),
    }
}
