//! Dotted-path access and deep merging on JSON values.
//!
//! Paths look like `options.filters[2].name` or `options.filters.2.name`.

use serde_json::{Map, Value};

/// Split a path into keys. `a.b[0].c` and `a.b.0.c` are equivalent.
fn segments(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read the value at `path`. An empty path is the value itself.
pub fn get_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    segments(path).iter().try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `new_value` at `path` inside an object, creating intermediate
/// objects as needed. Non-object intermediates are replaced.
pub fn set_path(target: &mut Map<String, Value>, path: &str, new_value: Value) {
    let keys = segments(path);
    let Some((last, parents)) = keys.split_last() else {
        return;
    };

    let mut current = target;
    for key in parents {
        let slot = current
            .entry(key.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(last.clone(), new_value);
}

/// Recursively merge `source` into `target`. Objects merge key by key;
/// anything else in `source` replaces the target value.
pub fn deep_merge(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(into), Value::Object(from)) => merge_maps(into, from),
        (slot, other) => *slot = other,
    }
}

/// [`deep_merge`] for two maps.
pub fn merge_maps(into: &mut Map<String, Value>, from: Map<String, Value>) {
    for (key, value) in from {
        match into.get_mut(&key) {
            Some(existing) => deep_merge(existing, value),
            None => {
                into.insert(key, value);
            }
        }
    }
}
