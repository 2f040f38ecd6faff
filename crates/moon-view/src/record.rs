//! Records and dotted field paths.
//!
//! A record is a JSON object. Field names are dotted paths (`config.username`)
//! into nested objects; numeric segments (`labels.0.key`) index into arrays.

use serde_json::{Map, Value};

/// A structured record assembled by a form or returned by a collaborator.
pub type Record = Map<String, Value>;

/// Split a dotted path into its segments.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
}

/// Join a prefix and a name into a path.
#[must_use]
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

/// Read the value at `path`, if present.
#[must_use]
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = segments(path);
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Numeric segments index existing arrays; an index one past the end
/// appends. Returns `false` if the path crosses a scalar or an array index
/// that cannot be reached.
pub fn set_path(record: &mut Record, path: &str, value: Value) -> bool {
    let parts: Vec<&str> = segments(path).collect();
    let Some((last, parents)) = parts.split_last() else {
        return false;
    };
    let Some((first, rest)) = parents.split_first() else {
        record.insert((*last).to_string(), value);
        return true;
    };

    let mut current = record
        .entry((*first).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    for part in rest {
        current = match step_mut(current, part) {
            Some(next) => next,
            None => return false,
        };
    }

    match current {
        Value::Object(map) => {
            map.insert((*last).to_string(), value);
            true
        }
        Value::Array(items) => match last.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items[index] = value;
                true
            }
            Ok(index) if index == items.len() => {
                items.push(value);
                true
            }
            _ => false,
        },
        Value::Null => {
            let mut map = Map::new();
            map.insert((*last).to_string(), value);
            *current = Value::Object(map);
            true
        }
        _ => false,
    }
}

fn step_mut<'a>(current: &'a mut Value, part: &str) -> Option<&'a mut Value> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }
    match current {
        Value::Object(map) => Some(
            map.entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        ),
        Value::Array(items) => items.get_mut(part.parse::<usize>().ok()?),
        _ => None,
    }
}

/// Remove the value at `path`, returning it. Array entries are removed and
/// later entries shift down.
pub fn remove_path(record: &mut Record, path: &str) -> Option<Value> {
    let parts: Vec<&str> = segments(path).collect();
    let (last, parents) = parts.split_last()?;
    let Some((first, rest)) = parents.split_first() else {
        return record.remove(*last);
    };

    let mut current = record.get_mut(*first)?;
    for part in rest {
        current = match current {
            Value::Object(map) => map.get_mut(*part)?,
            Value::Array(items) => items.get_mut(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    match current {
        Value::Object(map) => map.remove(*last),
        Value::Array(items) => {
            let index = last.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}

/// Whether a value counts as "not filled in".
///
/// Null, blank strings, empty arrays and empty objects are blank; `0` and
/// `false` are values.
#[must_use]
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Overlay `patch` onto `base`, recursing into nested objects.
pub fn merge(base: &mut Record, patch: &Record) {
    for (key, value) in patch {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge(existing, incoming),
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => Record::new(),
        }
    }

    #[test]
    fn test_get_nested_and_indexed() {
        let r = record(json!({
            "config": {"username": "admin"},
            "labels": [{"key": "env", "value": "prod"}]
        }));

        assert_eq!(get_path(&r, "config.username"), Some(&json!("admin")));
        assert_eq!(get_path(&r, "labels.0.value"), Some(&json!("prod")));
        assert_eq!(get_path(&r, "labels.1.value"), None);
        assert_eq!(get_path(&r, "config.username.x"), None);
    }

    #[test]
    fn test_set_creates_intermediate_objects() {
        let mut r = Record::new();
        assert!(set_path(&mut r, "annotations.summary", json!("cpu high")));
        assert!(set_path(&mut r, "name", json!("s1")));

        assert_eq!(
            Value::Object(r),
            json!({"annotations": {"summary": "cpu high"}, "name": "s1"})
        );
    }

    #[test]
    fn test_set_into_array() {
        let mut r = record(json!({"labels": [{"key": "a"}]}));

        assert!(set_path(&mut r, "labels.0.key", json!("b")));
        assert!(set_path(&mut r, "labels.1", json!({"key": "c"})));
        assert!(!set_path(&mut r, "labels.5", json!({})));

        assert_eq!(
            Value::Object(r),
            json!({"labels": [{"key": "b"}, {"key": "c"}]})
        );
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut r = record(json!({"name": "x"}));
        assert!(!set_path(&mut r, "name.first", json!("y")));
    }

    #[test]
    fn test_remove_shifts_array_entries() {
        let mut r = record(json!({"labels": [{"key": "a"}, {"key": "b"}, {"key": "c"}]}));

        assert_eq!(remove_path(&mut r, "labels.1"), Some(json!({"key": "b"})));
        assert_eq!(get_path(&r, "labels.1.key"), Some(&json!("c")));
        assert_eq!(remove_path(&mut r, "labels.9"), None);
    }

    #[test]
    fn test_blank_semantics() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("  ")));
        assert!(is_blank(&json!([])));
        assert!(is_blank(&json!({})));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!(false)));
        assert!(!is_blank(&json!("x")));
    }

    #[test]
    fn test_merge_recurses() {
        let mut base = record(json!({"config": {"username": "a", "password": "p"}, "status": 1}));
        let patch = record(json!({"config": {"username": "b"}, "status": 2}));

        merge(&mut base, &patch);

        assert_eq!(
            Value::Object(base),
            json!({"config": {"username": "b", "password": "p"}, "status": 2})
        );
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "name"), "name");
        assert_eq!(join("labels.0", "key"), "labels.0.key");
    }
}
