//! # Merge Patches
//!
//! JSON merge patch (RFC 7386) construction and application.

use serde::Serialize;
use serde_json::{Map, Value};

/// Main-resource and status patches between two versions of an object
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDiff {
    /// Patch for everything except `status`
    pub main: Value,
    /// Patch of the form `{"status": ...}`, or `{}` when status is unchanged
    pub status: Value,
}

/// Compute the merge patch that turns `original` into `modified`
///
/// Removed keys become `null`; arrays and scalars are replaced wholesale.
pub fn merge_diff(original: &Value, modified: &Value) -> Value {
    match (original, modified) {
        (Value::Object(original), Value::Object(modified)) => {
            let mut patch = Map::new();
            for (key, old) in original {
                match modified.get(key) {
                    None => {
                        patch.insert(key.clone(), Value::Null);
                    }
                    Some(new) if new != old => {
                        patch.insert(key.clone(), merge_diff(old, new));
                    }
                    Some(_) => {}
                }
            }
            for (key, new) in modified {
                if !original.contains_key(key) {
                    patch.insert(key.clone(), new.clone());
                }
            }
            Value::Object(patch)
        }
        _ => modified.clone(),
    }
}

/// Apply a merge patch in place
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch) = patch else {
        *target = patch.clone();
        return;
    };
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(target) = target {
        for (key, value) in patch {
            if value.is_null() {
                target.remove(key);
            } else {
                apply_merge_patch(target.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}

/// Whether a patch is a no-op
pub fn is_empty(patch: &Value) -> bool {
    patch.as_object().is_some_and(Map::is_empty)
}

/// Split the difference between two versions of an object into main and status patches
pub fn object_diff<K: Serialize>(original: &K, modified: &K) -> Result<ObjectDiff, serde_json::Error> {
    let mut original = serde_json::to_value(original)?;
    let mut modified = serde_json::to_value(modified)?;

    let original_status = take_status(&mut original);
    let modified_status = take_status(&mut modified);

    let status = if original_status == modified_status {
        Value::Object(Map::new())
    } else {
        serde_json::json!({ "status": merge_diff(&original_status, &modified_status) })
    };

    Ok(ObjectDiff {
        main: merge_diff(&original, &modified),
        status,
    })
}

/// Add a `metadata.resourceVersion` precondition to a non-empty patch
pub fn with_resource_version(mut patch: Value, resource_version: Option<&str>) -> Value {
    let (Some(resource_version), Value::Object(map)) = (resource_version, &mut patch) else {
        return patch;
    };
    if map.is_empty() {
        return patch;
    }
    let metadata = map
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(metadata) = metadata {
        metadata.insert(
            "resourceVersion".to_string(),
            Value::String(resource_version.to_string()),
        );
    }
    patch
}

fn take_status(value: &mut Value) -> Value {
    value
        .as_object_mut()
        .and_then(|map| map.remove("status"))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_diff_only_contains_changes() {
        let original = json!({"a": 1, "b": {"c": 2, "d": 3}});
        let modified = json!({"a": 1, "b": {"c": 2, "d": 4}});
        assert_eq!(merge_diff(&original, &modified), json!({"b": {"d": 4}}));
    }

    #[test]
    fn test_merge_diff_nulls_removed_keys() {
        let original = json!({"a": 1, "b": 2});
        let modified = json!({"a": 1});
        assert_eq!(merge_diff(&original, &modified), json!({"b": null}));
    }

    #[test]
    fn test_merge_diff_replaces_arrays() {
        let original = json!({"finalizers": ["a", "b"]});
        let modified = json!({"finalizers": ["a"]});
        assert_eq!(merge_diff(&original, &modified), json!({"finalizers": ["a"]}));
    }

    #[test]
    fn test_apply_merge_patch_reverses_diff() {
        let original = json!({"a": 1, "b": {"c": 2, "d": 3}, "e": [1, 2]});
        let modified = json!({"b": {"c": 5}, "e": [3], "f": "new"});
        let mut target = original.clone();
        apply_merge_patch(&mut target, &merge_diff(&original, &modified));
        assert_eq!(target, modified);
    }

    #[test]
    fn test_object_diff_splits_status() {
        let original = json!({"metadata": {"name": "x"}, "spec": {"a": 1}, "status": {"s": 1}});
        let modified = json!({"metadata": {"name": "x"}, "spec": {"a": 1}, "status": {"s": 2}});
        let diff = object_diff(&original, &modified).unwrap();

        assert!(is_empty(&diff.main));
        assert_eq!(diff.status, json!({"status": {"s": 2}}));
    }

    #[test]
    fn test_with_resource_version_skips_empty_patch() {
        assert_eq!(with_resource_version(json!({}), Some("7")), json!({}));
        assert_eq!(
            with_resource_version(json!({"spec": {"a": 1}}), Some("7")),
            json!({"spec": {"a": 1}, "metadata": {"resourceVersion": "7"}})
        );
    }
}
