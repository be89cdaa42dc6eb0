//! RFC-6901 change summary (§4.2 "Change summary").
//!
//! Compares old vs new property maps at the top level only. A nested object
//! that changes is reported as a single `updated` entry at its top-level
//! key, not recursed into -- §4.2 is explicit that the comparison is
//! top-level only.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canon::canonical_eq;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Update {
    pub from: Value,
    pub to: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeSummaryMeta {
    pub added: usize,
    pub removed: usize,
    pub updated: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeSummary {
    /// `/key -> new_value`
    pub added: BTreeMap<String, Value>,
    /// `/key` sequence
    pub removed: Vec<String>,
    /// `/key -> {from, to}`
    pub updated: BTreeMap<String, Update>,
    /// union of all touched paths, sorted
    pub paths: Vec<String>,
    pub meta: ChangeSummaryMeta,
}

fn pointer(key: &str) -> String {
    // RFC-6901 escaping for `~` and `/` inside the key itself.
    format!("/{}", key.replace('~', "~0").replace('/', "~1"))
}

/// Builds the change summary between an old and new top-level property map.
/// Returns `None` when `added`, `removed`, and `updated` are all empty (no
/// effective change).
pub fn change_summary(
    old: Option<&Map<String, Value>>,
    new: Option<&Map<String, Value>>,
) -> Option<ChangeSummary> {
    let empty = Map::new();
    let old = old.unwrap_or(&empty);
    let new = new.unwrap_or(&empty);

    let mut added = BTreeMap::new();
    let mut removed = Vec::new();
    let mut updated = BTreeMap::new();

    for (key, new_val) in new.iter() {
        match old.get(key) {
            None => {
                added.insert(pointer(key), new_val.clone());
            }
            Some(old_val) => {
                if !canonical_eq(old_val, new_val) {
                    updated.insert(pointer(key), Update { from: old_val.clone(), to: new_val.clone() });
                }
            }
        }
    }
    for key in old.keys() {
        if !new.contains_key(key) {
            removed.push(pointer(key));
        }
    }

    if added.is_empty() && removed.is_empty() && updated.is_empty() {
        return None;
    }

    removed.sort();
    let mut paths: Vec<String> = added
        .keys()
        .cloned()
        .chain(removed.iter().cloned())
        .chain(updated.keys().cloned())
        .collect();
    paths.sort();
    paths.dedup();

    let meta = ChangeSummaryMeta { added: added.len(), removed: removed.len(), updated: updated.len() };

    Some(ChangeSummary { added, removed, updated, paths, meta })
}

/// The set of top-level property paths touched between two maps, used by the
/// merge analyser (§4.5) to detect overlapping edits. Unlike
/// `change_summary`, this does not distinguish added/removed/updated -- the
/// analyser only needs the path set for overlap detection.
pub fn touched_paths(old: Option<&Map<String, Value>>, new: Option<&Map<String, Value>>) -> Vec<String> {
    change_summary(old, new)
        .map(|s| s.paths)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn e1_scenario() {
        let old = json!({"name": "Alice", "age": 30}).as_object().unwrap().clone();
        let new = json!({"name": "Alice", "age": 31, "nickname": "Ali"}).as_object().unwrap().clone();
        let summary = change_summary(Some(&old), Some(&new)).unwrap();
        assert_eq!(summary.added.get("/nickname"), Some(&json!("Ali")));
        assert_eq!(
            summary.updated.get("/age"),
            Some(&Update { from: json!(30), to: json!(31) })
        );
        assert!(summary.removed.is_empty());
    }

    #[test]
    fn no_change_returns_none() {
        let old = json!({"a": 1}).as_object().unwrap().clone();
        let new = json!({"a": 1}).as_object().unwrap().clone();
        assert!(change_summary(Some(&old), Some(&new)).is_none());
    }

    #[test]
    fn removed_keys_are_reported() {
        let old = json!({"a": 1, "b": 2}).as_object().unwrap().clone();
        let new = json!({"a": 1}).as_object().unwrap().clone();
        let summary = change_summary(Some(&old), Some(&new)).unwrap();
        assert_eq!(summary.removed, vec!["/b".to_string()]);
    }

    #[test]
    fn nested_object_change_is_reported_at_top_level_only() {
        let old = json!({"b": {"c": "x"}}).as_object().unwrap().clone();
        let new = json!({"b": {"c": "y"}}).as_object().unwrap().clone();
        let summary = change_summary(Some(&old), Some(&new)).unwrap();
        assert!(summary.updated.contains_key("/b"));
        assert_eq!(summary.paths, vec!["/b".to_string()]);
    }

    #[test]
    fn pointer_escapes_tilde_and_slash() {
        let old = Map::new();
        let mut new = Map::new();
        new.insert("a/b~c".to_string(), json!(1));
        let summary = change_summary(Some(&old), Some(&new)).unwrap();
        assert!(summary.added.contains_key("/a~1b~0c"));
    }
}
