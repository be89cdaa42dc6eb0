//! Property-predicate filters for `list_head_objects`/`count_head_objects`
//! (§4.1). These are evaluated against an object's `properties` map using a
//! dotted path (`b.c` addresses `{"b": {"c": ...}}`).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Exists,
    In,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyFilter {
    pub path: String,
    pub op: Operator,
    #[serde(default)]
    pub value: Value,
}

fn resolve_path<'a>(properties: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut current = properties.get(path.split('.').next()?)?;
    let mut segments = path.split('.');
    segments.next();
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let a = a.as_f64()?;
    let b = b.as_f64()?;
    a.partial_cmp(&b)
}

impl PropertyFilter {
    pub fn matches(&self, properties: &Map<String, Value>) -> bool {
        let found = resolve_path(properties, &self.path);
        match self.op {
            Operator::Exists => found.is_some() && !matches!(found, Some(Value::Null)),
            Operator::Eq => found.map(|v| v == &self.value).unwrap_or(false),
            Operator::Neq => found.map(|v| v != &self.value).unwrap_or(true),
            Operator::Gt => found
                .and_then(|v| numeric_cmp(v, &self.value))
                .is_some_and(|o| o.is_gt()),
            Operator::Gte => found
                .and_then(|v| numeric_cmp(v, &self.value))
                .is_some_and(|o| o.is_ge()),
            Operator::Lt => found
                .and_then(|v| numeric_cmp(v, &self.value))
                .is_some_and(|o| o.is_lt()),
            Operator::Lte => found
                .and_then(|v| numeric_cmp(v, &self.value))
                .is_some_and(|o| o.is_le()),
            Operator::Contains => match (found, self.value.as_str()) {
                (Some(Value::String(haystack)), Some(needle)) => {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                }
                _ => false,
            },
            Operator::In => match self.value.as_array() {
                Some(candidates) => found.is_some_and(|v| candidates.contains(v)),
                None => false,
            },
        }
    }
}

/// Evaluates a conjunction of property filters (AND semantics), as used by
/// `list_head_objects`'s "sequence of JSON-pointer property predicates".
pub fn matches_all(filters: &[PropertyFilter], properties: &Map<String, Value>) -> bool {
    filters.iter().all(|f| f.matches(properties))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn props() -> Map<String, Value> {
        json!({"a": 1, "b": {"c": "Hello World"}}).as_object().unwrap().clone()
    }

    #[rstest]
    #[case("a", Operator::Eq, json!(1), true)]
    #[case("a", Operator::Neq, json!(1), false)]
    #[case("a", Operator::Gt, json!(0), true)]
    #[case("a", Operator::Gte, json!(1), true)]
    #[case("a", Operator::Lt, json!(2), true)]
    #[case("a", Operator::Lte, json!(1), true)]
    #[case("a", Operator::Exists, json!(null), true)]
    #[case("missing", Operator::Exists, json!(null), false)]
    #[case("b.c", Operator::Contains, json!("world"), true)]
    #[case("b.c", Operator::Contains, json!("xyz"), false)]
    #[case("a", Operator::In, json!([1, 2, 3]), true)]
    #[case("a", Operator::In, json!([4, 5]), false)]
    fn property_filter_matrix(
        #[case] path: &str,
        #[case] op: Operator,
        #[case] value: Value,
        #[case] expected: bool,
    ) {
        let filter = PropertyFilter { path: path.to_string(), op, value };
        assert_eq!(filter.matches(&props()), expected);
    }

    #[test]
    fn property_filter_round_trip_from_spec() {
        let properties = json!({"a": 1, "b": {"c": "x"}}).as_object().unwrap().clone();
        assert!(matches_all(
            &[PropertyFilter { path: "a".into(), op: Operator::Eq, value: json!(1) }],
            &properties
        ));
        assert!(matches_all(
            &[PropertyFilter { path: "b.c".into(), op: Operator::Contains, value: json!("x") }],
            &properties
        ));
        assert!(!matches_all(
            &[PropertyFilter { path: "a".into(), op: Operator::Neq, value: json!(1) }],
            &properties
        ));
    }
}
