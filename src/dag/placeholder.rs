// src/dag/placeholder.rs

//! `$N` / `${N}` placeholder references inside task argument payloads.
//!
//! Placeholders may appear in any string of the JSON payload, including
//! nested arrays and objects. A string that is exactly one placeholder is
//! replaced by the referenced result value as-is; a placeholder embedded in
//! a longer string is replaced by the result's textual form.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::dag::task::TaskId;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(\d+)\}|\$(\d+)").expect("placeholder regex is valid")
});

fn capture_id(caps: &Captures<'_>) -> Option<TaskId> {
    caps.get(1)
        .or_else(|| caps.get(2))
        .and_then(|m| m.as_str().parse().ok())
}

/// Every task id referenced by a placeholder anywhere in `args`.
pub fn references(args: &Value) -> BTreeSet<TaskId> {
    let mut out = BTreeSet::new();
    collect_references(args, &mut out);
    out
}

fn collect_references(value: &Value, out: &mut BTreeSet<TaskId>) {
    match value {
        Value::String(s) => {
            out.extend(PLACEHOLDER.captures_iter(s).filter_map(|c| capture_id(&c)));
        }
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect_references(v, out)),
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

/// Textual form of a result when spliced into a longer string.
pub fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute every placeholder in `args` using `lookup`.
///
/// Returns `Err(id)` naming the first referenced task whose result is not
/// available; no partially substituted payload is ever returned.
pub fn substitute<'a, F>(args: &Value, lookup: F) -> Result<Value, TaskId>
where
    F: Fn(TaskId) -> Option<&'a Value> + Copy,
{
    match args {
        Value::String(s) => substitute_str(s, lookup),
        Value::Array(items) => items
            .iter()
            .map(|v| substitute(v, lookup))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                out.insert(k.clone(), substitute(v, lookup)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_str<'a, F>(s: &str, lookup: F) -> Result<Value, TaskId>
where
    F: Fn(TaskId) -> Option<&'a Value>,
{
    // Whole-string placeholder keeps the result's JSON type.
    if let Some(caps) = PLACEHOLDER.captures(s) {
        let whole = caps.get(0).map(|m| m.as_str().len() == s.len()).unwrap_or(false);
        if whole {
            if let Some(id) = capture_id(&caps) {
                return lookup(id).cloned().ok_or(id);
            }
        }
    }

    let mut missing = None;
    let replaced = PLACEHOLDER.replace_all(s, |caps: &Captures<'_>| {
        let Some(id) = capture_id(caps) else {
            return caps[0].to_string();
        };
        match lookup(id) {
            Some(v) => as_text(v),
            None => {
                missing.get_or_insert(id);
                caps[0].to_string()
            }
        }
    });

    match missing {
        Some(id) => Err(id),
        None => Ok(Value::String(replaced.into_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn finds_references_in_nested_payloads() {
        let args = json!({
            "a": "$1 and ${2}",
            "b": ["x", {"c": "$10"}],
            "n": 3,
        });
        let refs: Vec<_> = references(&args).into_iter().collect();
        assert_eq!(refs, vec![1, 2, 10]);
    }

    #[test]
    fn plain_dollar_signs_are_not_references() {
        assert!(references(&json!("costs $ five, $x")).is_empty());
    }

    #[test]
    fn whole_string_placeholder_keeps_result_type() {
        let results: HashMap<TaskId, Value> = HashMap::from([(1, json!([1, 2, 3]))]);
        let out = substitute(&json!({"items": "$1"}), |id| results.get(&id)).unwrap();
        assert_eq!(out, json!({"items": [1, 2, 3]}));
    }

    #[test]
    fn embedded_placeholders_use_text_form() {
        let results: HashMap<TaskId, Value> =
            HashMap::from([(1, json!("alpha")), (2, json!({"k": 1}))]);
        let out = substitute(&json!("a=$1, b=${2}."), |id| results.get(&id)).unwrap();
        assert_eq!(out, json!("a=alpha, b={\"k\":1}."));
    }

    #[test]
    fn missing_result_is_reported() {
        let results: HashMap<TaskId, Value> = HashMap::from([(1, json!("x"))]);
        let err = substitute(&json!(["$1", "see $7"]), |id| results.get(&id)).unwrap_err();
        assert_eq!(err, 7);
    }
}
