//! Response envelope probing.
//!
//! Endpoints wrap their arrays under different keys (`results`, `data`,
//! `patients`, ...). Rather than trusting one schema, callers probe a small
//! fixed list of known keys in order.

use serde_json::Value;

use crate::models::Record;

/// Generic keys probed after the endpoint-specific ones.
pub const COMMON_KEYS: &[&str] = &["results", "data", "items"];

/// Pull the record array out of `body`.
///
/// A bare array is returned as-is. Otherwise `keys` then `COMMON_KEYS` are
/// probed; a `data` object is searched one level deeper. A body with no
/// recognizable array is a graceful empty result.
pub fn extract_records(body: &Value, keys: &[&str]) -> Vec<Record> {
    find_array(body, keys, true).cloned().unwrap_or_default()
}

fn find_array<'a>(body: &'a Value, keys: &[&str], descend: bool) -> Option<&'a Vec<Value>> {
    if let Value::Array(items) = body {
        return Some(items);
    }
    let object = body.as_object()?;

    for key in keys.iter().chain(COMMON_KEYS) {
        if let Some(Value::Array(items)) = object.get(*key) {
            return Some(items);
        }
    }

    if descend {
        if let Some(inner @ Value::Object(_)) = object.get("data") {
            return find_array(inner, keys, false);
        }
    }
    None
}

/// Pull a single record out of a create/update response, which some
/// endpoints wrap under `data`.
pub fn extract_record(body: &Value) -> Record {
    match body.get("data") {
        Some(inner @ Value::Object(_)) => inner.clone(),
        _ => body.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_array() {
        let body = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(extract_records(&body, &[]).len(), 2);
    }

    #[test]
    fn test_specific_key_wins_over_common() {
        let body = json!({"visits": [{"id": 1}], "results": [{"id": 2}, {"id": 3}]});
        let records = extract_records(&body, &["visits"]);
        assert_eq!(records, vec![json!({"id": 1})]);
    }

    #[test]
    fn test_common_key_and_nested_data() {
        assert_eq!(extract_records(&json!({"results": [1, 2, 3]}), &["patients"]).len(), 3);
        assert_eq!(extract_records(&json!({"data": {"sales": [1]}}), &["sales"]).len(), 1);
    }

    #[test]
    fn test_unknown_shape_is_empty() {
        assert!(extract_records(&json!({"count": 0}), &["patients"]).is_empty());
        assert!(extract_records(&Value::Null, &["patients"]).is_empty());
        assert!(extract_records(&json!({"results": "nope"}), &[]).is_empty());
    }

    #[test]
    fn test_extract_record_unwraps_data() {
        assert_eq!(extract_record(&json!({"data": {"id": 7}})), json!({"id": 7}));
        assert_eq!(extract_record(&json!({"id": 7})), json!({"id": 7}));
    }
}
