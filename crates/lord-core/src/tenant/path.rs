use serde_json::Value;

/// Resolve a dotted path inside `value` to a scalar rendered as a string.
///
/// Keys match exactly, then lower-cased. Numeric segments index arrays.
/// `*` tries the rest of the path against every element of an array or
/// object, depth first; the first hit wins. Missing keys, non-scalar
/// leaves and empty strings yield `None`. An empty path never matches.
pub fn find_by_path<S: AsRef<str>>(value: &Value, path: &[S]) -> Option<String> {
    if path.is_empty() {
        return None;
    }
    walk(value, path)
}

fn walk<S: AsRef<str>>(value: &Value, path: &[S]) -> Option<String> {
    let Some((head, rest)) = path.split_first() else {
        return scalar(value);
    };
    let head = head.as_ref();

    if head == "*" {
        return match value {
            Value::Array(items) => items.iter().find_map(|v| walk(v, rest)),
            Value::Object(map) => map.values().find_map(|v| walk(v, rest)),
            _ => None,
        };
    }

    let next = match value {
        Value::Object(map) => map
            .get(head)
            .or_else(|| map.get(&head.to_lowercase())),
        Value::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }?;
    walk(next, rest)
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn find(value: &Value, path: &str) -> Option<String> {
        let parts: Vec<&str> = path.split('.').collect();
        find_by_path(value, &parts)
    }

    #[test]
    fn wildcard_takes_first_match() {
        let v = json!({"a": [{"b": 1}, {"b": 2}]});
        assert_eq!(find(&v, "a.*.b").as_deref(), Some("1"));

        let v = json!({"a": [{"c": 1}, {"b": "second"}]});
        assert_eq!(find(&v, "a.*.b").as_deref(), Some("second"));

        let v = json!({"org": {"x": {"tenant_id": "t9"}}});
        assert_eq!(find(&v, "org.*.tenant_id").as_deref(), Some("t9"));
    }

    #[test]
    fn numeric_segments_index_arrays() {
        let v = json!({"orgs": ["first", "second"]});
        assert_eq!(find(&v, "orgs.1").as_deref(), Some("second"));
        assert_eq!(find(&v, "orgs.5"), None);
        assert_eq!(find(&v, "orgs.x"), None);
    }

    #[test]
    fn keys_fall_back_to_lower_case() {
        let v = json!({"tenant-id": "acme"});
        assert_eq!(find(&v, "TENANT-ID").as_deref(), Some("acme"));
    }

    #[test]
    fn only_scalar_leaves_match() {
        let v = json!({"a": {"b": [1]}, "flag": true, "empty": "", "nothing": null});
        assert_eq!(find(&v, "a"), None);
        assert_eq!(find(&v, "a.b"), None);
        assert_eq!(find(&v, "flag").as_deref(), Some("true"));
        assert_eq!(find(&v, "empty"), None);
        assert_eq!(find(&v, "nothing"), None);
        assert_eq!(find(&v, "a.missing"), None);
    }

    #[test]
    fn empty_path_never_matches() {
        let empty: [&str; 0] = [];
        assert_eq!(find_by_path(&json!("acme"), &empty), None);
    }
}
