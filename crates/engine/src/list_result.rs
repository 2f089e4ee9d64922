//! Collection-returning methods always hand back an array.

use serde_json::Value;

/// Lower-cased method name fragments that mark a collection result.
pub const LIST_METHOD_KEYWORDS: [&str; 9] = ["list", "find", "query", "search", "select", "batch", "byids", "bycodes", "infos"];

pub fn is_list_method(method: &str) -> bool {
    let method = method.to_lowercase();
    LIST_METHOD_KEYWORDS.iter().any(|keyword| method.contains(keyword))
}

/// Arrays pass through; a string holding JSON is parsed first; anything
/// else becomes a one-element array. Other methods are untouched.
pub fn normalize_list_result(method: &str, payload: Value) -> Value {
    if !is_list_method(method) {
        return payload;
    }
    match payload {
        Value::Array(_) => payload,
        Value::String(text) => match serde_json::from_str::<Value>(unquote(text.trim())) {
            Ok(items @ Value::Array(_)) => items,
            Ok(object @ Value::Object(_)) => Value::Array(vec![object]),
            _ => Value::Array(vec![Value::String(text)]),
        },
        other => Value::Array(vec![other]),
    }
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')).unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn recognizes_list_methods() {
        assert!(is_list_method("listUsers"));
        assert!(is_list_method("getUsersByIds"));
        assert!(is_list_method("queryOrderInfos"));
        assert!(!is_list_method("getUser"));
    }

    #[test]
    fn wraps_and_unquotes() {
        assert_eq!(normalize_list_result("findAll", json!([1, 2])), json!([1, 2]));
        assert_eq!(normalize_list_result("findAll", json!(r#"[{"a":1}]"#)), json!([{"a": 1}]));
        assert_eq!(normalize_list_result("findOne", json!(r#"{"a":1}"#)), json!([{"a": 1}]));
        assert_eq!(normalize_list_result("search", json!({"a": 1})), json!([{"a": 1}]));
        assert_eq!(normalize_list_result("search", json!("plain")), json!(["plain"]));
        assert_eq!(normalize_list_result("getUser", json!({"a": 1})), json!({"a": 1}));
    }
}
