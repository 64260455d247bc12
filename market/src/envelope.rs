use serde_json::Value;

/// The backend wraps payloads in a varying number of `data` envelopes
/// depending on the handler (`data.data.listings`, `data.listings`, bare
/// payload). This is the single place that knows about the wrapping;
/// downstream code never branches on response shape.
pub fn unwrap_data(value: &Value) -> &Value {
    let mut current = value;
    while let Some(inner) = current.get("data") {
        current = inner;
    }
    current
}

/// Unwrap the envelope and pick a named collection if the payload is an
/// object carrying one, else return the payload itself (some handlers
/// return the bare array).
pub fn collection<'a>(value: &'a Value, name: &str) -> &'a Value {
    let data = unwrap_data(value);
    match data.get(name) {
        Some(named) => named,
        None => data,
    }
}

/// Server-provided message for 4xx responses, when present.
pub fn error_message(value: &Value) -> Option<String> {
    for key in ["message", "error", "detail"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            return Some(text.to_string());
        }
    }
    unwrap_data(value)
        .get("message")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unwraps_double_envelope() {
        let v = json!({"data": {"data": {"listings": [1, 2]}}});
        assert_eq!(collection(&v, "listings"), &json!([1, 2]));
    }

    #[test]
    fn unwraps_single_envelope() {
        let v = json!({"data": {"listings": [3]}});
        assert_eq!(collection(&v, "listings"), &json!([3]));
    }

    #[test]
    fn passes_bare_payload_through() {
        let v = json!({"listings": [4]});
        assert_eq!(collection(&v, "listings"), &json!([4]));

        let bare = json!([5, 6]);
        assert_eq!(collection(&bare, "listings"), &json!([5, 6]));
    }

    #[test]
    fn error_message_prefers_top_level() {
        let v = json!({"message": "bid too low"});
        assert_eq!(error_message(&v).as_deref(), Some("bid too low"));

        let nested = json!({"data": {"message": "nope"}});
        assert_eq!(error_message(&nested).as_deref(), Some("nope"));

        assert_eq!(error_message(&json!({"ok": true})), None);
    }
}
