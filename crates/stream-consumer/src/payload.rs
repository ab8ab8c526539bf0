//! Payload normalization.
//!
//! Producers have published payloads as structured maps, as JSON
//! strings, and as informal `{key: value, ...}` strings. All three
//! shapes normalize to the same field mapping.

use std::collections::HashMap;

use common::RecordId;
use serde_json::Value;

use crate::error::PipelineError;

/// Turns an opaque payload value into a field mapping.
///
/// Structured objects pass through unchanged. Strings are tried as
/// JSON first, then as brace-stripped, comma-separated `key:value`
/// pairs; fragments without a colon are skipped rather than failing
/// the whole parse. Fails only when the payload is absent or neither
/// strategy yields a single usable pair.
pub fn parse_payload(
    record_id: RecordId,
    payload: Option<&Value>,
) -> Result<HashMap<String, Value>, PipelineError> {
    let Some(payload) = payload else {
        return Err(PipelineError::Parse {
            record_id,
            reason: "payload field missing".to_string(),
        });
    };

    if let Value::Object(map) = payload {
        return Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    }

    let text = match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&text) {
        return Ok(map.into_iter().collect());
    }

    tracing::debug!(%record_id, "JSON parse failed, trying delimited fallback");
    let fallback = parse_delimited_pairs(&text);
    if fallback.is_empty() {
        Err(PipelineError::Parse {
            record_id,
            reason: format!("payload not parseable: {text}"),
        })
    } else {
        Ok(fallback)
    }
}

/// Permissive parse of `{a: 1, b: 2}`-style strings.
fn parse_delimited_pairs(text: &str) -> HashMap<String, Value> {
    let cleaned = text.replace(['{', '}'], "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return HashMap::new();
    }

    let mut map = HashMap::new();
    for pair in cleaned.split(',') {
        if let Some((key, value)) = pair.split_once(':') {
            map.insert(
                key.trim().to_string(),
                Value::String(value.trim().to_string()),
            );
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_id() -> RecordId {
        RecordId::new(1_700_000_000_000, 0)
    }

    #[test]
    fn structured_object_passes_through() {
        let payload = json!({"status": "NEW", "orderId": "o1"});
        let map = parse_payload(record_id(), Some(&payload)).unwrap();
        assert_eq!(map["status"], json!("NEW"));
        assert_eq!(map["orderId"], json!("o1"));
    }

    #[test]
    fn json_string_is_deserialized() {
        let payload = Value::String(r#"{"status": "NEW", "orderId": "o1"}"#.to_string());
        let map = parse_payload(record_id(), Some(&payload)).unwrap();
        assert_eq!(map["status"], json!("NEW"));
        assert_eq!(map["orderId"], json!("o1"));
    }

    #[test]
    fn delimited_string_equals_structured_object() {
        let structured = json!({"status": "NEW", "orderId": "o1"});
        let informal = Value::String("{status: NEW, orderId: o1}".to_string());

        let from_structured = parse_payload(record_id(), Some(&structured)).unwrap();
        let from_informal = parse_payload(record_id(), Some(&informal)).unwrap();
        assert_eq!(from_structured, from_informal);
    }

    #[test]
    fn fragments_without_colon_are_skipped() {
        let payload = Value::String("{status: NEW, garbage, orderId: o1}".to_string());
        let map = parse_payload(record_id(), Some(&payload)).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["status"], json!("NEW"));
        assert_eq!(map["orderId"], json!("o1"));
    }

    #[test]
    fn absent_payload_fails() {
        let err = parse_payload(record_id(), None).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn unusable_payload_fails() {
        let payload = Value::String("no pairs here".to_string());
        let err = parse_payload(record_id(), Some(&payload)).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));

        let empty = Value::String("{}".to_string());
        // An empty JSON object is a valid, empty mapping.
        let map = parse_payload(record_id(), Some(&empty)).unwrap();
        assert!(map.is_empty());
    }
}
