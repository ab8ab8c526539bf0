//! Typed field resolution over normalized payload mappings.
//!
//! Upstream services have renamed fields over time, so each logical
//! field is an ordered alias table tried in priority order.

use std::collections::HashMap;

use serde_json::Value;

/// Aliases for the service that emitted the event.
pub const SOURCE_SERVICE: &[&str] = &["sourceservice", "source_service", "sourceService"];

/// Aliases for the new order status.
pub const STATUS: &[&str] = &["status"];

/// Aliases for the batch file correlation key.
pub const FILE_ID: &[&str] = &["fileId", "files_id", "file_id"];

/// Aliases for the order business key.
pub const ORDER_ID: &[&str] = &["orderId", "order_id"];

/// Aliases for the distribution channel id.
pub const DISTRIBUTOR_ID: &[&str] = &["distributorId", "distributor_id", "firmId", "firm_id"];

/// Resolves a string field, trying aliases in order.
///
/// The first present, non-empty, non-literal-`"null"` value wins,
/// trimmed of surrounding whitespace.
pub fn resolve_string(map: &HashMap<String, Value>, aliases: &[&str]) -> Option<String> {
    for alias in aliases {
        if let Some(value) = map.get(*alias) {
            let text = value_to_text(value);
            let trimmed = text.trim();
            if !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("null") {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Resolves an integer field, trying aliases in order.
///
/// Delegates to string resolution and parses the result; a
/// non-numeric value yields `None` rather than an error.
pub fn resolve_int(map: &HashMap<String, Value>, aliases: &[&str]) -> Option<i32> {
    let text = resolve_string(map, aliases)?;
    match text.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(value = %text, "failed to parse integer field");
            None
        }
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
