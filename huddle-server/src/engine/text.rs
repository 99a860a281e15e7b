//! Display text derivation from submission payloads

use serde_json::Value;

/// Derive the single display text from a submission payload.
///
/// Prefers an explicit `text` field. Falls back to the legacy triad
/// shape, joining the non-empty `fact`/`constraint`/`hope` fields.
pub fn extract_text(payload: &Value) -> String {
    if let Some(text) = payload.get("text").and_then(Value::as_str) {
        return text.trim().to_string();
    }
    ["fact", "constraint", "hope"]
        .iter()
        .filter_map(|key| payload.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
