//! Response Extractors (spec §4.J).
//!
//! Pure, total functions over the parsed API object — every accessor
//! returns an `Option` rather than panicking on a missing field, per the
//! "ad-hoc JSON extraction" redesign note in spec §9.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Usage totals reported by the API, or computed when `totalTokenCount` is
/// absent (spec §4.J `extract_usage`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub candidates_tokens: u64,
    pub total_tokens: u64,
}

/// Concatenate the text parts of the first candidate's content. Returns an
/// empty string if any ancestor (`candidates`, `content`, `parts`) is
/// missing (spec §4.J `extract_text`).
pub fn extract_text(response: &Value) -> String {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Read `usageMetadata.{promptTokenCount,candidatesTokenCount,totalTokenCount}`,
/// computing the total as the sum of the two when absent (spec §4.J).
pub fn extract_usage(response: &Value) -> Usage {
    let meta = response.get("usageMetadata");
    let prompt = meta
        .and_then(|m| m.get("promptTokenCount"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let candidates = meta
        .and_then(|m| m.get("candidatesTokenCount"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let total = meta
        .and_then(|m| m.get("totalTokenCount"))
        .and_then(Value::as_u64)
        .unwrap_or(prompt + candidates);
    Usage {
        prompt_tokens: prompt,
        candidates_tokens: candidates,
        total_tokens: total,
    }
}

/// `candidates[0].finishReason`, if present.
pub fn extract_finish_reason(response: &Value) -> Option<String> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("finishReason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `promptFeedback.blockReason`, if present.
pub fn extract_block_reason(response: &Value) -> Option<String> {
    response
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// `candidates[0].groundingMetadata`, if present.
pub fn extract_grounding_metadata(response: &Value) -> Option<Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("groundingMetadata"))
        .cloned()
}

/// `candidates[0].safetyRatings`, if present.
pub fn extract_safety_ratings(response: &Value) -> Option<Vec<Value>> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("safetyRatings"))
        .and_then(Value::as_array)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_text_concatenates_parts_of_first_candidate() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "hello "}, {"text": "world"}]}}]
        });
        assert_eq!(extract_text(&response), "hello world");
    }

    #[test]
    fn extract_text_is_empty_when_ancestor_missing() {
        assert_eq!(extract_text(&json!({})), "");
        assert_eq!(extract_text(&json!({"candidates": []})), "");
    }

    #[test]
    fn extract_usage_computes_total_when_missing() {
        let response = json!({"usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 5}});
        let usage = extract_usage(&response);
        assert_eq!(usage.total_tokens, 8);
    }

    #[test]
    fn extract_usage_prefers_reported_total() {
        let response = json!({"usageMetadata": {"promptTokenCount": 3, "candidatesTokenCount": 5, "totalTokenCount": 42}});
        assert_eq!(extract_usage(&response).total_tokens, 42);
    }

    #[test]
    fn extract_usage_on_missing_metadata_is_all_zero() {
        assert_eq!(extract_usage(&json!({})), Usage::default());
    }

    #[test]
    fn extractors_return_none_on_absent_fields() {
        let response = json!({"candidates": [{}]});
        assert_eq!(extract_finish_reason(&response), None);
        assert_eq!(extract_block_reason(&response), None);
        assert_eq!(extract_grounding_metadata(&response), None);
        assert_eq!(extract_safety_ratings(&response), None);
    }

    #[test]
    fn extract_block_reason_reads_prompt_feedback() {
        let response = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        assert_eq!(extract_block_reason(&response), Some("SAFETY".to_string()));
    }
}
