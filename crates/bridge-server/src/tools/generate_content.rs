//! `generate_content` tool (spec §4.G `generateContent`, §8 scenarios 1-3).

use bridge_client::extractors::{extract_block_reason, extract_finish_reason, extract_text, extract_usage};
use bridge_core::error::BridgeError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{self, PipelineState, ToolFinish, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL};

pub async fn run(
    state: &PipelineState,
    model: Option<&str>,
    prompt: &str,
    system_instruction: Option<&str>,
    max_output_tokens: Option<u32>,
    cancel: CancellationToken,
) -> Result<String, BridgeError> {
    let model = model.unwrap_or(DEFAULT_MODEL).to_string();
    let max_output_tokens = max_output_tokens.unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);

    let mut body = pipeline::build_contents_body(prompt, system_instruction);
    pipeline::set_max_output_tokens(&mut body, max_output_tokens);

    pipeline::execute(
        state,
        "generate_content",
        pipeline::input_char_count(prompt, system_instruction),
        max_output_tokens,
        cancel,
        move |client, cancel| async move { client.generate_content(&model, &body, &cancel).await },
        finish,
    )
    .await
}

/// An empty text body alongside a finish/block reason is a structured
/// error (spec §4.H step 6), not a missing-field panic.
fn finish(response: &Value) -> ToolFinish {
    let text = extract_text(response);
    let usage = extract_usage(response);

    let structured_error = if text.is_empty() {
        extract_block_reason(response)
            .map(|reason| format!("prompt blocked: {reason}"))
            .or_else(|| {
                extract_finish_reason(response)
                    .filter(|r| r.as_str() != "STOP")
                    .map(|reason| format!("generation stopped: {reason}"))
            })
    } else {
        None
    };

    ToolFinish {
        text,
        actual_tokens: usage.total_tokens,
        cost_minor: None,
        structured_error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finish_reports_no_error_when_text_is_present() {
        let response = json!({
            "candidates": [{"content": {"parts": [{"text": "hi"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 1, "totalTokenCount": 2}
        });
        let result = finish(&response);
        assert_eq!(result.text, "hi");
        assert_eq!(result.actual_tokens, 2);
        assert!(result.structured_error.is_none());
    }

    #[test]
    fn finish_surfaces_a_block_reason_as_a_structured_error() {
        let response = json!({
            "promptFeedback": {"blockReason": "SAFETY"},
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 0, "totalTokenCount": 5}
        });
        let result = finish(&response);
        assert_eq!(result.text, "");
        assert_eq!(result.actual_tokens, 5);
        assert_eq!(result.structured_error, Some("prompt blocked: SAFETY".to_string()));
    }

    #[test]
    fn finish_surfaces_a_non_stop_finish_reason_when_text_is_empty() {
        let response = json!({
            "candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 0, "totalTokenCount": 5}
        });
        let result = finish(&response);
        assert_eq!(result.structured_error, Some("generation stopped: MAX_TOKENS".to_string()));
    }
}
