//! `count_tokens` tool (spec §4.G `countTokens`, §8 scenario 1: "budget
//! usage unchanged — count_tokens commits 0").

use bridge_core::error::BridgeError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{self, PipelineState, ToolFinish, DEFAULT_MODEL};

pub async fn run(state: &PipelineState, model: Option<&str>, prompt: &str, cancel: CancellationToken) -> Result<String, BridgeError> {
    let model = model.unwrap_or(DEFAULT_MODEL).to_string();
    let body = pipeline::build_contents_body(prompt, None);

    pipeline::execute(
        state,
        "count_tokens",
        prompt.len(),
        0,
        cancel,
        move |client, cancel| async move { client.count_tokens(&model, &body, &cancel).await },
        finish,
    )
    .await
}

/// `countTokens` never reports `usageMetadata`; committing 0 keeps the
/// daily budget untouched regardless of the prompt's size.
fn finish(response: &Value) -> ToolFinish {
    let total = response.get("totalTokens").and_then(Value::as_u64).unwrap_or(0);
    ToolFinish {
        text: format!("{total} tokens"),
        actual_tokens: 0,
        cost_minor: None,
        structured_error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn finish_always_commits_zero_tokens() {
        let response = json!({"totalTokens": 9001});
        let result = finish(&response);
        assert_eq!(result.text, "9001 tokens");
        assert_eq!(result.actual_tokens, 0);
    }
}
