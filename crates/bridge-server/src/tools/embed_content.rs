//! `embed_content` tool (spec §4.G `embedContent`/`predict`).

use bridge_core::error::BridgeError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{self, PipelineState, ToolFinish, DEFAULT_EMBEDDING_MODEL};

pub async fn run(state: &PipelineState, model: Option<&str>, text: &str, cancel: CancellationToken) -> Result<String, BridgeError> {
    let model = model.unwrap_or(DEFAULT_EMBEDDING_MODEL).to_string();
    let backend = state.config.client.backend;
    let body = pipeline::build_embedding_body(backend, text);

    pipeline::execute(
        state,
        "embed_content",
        text.len(),
        0,
        cancel,
        move |client, cancel| async move { client.embed_content(&model, &body, &cancel).await },
        finish,
    )
    .await
}

/// Neither the Developer `embedContent` nor the Vertex `predict` response
/// carries `usageMetadata`; the embedding vector's dimensionality stands
/// in for the result summary, and the request's character count alone
/// drives the reservation since there is no output-token budget to spend.
fn finish(response: &Value) -> ToolFinish {
    let dims = response
        .get("embedding")
        .and_then(|e| e.get("values"))
        .and_then(Value::as_array)
        .map(Vec::len)
        .or_else(|| {
            response
                .get("predictions")
                .and_then(Value::as_array)
                .and_then(|p| p.first())
                .and_then(|p| p.get("embeddings"))
                .and_then(|e| e.get("values"))
                .and_then(Value::as_array)
                .map(Vec::len)
        })
        .unwrap_or(0);

    ToolFinish {
        text: format!("embedding with {dims} dimensions"),
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
    fn finish_reads_the_developer_shape() {
        let response = json!({"embedding": {"values": [0.1, 0.2, 0.3]}});
        assert_eq!(finish(&response).text, "embedding with 3 dimensions");
    }

    #[test]
    fn finish_reads_the_vertex_predict_shape() {
        let response = json!({"predictions": [{"embeddings": {"values": [0.1, 0.2]}}]});
        assert_eq!(finish(&response).text, "embedding with 2 dimensions");
    }
}
