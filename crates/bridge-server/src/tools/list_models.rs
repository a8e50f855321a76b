//! `list_models` tool (spec §4.G `GET models`, §6). Listing costs no
//! output tokens and needs no reservation guard, so it calls the client
//! directly through a freshly built auth/client pair rather than going
//! through [`crate::pipeline::execute`].

use std::sync::Arc;

use bridge_client::ModelClient;
use bridge_core::error::BridgeError;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::pipeline::{self, PipelineState};

pub async fn run(state: &PipelineState, page_size: Option<u32>, page_token: Option<&str>, cancel: CancellationToken) -> Result<String, BridgeError> {
    state.rate_limiter.check_or_throw().await?;

    let credential = state.auth.resolve(state.config.auth_mode, &state.config.auth).await?;
    let (access_token, api_key) = pipeline::split_credential(state, credential);
    let client = Arc::new(ModelClient::new(state.config.client.clone(), access_token, api_key)?);

    let response = client.list_models(page_size, page_token, &cancel).await?;
    let warnings = pipeline::warning_lines(&client.drain_notices());

    Ok(format!("{warnings}{}", format_models(&response)))
}

fn format_models(response: &Value) -> String {
    let names: Vec<&str> = response
        .get("models")
        .and_then(Value::as_array)
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if names.is_empty() {
        "no models returned".to_string()
    } else {
        names.join("\n")
    }
}
