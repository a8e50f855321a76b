//! `stream_generate_content` tool (spec §4.G `streamGenerateContent`, §8
//! scenario 5). Bypasses [`crate::pipeline::execute`]: progress must be
//! reported per chunk as it arrives, and the commit uses the *last*
//! chunk's cumulative usage rather than a single terminal response, so
//! this tool drives `begin`/`commit` directly instead of through the
//! generic single-call helper.

use std::sync::Arc;

use bridge_client::extractors::{extract_text, extract_usage};
use bridge_client::ChunkDecoder;
use bridge_core::error::BridgeError;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use turbomcp::Context;

use crate::pipeline::{self, PipelineState, DEFAULT_MAX_OUTPUT_TOKENS, DEFAULT_MODEL};

pub async fn run(
    state: &PipelineState,
    ctx: &Context,
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

    let input_chars = pipeline::input_char_count(prompt, system_instruction);
    let mut handle = pipeline::begin(state, input_chars, max_output_tokens).await?;

    let (framing, response) = handle.client.stream_generate_content(&model, &body, &cancel).await?;
    let mut decoder = ChunkDecoder::new(framing);
    let mut byte_stream = response.bytes_stream();

    let mut text = String::new();
    let mut last_total_tokens: u64 = 0;

    loop {
        let chunk = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(BridgeError::Cancelled),
            next = byte_stream.next() => next,
        };

        let Some(chunk) = chunk else { break };
        let bytes = chunk.map_err(|e| BridgeError::ApiError {
            status: 0,
            message: format!("stream read error: {e}"),
            body: None,
        })?;

        for value in decoder.push(&bytes) {
            let piece = extract_text(&value);
            if !piece.is_empty() {
                text.push_str(&piece);
                let _ = ctx.report_progress(text.chars().count() as f64, None).await;
            }
            let usage = extract_usage(&value);
            if usage.total_tokens > 0 {
                last_total_tokens = usage.total_tokens;
            }
        }
    }

    let warnings = handle.commit(state, "stream_generate_content", last_total_tokens, None).await;

    let mut out = warnings;
    out.push_str(&text);
    out.push_str("\n\n");
    out.push_str(&pipeline::usage_footer(&state.budget.get_usage()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use bridge_client::StreamFraming;

    #[test]
    fn sanity_stream_framing_defaults_to_ndjson() {
        assert_eq!(StreamFraming::from_content_type(None), StreamFraming::NdJson);
    }
}
