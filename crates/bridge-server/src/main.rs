//! `gemini-mcp-bridge` — an MCP stdio server exposing the generative-model
//! API as tools (spec §1, §6).
//!
//! Grounded on the `#[server]`/`#[tool]` attribute-macro style demonstrated
//! throughout `turbomcp`'s own tutorials (e.g. `05_error_handling.rs`):
//! one plain struct, tool methods as inherent `async fn`s, `run_stdio`
//! generated by the macro.

use std::sync::Arc;

use bridge_core::error::BridgeError;
use bridge_core::redactor::Redactor;
use bridge_server::pipeline::PipelineState;
use bridge_server::tools;
use tokio_util::sync::CancellationToken;
use turbomcp::{server, tool, Context, McpResult};

/// The MCP-facing bridge. Cloning is cheap: every tool call shares the
/// same pipeline state through the inner `Arc`.
#[derive(Clone)]
struct GeminiBridge {
    state: Arc<PipelineState>,
}

fn into_mcp_error(err: BridgeError, redactor: &Redactor) -> turbomcp::McpError {
    turbomcp::McpError::Tool(err.into_caller_message(redactor))
}

#[server(
    name = "gemini-mcp-bridge",
    version = "0.1.0",
    description = "Exposes Gemini's generateContent, streamGenerateContent, countTokens, embedContent, and model listing as MCP tools"
)]
impl GeminiBridge {
    fn new(state: PipelineState) -> Self {
        Self { state: Arc::new(state) }
    }

    #[tool("Generate content from a prompt using a Gemini model")]
    async fn generate_content(
        &self,
        ctx: Context,
        prompt: String,
        model: Option<String>,
        system_instruction: Option<String>,
        max_output_tokens: Option<u32>,
    ) -> McpResult<String> {
        ctx.info(format!("generate_content: {} chars", prompt.len())).await?;
        tools::generate_content::run(
            &self.state,
            model.as_deref(),
            &prompt,
            system_instruction.as_deref(),
            max_output_tokens,
            CancellationToken::new(),
        )
        .await
        .map_err(|e| into_mcp_error(e, &self.state.redactor))
    }

    #[tool("Stream generated content from a prompt using a Gemini model, reporting progress as text arrives")]
    async fn stream_generate_content(
        &self,
        ctx: Context,
        prompt: String,
        model: Option<String>,
        system_instruction: Option<String>,
        max_output_tokens: Option<u32>,
    ) -> McpResult<String> {
        ctx.info(format!("stream_generate_content: {} chars", prompt.len())).await?;
        tools::stream_generate_content::run(
            &self.state,
            &ctx,
            model.as_deref(),
            &prompt,
            system_instruction.as_deref(),
            max_output_tokens,
            CancellationToken::new(),
        )
        .await
        .map_err(|e| into_mcp_error(e, &self.state.redactor))
    }

    #[tool("Count the tokens a prompt would use without generating a response")]
    async fn count_tokens(&self, ctx: Context, prompt: String, model: Option<String>) -> McpResult<String> {
        ctx.info(format!("count_tokens: {} chars", prompt.len())).await?;
        tools::count_tokens::run(&self.state, model.as_deref(), &prompt, CancellationToken::new())
            .await
            .map_err(|e| into_mcp_error(e, &self.state.redactor))
    }

    #[tool("Compute an embedding vector for a piece of text")]
    async fn embed_content(&self, ctx: Context, text: String, model: Option<String>) -> McpResult<String> {
        ctx.info(format!("embed_content: {} chars", text.len())).await?;
        tools::embed_content::run(&self.state, model.as_deref(), &text, CancellationToken::new())
            .await
            .map_err(|e| into_mcp_error(e, &self.state.redactor))
    }

    #[tool("List the generative models available to the configured backend")]
    async fn list_models(&self, ctx: Context, page_size: Option<u32>, page_token: Option<String>) -> McpResult<String> {
        ctx.info("list_models").await?;
        tools::list_models::run(&self.state, page_size, page_token.as_deref(), CancellationToken::new())
            .await
            .map_err(|e| into_mcp_error(e, &self.state.redactor))
    }

    #[tool("Report today's token budget usage")]
    async fn usage(&self, _ctx: Context) -> McpResult<String> {
        Ok(bridge_server::pipeline::usage_footer(&self.state.budget.get_usage()))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // MCP stdio is the transport on stdout; every log line goes to stderr
    // so a client parsing JSON-RPC frames never sees a stray log line.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = bridge_core::config::BridgeConfig::from_env()?;
    let state = PipelineState::new(config).with_shared_store().await;

    tracing::info!("starting gemini-mcp-bridge");
    let server = GeminiBridge::new(state);
    server.run_stdio().await?;
    Ok(())
}
