//! Tool Pipeline (spec §4.H): validate → admit → reserve → resolve auth →
//! call → extract → commit/release → format.
//!
//! Grounded on the `ToolHandler` trait shape read from the teacher's
//! (now-deleted) `turbomcp-server` crate — one entry point per invocation,
//! validated input, a single place that turns a component error into the
//! caller-safe message — generalized here from "route one JSON-RPC call"
//! to "run one reservation-guarded HTTP round trip".

use std::sync::Arc;
use std::time::Duration;

use bridge_auth::providers::api_key;
use bridge_auth::{AuthResolver, Credential};
use bridge_client::ModelClient;
use bridge_core::config::{AuthMode, Backend, BridgeConfig};
use bridge_core::error::BridgeError;
use bridge_core::redactor::Redactor;
use bridge_limits::budget::{DailyTokenBudget, Reservation, UsageSnapshot};
use bridge_limits::rate_limiter::RateLimiter;
use bridge_limits::store::{RedisStore, SharedLimitStore};
use bridge_limits::ApprovalsStore;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

/// Default model used when a tool call omits `model` (spec §8 scenarios).
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;

/// The components a tool invocation runs against, shared across every
/// connected client (spec §5 "many tool invocations in flight at once").
pub struct PipelineState {
    pub config: BridgeConfig,
    pub rate_limiter: RateLimiter,
    pub budget: DailyTokenBudget,
    pub auth: AuthResolver,
    pub redactor: Redactor,
}

impl PipelineState {
    pub fn new(config: BridgeConfig) -> Self {
        let approvals = ApprovalsStore::new(config.budget.approval_path.clone());
        let budget = DailyTokenBudget::new(
            config.budget.base_max_per_day,
            config.budget.increment_tokens,
            config.budget.approval_policy,
            approvals,
        );
        let rate_limiter = RateLimiter::new(config.rate_limit.max_per_minute);
        Self {
            rate_limiter,
            budget,
            auth: AuthResolver::new(),
            redactor: Redactor::new(),
            config,
        }
    }

    /// Attempt to wire a shared Redis-backed store into the rate limiter
    /// and budget; on any connection failure this silently keeps local
    /// state (spec §4.F — "falls back to local state without error").
    pub async fn with_shared_store(mut self) -> Self {
        if !self.config.shared_store.enabled {
            return self;
        }
        let Some(url) = self.config.shared_store.url.clone() else {
            tracing::warn!("shared_store.enabled is true but no url is configured; using local state");
            return self;
        };

        let timeout = Duration::from_millis(self.config.shared_store.connect_timeout_ms);
        if let Some(store) = RedisStore::connect(&url, timeout).await {
            let store: Arc<dyn SharedLimitStore> = Arc::new(store);
            let prefix = self.config.shared_store.prefix.clone();
            self.rate_limiter =
                RateLimiter::with_shared_store(self.config.rate_limit.max_per_minute, store.clone(), &prefix);
            self.budget = self.budget.with_shared_store(store, &prefix);
        }
        self
    }
}

/// The result of a tool-specific response parse, feeding the commit step.
pub struct ToolFinish {
    pub text: String,
    pub actual_tokens: u64,
    pub cost_minor: Option<i64>,
    /// Set when the response parsed successfully but carries no usable
    /// text alongside a finish/block reason (spec §4.H step 6: "a
    /// structured error, not an exception").
    pub structured_error: Option<String>,
}

/// Guarantees `budget.release` runs exactly once on every exit path
/// between `reserve` and `commit` (spec §4.H step 7, §5 "Cancellation").
pub struct ReservationGuard<'a> {
    budget: &'a DailyTokenBudget,
    reservation: Option<Reservation>,
}

impl<'a> ReservationGuard<'a> {
    fn new(budget: &'a DailyTokenBudget, reservation: Reservation) -> Self {
        Self {
            budget,
            reservation: Some(reservation),
        }
    }

    /// Hand the reservation to `commit`, disarming the `Drop`-time release.
    fn defuse(&mut self) -> Reservation {
        self.reservation.take().expect("reservation already defused")
    }
}

impl Drop for ReservationGuard<'_> {
    fn drop(&mut self) {
        if let Some(reservation) = self.reservation.take() {
            self.budget.release(reservation);
        }
    }
}

/// The pieces a tool needs once admission, reservation, and auth have
/// succeeded: a ready-to-use client and the still-armed reservation guard.
pub struct PipelineHandle<'a> {
    pub client: Arc<ModelClient>,
    guard: ReservationGuard<'a>,
}

impl<'a> PipelineHandle<'a> {
    /// Commit the reservation and drain the client's Notice queue into
    /// warning lines (spec §4.H steps 7-8).
    pub async fn commit(&mut self, state: &PipelineState, tool_name: &str, actual_tokens: u64, cost_minor: Option<i64>) -> String {
        let reservation = self.guard.defuse();
        state.budget.commit(tool_name, actual_tokens, cost_minor, reservation).await;
        warning_lines(&self.client.drain_notices())
    }
}

pub(crate) fn warning_lines(notices: &[bridge_core::Notice]) -> String {
    let mut out = String::new();
    for notice in notices {
        out.push_str(&notice.as_warning_line());
        out.push('\n');
    }
    out
}

fn validate(state: &PipelineState, input_chars: usize, max_output_tokens: u32) -> Result<(), BridgeError> {
    if max_output_tokens > state.config.budget.max_output_tokens_per_request {
        return Err(BridgeError::Config(format!(
            "max_output_tokens {max_output_tokens} exceeds the configured limit of {}",
            state.config.budget.max_output_tokens_per_request
        )));
    }
    if input_chars > state.config.budget.max_input_chars_per_request {
        return Err(BridgeError::Config(format!(
            "input of {input_chars} characters exceeds the configured limit of {}",
            state.config.budget.max_input_chars_per_request
        )));
    }
    Ok(())
}

fn ceil_div(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

/// Steps 1-4 of §4.H: validate, admit, reserve, resolve auth, build the
/// client. Returns a handle the caller drives with its own HTTP verb and
/// finishes with [`PipelineHandle::commit`].
pub async fn begin<'a>(state: &'a PipelineState, input_chars: usize, max_output_tokens: u32) -> Result<PipelineHandle<'a>, BridgeError> {
    validate(state, input_chars, max_output_tokens)?;
    state.rate_limiter.check_or_throw().await?;

    let reserve_estimate = max_output_tokens as u64 + ceil_div(input_chars as u64, 4);
    let reservation = state.budget.reserve(reserve_estimate).await?;
    let guard = ReservationGuard::new(&state.budget, reservation);

    let credential = state.auth.resolve(state.config.auth_mode, &state.config.auth).await?;
    let (access_token, api_key) = split_credential(state, credential);

    let client = Arc::new(ModelClient::new(state.config.client.clone(), access_token, api_key)?);
    Ok(PipelineHandle { client, guard })
}

/// Translate a resolved credential into the `ModelClient` constructor's
/// plain `(access_token, api_key)` shape, additionally resolving a
/// fallback API key when running in `auto` mode with OAuth so the client
/// can retry a 401/403 (spec §4.H step 4, §4.G).
pub(crate) fn split_credential(state: &PipelineState, credential: Credential) -> (Option<String>, Option<String>) {
    match credential {
        Credential::OAuth { access_token, .. } => {
            let fallback_key = if state.config.auth_mode == AuthMode::Auto && state.config.client.allow_api_key_fallback {
                match api_key::resolve(&state.config.auth) {
                    Ok(Credential::ApiKey { value, .. }) => Some(value),
                    _ => None,
                }
            } else {
                None
            };
            (Some(access_token), fallback_key)
        }
        Credential::ApiKey { value, .. } => (None, Some(value)),
    }
}

/// Run the full non-streaming pipeline for one tool invocation: `begin`,
/// the tool's own HTTP call, the tool's own response parse, then commit
/// and format (spec §4.H steps 5-8).
pub async fn execute<C, F, G>(
    state: &PipelineState,
    tool_name: &str,
    input_chars: usize,
    max_output_tokens: u32,
    cancel: CancellationToken,
    call: C,
    finish: G,
) -> Result<String, BridgeError>
where
    C: FnOnce(Arc<ModelClient>, CancellationToken) -> F,
    F: std::future::Future<Output = Result<Value, BridgeError>>,
    G: FnOnce(&Value) -> ToolFinish,
{
    let mut handle = begin(state, input_chars, max_output_tokens).await?;
    let response = call(handle.client.clone(), cancel).await?;
    let result = finish(&response);

    let mut out = handle.commit(state, tool_name, result.actual_tokens, result.cost_minor).await;

    if let Some(message) = result.structured_error {
        return Err(BridgeError::ApiError {
            status: 200,
            message,
            body: Some(response),
        });
    }

    out.push_str(&result.text);
    out.push_str("\n\n");
    out.push_str(&usage_footer(&state.budget.get_usage()));
    Ok(out)
}

/// A human-readable usage footer appended to every successful tool output
/// (spec §4.H step 8).
pub fn usage_footer(usage: &UsageSnapshot) -> String {
    format!(
        "— usage: {}/{} tokens used today across {} request(s) (day {})",
        usage.used_tokens, usage.effective_max, usage.request_count, usage.day_utc
    )
}

/// Total input character count for validation and reservation sizing
/// (spec §4.H steps 1, 3: "prompt + system instruction + serialized prior
/// turns of any attached conversation").
pub fn input_char_count(prompt: &str, system_instruction: Option<&str>) -> usize {
    prompt.len() + system_instruction.map_or(0, str::len)
}

/// Build the `contents` body shared by `generateContent`, `countTokens`,
/// and `streamGenerateContent` (spec §8 scenario 1: exact shape for a
/// single-turn user prompt).
pub fn build_contents_body(prompt: &str, system_instruction: Option<&str>) -> Value {
    let mut body = json!({
        "contents": [{"role": "user", "parts": [{"text": prompt}]}],
    });
    if let Some(instruction) = system_instruction {
        body["systemInstruction"] = json!({"parts": [{"text": instruction}]});
    }
    body
}

/// Attach `generationConfig.maxOutputTokens` to an existing request body.
pub fn set_max_output_tokens(body: &mut Value, max_output_tokens: u32) {
    body["generationConfig"] = json!({"maxOutputTokens": max_output_tokens});
}

/// Build the embeddings request body for the configured backend — the
/// Developer and Vertex APIs use different shapes for the same operation
/// (spec §4.G `embedContent`/`predict`).
pub fn build_embedding_body(backend: Backend, text: &str) -> Value {
    match backend {
        Backend::Developer => json!({"content": {"parts": [{"text": text}]}}),
        Backend::Vertex => json!({"instances": [{"content": text}]}),
    }
}
