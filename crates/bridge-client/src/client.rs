//! Model HTTP Client (spec §4.G): dual-backend composition, OAuth→API-key
//! automatic retry, Vertex 404 regional→global rewrite, a bounded Notice
//! queue, and cancellation honored on both the caller's token and the
//! configured timeout.
//!
//! Grounded on the retry-with-backoff shape of `turbomcp-dpop`'s
//! `with_retries` helper (see `bridge-limits::store::RedisStore`), adapted
//! from "retry the same request" to "retry against a rewritten request",
//! and on the reqwest-based request building in
//! `turbomcp-auth::oauth2::http_client`.

use std::collections::VecDeque;
use std::time::Duration;

use bridge_core::config::{Backend, ClientConfig, FallbackPolicy};
use bridge_core::error::BridgeError;
use bridge_core::notice::Notice;
use parking_lot::Mutex;
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::headers::{build_headers, AuthHeader};
use crate::url::{self, Verb};

const NOTICE_QUEUE_CAPACITY: usize = 64;
const CLIPPED_BODY_LEN: usize = 2000;

/// The generative-model HTTP client (spec §4.G).
pub struct ModelClient {
    http: reqwest::Client,
    config: ClientConfig,
    access_token: Option<String>,
    api_key: Option<String>,
    notices: Mutex<VecDeque<Notice>>,
}

impl ModelClient {
    pub fn new(config: ClientConfig, access_token: Option<String>, api_key: Option<String>) -> Result<Self, BridgeError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| BridgeError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config,
            access_token,
            api_key,
            notices: Mutex::new(VecDeque::new()),
        })
    }

    /// Drain all queued [`Notice`]s (spec §3: "drained by the pipeline
    /// after each request; never persisted").
    pub fn drain_notices(&self) -> Vec<Notice> {
        self.notices.lock().drain(..).collect()
    }

    fn push_notice(&self, notice: Notice) {
        let mut queue = self.notices.lock();
        if queue.len() >= NOTICE_QUEUE_CAPACITY {
            queue.pop_front();
        }
        queue.push_back(notice);
    }

    fn primary_auth(&self) -> Result<AuthHeader<'_>, BridgeError> {
        if let Some(access_token) = &self.access_token {
            Ok(AuthHeader::Bearer {
                access_token,
                quota_project: self
                    .config
                    .vertex
                    .as_ref()
                    .and_then(|v| v.quota_project.as_deref()),
            })
        } else if let Some(api_key) = &self.api_key {
            Ok(AuthHeader::ApiKey { api_key })
        } else {
            Err(BridgeError::MissingAuth)
        }
    }

    fn fallback_eligible(&self, status: u16) -> bool {
        (status == 401 || status == 403)
            && self.access_token.is_some()
            && self.config.allow_api_key_fallback
            && self.api_key.as_deref().is_some_and(|k| !k.is_empty())
    }

    fn fallback_url(&self, model: &str, verb: Verb) -> String {
        let base = self
            .config
            .api_key_fallback_base_url
            .clone()
            .unwrap_or_else(|| self.config.developer_base_url.clone());
        url::model_url(Backend::Developer, &base, None, model, verb)
    }

    /// Send one `models/<name>:<verb>` request, retrying once against the
    /// API-key fallback path on a 401/403 when eligible (spec §4.G).
    pub async fn call_model_verb(
        &self,
        model: &str,
        verb: Verb,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<Value, BridgeError> {
        let primary_url = url::model_url(self.config.backend, &self.config.developer_base_url, self.config.vertex.as_ref(), model, verb);
        let auth = self.primary_auth()?;
        let response = self.send_json(Method::POST, &primary_url, Some(body), &auth, cancel).await?;

        if response.status().is_success() {
            return parse_json_response(response).await;
        }

        let status = response.status().as_u16();
        if self.fallback_eligible(status) {
            let error_message = extract_error_message(response).await;
            if self.config.api_key_fallback_policy == FallbackPolicy::Prompt {
                return Err(BridgeError::ApiKeyFallbackPromptRequired { status });
            }

            tracing::warn!(status, model, ?verb, "oauth request rejected, retrying against api key fallback");
            let fallback_url = self.fallback_url(model, verb);
            let api_key = self.api_key.clone().expect("fallback_eligible checked Some");
            let fallback_auth = AuthHeader::ApiKey { api_key: &api_key };
            let fallback_response = self
                .send_json(Method::POST, &fallback_url, Some(body), &fallback_auth, cancel)
                .await?;

            if fallback_response.status().is_success() {
                self.push_notice(Notice::auth_fallback(status, error_message));
                return parse_json_response(fallback_response).await;
            }
            return api_error_from_response(fallback_response).await;
        }

        api_error_from_response(response).await
    }

    /// `countTokens` (spec §4.G, §8 scenario 1). A thin wrapper over
    /// [`Self::call_model_verb`] — committing 0 tokens is the pipeline's
    /// responsibility, not the client's.
    pub async fn count_tokens(&self, model: &str, body: &Value, cancel: &CancellationToken) -> Result<Value, BridgeError> {
        self.call_model_verb(model, Verb::CountTokens, body, cancel).await
    }

    /// `generateContent` (spec §4.G, §8 scenarios 1-3).
    pub async fn generate_content(&self, model: &str, body: &Value, cancel: &CancellationToken) -> Result<Value, BridgeError> {
        self.call_model_verb(model, Verb::GenerateContent, body, cancel).await
    }

    /// `embedContent` (Developer) or `predict` (Vertex) — the two shapes
    /// the Developer and Vertex backends use for embeddings (spec §4.G).
    pub async fn embed_content(&self, model: &str, body: &Value, cancel: &CancellationToken) -> Result<Value, BridgeError> {
        let verb = match self.config.backend {
            Backend::Developer => Verb::EmbedContent,
            Backend::Vertex => Verb::Predict,
        };
        self.call_model_verb(model, verb, body, cancel).await
    }

    /// `streamGenerateContent` (spec §4.G, §6, §8 scenario 5). Returns the
    /// framing probed from `Content-Type` and the still-open response; the
    /// caller drives the byte stream and decodes chunks incrementally —
    /// no fallback retry here, since a streamed response's first bytes are
    /// the only signal that auth failed and they are already consumed.
    pub async fn stream_generate_content(
        &self,
        model: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<(crate::streaming::StreamFraming, reqwest::Response), BridgeError> {
        let url = url::model_url(
            self.config.backend,
            &self.config.developer_base_url,
            self.config.vertex.as_ref(),
            model,
            Verb::StreamGenerateContent,
        );
        let auth = self.primary_auth()?;
        let response = self.send_json(Method::POST, &url, Some(body), &auth, cancel).await?;
        if !response.status().is_success() {
            return Err(bridge_error_from_response(response).await);
        }
        let framing = crate::streaming::StreamFraming::from_content_type(
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        Ok((framing, response))
    }

    /// `GET models` listing with a single regional→global retry on 404
    /// for Vertex (spec §4.G, §6).
    pub async fn list_models(
        &self,
        page_size: Option<u32>,
        page_token: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Value, BridgeError> {
        let primary_url = url::list_models_url(
            self.config.backend,
            &self.config.developer_base_url,
            self.config.vertex.as_ref(),
            page_size,
            page_token,
        );
        let auth = self.primary_auth()?;
        let response = self.send_json(Method::GET, &primary_url, None, &auth, cancel).await?;

        if response.status().is_success() {
            return parse_json_response(response).await;
        }

        if response.status().as_u16() == 404 && self.config.backend == Backend::Vertex {
            if let Some(global_url) = url::rewrite_vertex_regional_to_global(&primary_url) {
                tracing::info!(regional = %primary_url, global = %global_url, "regional vertex listing 404'd, retrying against the global endpoint");
                let retry = self.send_json(Method::GET, &global_url, None, &auth, cancel).await?;
                if retry.status().is_success() {
                    return parse_json_response(retry).await;
                }
                return api_error_from_response(retry).await;
            }
        }

        api_error_from_response(response).await
    }

    async fn send_json(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        auth: &AuthHeader<'_>,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, BridgeError> {
        let headers = build_headers(auth)?;
        let mut builder = self.http.request(method, url).headers(headers);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let timeout = Duration::from_millis(self.config.timeout_ms);
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(BridgeError::Cancelled),
            result = tokio::time::timeout(timeout, builder.send()) => match result {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(BridgeError::ApiError {
                    status: 0,
                    message: e.to_string(),
                    body: None,
                }),
                Err(_) => Err(BridgeError::Cancelled),
            },
        }
    }
}

async fn parse_json_response(response: reqwest::Response) -> Result<Value, BridgeError> {
    let status = response.status().as_u16();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| BridgeError::ApiError { status, message: e.to_string(), body: None })?;
    serde_json::from_slice(&bytes).map_err(|_| BridgeError::ApiError {
        status,
        message: "Non-JSON response from Gemini API".to_string(),
        body: Some(Value::String(clip(&String::from_utf8_lossy(&bytes)))),
    })
}

async fn api_error_from_response(response: reqwest::Response) -> Result<Value, BridgeError> {
    Err(bridge_error_from_response(response).await)
}

async fn bridge_error_from_response(response: reqwest::Response) -> BridgeError {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.unwrap_or_default();
    let text = String::from_utf8_lossy(&bytes);
    match serde_json::from_str::<Value>(&text) {
        Ok(parsed) => {
            let message = parsed
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("API error")
                .to_string();
            BridgeError::ApiError {
                status,
                message,
                body: Some(parsed),
            }
        }
        Err(_) => BridgeError::ApiError {
            status,
            message: "Non-JSON response from Gemini API".to_string(),
            body: Some(Value::String(clip(&text))),
        },
    }
}

async fn extract_error_message(response: reqwest::Response) -> String {
    let status = response.status().as_u16();
    let bytes = response.bytes().await.unwrap_or_default();
    let text = String::from_utf8_lossy(&bytes);
    serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| format!("HTTP {status}"))
}

fn clip(s: &str) -> String {
    if s.chars().count() > CLIPPED_BODY_LEN {
        s.chars().take(CLIPPED_BODY_LEN).collect()
    } else {
        s.to_string()
    }
}
