//! Configuration structs (spec §6) loaded from environment variables.
//!
//! These are plain structs and closed enums — no dynamic records — per the
//! redesign note in spec §9. Config-file loading and setup wizards are out
//! of scope (spec §1); only the env-var loader is implemented here.

use serde::{Deserialize, Serialize};

/// One of the two generative-model API URL/auth shapes (spec glossary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Developer,
    Vertex,
}

/// Which credential sources the Auth Resolver is allowed to try (spec §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    ApiKeyOnly,
    OauthOnly,
    Auto,
}

/// How the Daily Token Budget reacts to an over-budget reservation (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalPolicy {
    Never,
    Prompt,
    Auto,
}

/// How the HTTP client reacts to a 401/403 while using OAuth (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    Prompt,
    Auto,
}

/// Options consumed by the Auth Resolver (spec §4.C `options`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOptions {
    pub inline_api_key: Option<String>,
    pub primary_env_var: String,
    pub alt_env_var: Option<String>,
    pub key_file_env_var: Option<String>,
    pub key_file_paths: Vec<String>,
    pub oauth_scopes: Vec<String>,
    pub oauth_token_primary_env_var: String,
    pub oauth_token_alt_env_var: Option<String>,
    pub application_default_credentials_path_env_var: String,
    pub vendor_config_dir_name: String,
}

impl Default for AuthOptions {
    fn default() -> Self {
        Self {
            inline_api_key: None,
            primary_env_var: "GEMINI_API_KEY".to_string(),
            alt_env_var: Some("GOOGLE_API_KEY".to_string()),
            key_file_env_var: Some("GEMINI_API_KEY_FILE".to_string()),
            key_file_paths: Vec::new(),
            oauth_scopes: vec!["https://www.googleapis.com/auth/cloud-platform".to_string()],
            oauth_token_primary_env_var: "GEMINI_OAUTH_TOKEN".to_string(),
            oauth_token_alt_env_var: Some("GOOGLE_OAUTH_ACCESS_TOKEN".to_string()),
            application_default_credentials_path_env_var: "GOOGLE_APPLICATION_CREDENTIALS"
                .to_string(),
            vendor_config_dir_name: "gcloud".to_string(),
        }
    }
}

/// Vertex-specific URL composition inputs (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexConfig {
    pub project: String,
    pub location: String,
    pub quota_project: Option<String>,
    pub api_base_url: Option<String>,
}

/// HTTP client configuration (spec §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub backend: Backend,
    pub developer_base_url: String,
    pub vertex: Option<VertexConfig>,
    pub allow_api_key_fallback: bool,
    pub api_key_fallback_policy: FallbackPolicy,
    pub api_key_fallback_base_url: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Developer,
            developer_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            vertex: None,
            allow_api_key_fallback: true,
            api_key_fallback_policy: FallbackPolicy::Auto,
            api_key_fallback_base_url: None,
            timeout_ms: 30_000,
        }
    }
}

/// Rate limiter configuration (spec §4.D).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self { max_per_minute: 60 }
    }
}

/// Daily token budget configuration (spec §4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    pub base_max_per_day: u64,
    pub increment_tokens: u64,
    pub approval_policy: ApprovalPolicy,
    pub approval_path: String,
    pub max_output_tokens_per_request: u32,
    pub max_input_chars_per_request: usize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            base_max_per_day: 1_000_000,
            increment_tokens: 200_000,
            approval_policy: ApprovalPolicy::Prompt,
            approval_path: "budget-approvals.json".to_string(),
            max_output_tokens_per_request: 8192,
            max_input_chars_per_request: 1_000_000,
        }
    }
}

/// Shared (cross-process) limit store configuration (spec §4.F).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedStoreConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub prefix: String,
    pub connect_timeout_ms: u64,
}

impl Default for SharedStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            prefix: "gemini-mcp-bridge".to_string(),
            connect_timeout_ms: 250,
        }
    }
}

/// The aggregate configuration the pipeline is built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub auth_mode: AuthMode,
    pub auth: AuthOptions,
    pub client: ClientConfig,
    pub rate_limit: RateLimitConfig,
    pub budget: BudgetConfig,
    pub shared_store: SharedStoreConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            auth_mode: AuthMode::Auto,
            auth: AuthOptions::default(),
            client: ClientConfig::default(),
            rate_limit: RateLimitConfig::default(),
            budget: BudgetConfig::default(),
            shared_store: SharedStoreConfig::default(),
        }
    }
}

impl BridgeConfig {
    /// Load defaults layered with environment variable overrides, the way
    /// the spec's `options.env_overrides` hook (§4.C) implies: the
    /// `config` crate's `Environment` source lets any field above be
    /// overridden by `BRIDGE_<SECTION>__<FIELD>` without us hand-rolling
    /// an env parser per field.
    pub fn from_env() -> Result<Self, crate::error::BridgeError> {
        let defaults = Self::default();

        let built = config::Config::builder()
            .add_source(config::Config::try_from(&defaults).map_err(config_err)?)
            .add_source(
                config::Environment::with_prefix("BRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_err)?;

        built.try_deserialize().map_err(config_err)
    }
}

fn config_err(e: config::ConfigError) -> crate::error::BridgeError {
    crate::error::BridgeError::Config(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_internally_consistent() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.client.backend, Backend::Developer);
        assert!(cfg.budget.base_max_per_day > 0);
        assert!(!cfg.shared_store.enabled);
    }
}
