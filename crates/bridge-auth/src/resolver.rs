//! Auth Resolver orchestration (spec §4.C).

use bridge_core::config::{AuthMode, AuthOptions};
use bridge_core::error::BridgeError;

use crate::cache::TokenCache;
use crate::credential::Credential;
use crate::providers::{api_key, oauth2};

/// Resolves credentials for the configured [`AuthMode`]: tries OAuth first
/// unless the mode is `api_key_only`, falling through to an API key in
/// `auto` mode, and only ever raising [`BridgeError::MissingCredentials`]
/// once both sources have genuinely been attempted and failed.
#[derive(Clone)]
pub struct AuthResolver {
    http: reqwest::Client,
    cache: TokenCache,
}

impl Default for AuthResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthResolver {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            cache: TokenCache::new(),
        }
    }

    pub fn with_cache(cache: TokenCache) -> Self {
        Self {
            http: reqwest::Client::new(),
            cache,
        }
    }

    pub async fn resolve(
        &self,
        mode: AuthMode,
        options: &AuthOptions,
    ) -> Result<Credential, BridgeError> {
        match mode {
            AuthMode::ApiKeyOnly => api_key::resolve(options),
            AuthMode::OauthOnly => oauth2::resolve(options, &self.http, &self.cache).await,
            AuthMode::Auto => {
                match oauth2::resolve(options, &self.http, &self.cache).await {
                    Ok(cred) => Ok(cred),
                    Err(oauth_err) => {
                        tracing::debug!(error = %oauth_err, "oauth resolution failed in auto mode, falling through to api key");
                        match api_key::resolve(options) {
                            Ok(cred) => Ok(cred),
                            Err(api_err) => Err(BridgeError::MissingCredentials {
                                api_key_error: api_err.to_string(),
                                oauth_error: oauth_err.to_string(),
                            }),
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn options_with_no_sources() -> AuthOptions {
        AuthOptions {
            inline_api_key: None,
            primary_env_var: "BRIDGE_RESOLVER_TEST_MISSING_KEY".to_string(),
            alt_env_var: None,
            key_file_env_var: None,
            key_file_paths: Vec::new(),
            oauth_scopes: Vec::new(),
            oauth_token_primary_env_var: "BRIDGE_RESOLVER_TEST_MISSING_TOKEN".to_string(),
            oauth_token_alt_env_var: None,
            application_default_credentials_path_env_var:
                "BRIDGE_RESOLVER_TEST_MISSING_ADC".to_string(),
            vendor_config_dir_name: "gcloud".to_string(),
        }
    }

    #[tokio::test]
    #[serial(env)]
    async fn auto_mode_reports_both_failures_when_neither_source_resolves() {
        std::env::remove_var("HOME");
        let resolver = AuthResolver::new();
        let err = resolver
            .resolve(AuthMode::Auto, &options_with_no_sources())
            .await
            .unwrap_err();
        match err {
            BridgeError::MissingCredentials {
                api_key_error,
                oauth_error,
            } => {
                assert!(!api_key_error.is_empty());
                assert!(!oauth_error.is_empty());
            }
            other => panic!("expected MissingCredentials, got {other:?}"),
        }
    }

    #[tokio::test]
    #[serial(env)]
    async fn api_key_only_mode_never_attempts_oauth() {
        std::env::set_var("BRIDGE_RESOLVER_TEST_MISSING_KEY", "a-key");
        let resolver = AuthResolver::new();
        let cred = resolver
            .resolve(AuthMode::ApiKeyOnly, &options_with_no_sources())
            .await
            .unwrap();
        assert!(matches!(cred, Credential::ApiKey { .. }));
        std::env::remove_var("BRIDGE_RESOLVER_TEST_MISSING_KEY");
    }
}
