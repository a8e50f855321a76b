//! OAuth resolution: direct tokens, authorized-user refresh, and
//! service-account JWT-bearer exchange (spec §4.C).
//!
//! The authorized-user path uses the `oauth2` crate's refresh-token grant,
//! matching how the teacher's `OAuth2Client` drives token exchange. The
//! service-account path issues the `urn:ietf:params:oauth:grant-type:jwt-bearer`
//! grant directly over `reqwest`: that grant type has no typestate helper in
//! `oauth2` 5.0, so we compose the form body by hand the way the teacher's
//! `IntrospectionClient` does for its own non-standard endpoint.

use std::path::PathBuf;

use bridge_core::config::AuthOptions;
use bridge_core::error::BridgeError;
use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, ClientSecret, RefreshToken, TokenResponse, TokenUrl};
use serde::Deserialize;

use crate::cache::{cache_key, TokenCache};
use crate::credential::{CachedToken, Credential, OAuthSource};
use crate::jwt::sign_service_account_assertion;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Deserialize)]
struct AuthorizedUserFields {
    client_id: String,
    client_secret: String,
    refresh_token: String,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ServiceAccountFields {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
}

enum CredentialsFile {
    AuthorizedUser(AuthorizedUserFields),
    ServiceAccount(ServiceAccountFields),
}

fn parse_credentials_file(contents: &str, path: &std::path::Path) -> Result<CredentialsFile, BridgeError> {
    let value: serde_json::Value = serde_json::from_str(contents).map_err(|e| {
        BridgeError::Config(format!(
            "OAuth credentials file {} is not valid JSON: {e}",
            path.display()
        ))
    })?;
    let kind = value
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| BridgeError::Config(format!(
            "OAuth credentials file {} has no \"type\" field",
            path.display()
        )))?;
    match kind {
        "authorized_user" => serde_json::from_value(value)
            .map(CredentialsFile::AuthorizedUser)
            .map_err(|e| BridgeError::Config(format!("malformed authorized_user credentials: {e}"))),
        "service_account" => serde_json::from_value(value)
            .map(CredentialsFile::ServiceAccount)
            .map_err(|e| BridgeError::Config(format!("malformed service_account credentials: {e}"))),
        other => Err(BridgeError::UnsupportedCredentialType {
            kind: other.to_string(),
        }),
    }
}

/// Resolve an OAuth credential per spec §4.C step 2: direct env token,
/// then the authorized_user/service_account credentials file flow.
pub async fn resolve(
    options: &AuthOptions,
    http: &reqwest::Client,
    cache: &TokenCache,
) -> Result<Credential, BridgeError> {
    if let Some(token) = non_empty(std::env::var(&options.oauth_token_primary_env_var).ok()) {
        return Ok(Credential::OAuth {
            access_token: token,
            source: OAuthSource::EnvToken,
        });
    }
    if let Some(alt) = &options.oauth_token_alt_env_var {
        if let Some(token) = non_empty(std::env::var(alt).ok()) {
            return Ok(Credential::OAuth {
                access_token: token,
                source: OAuthSource::EnvToken,
            });
        }
    }

    let path = credentials_path(options)?;
    let contents = std::fs::read_to_string(&path).map_err(|e| BridgeError::Config(format!(
        "failed to read OAuth credentials file {}: {e}",
        path.display()
    )))?;
    let parsed = parse_credentials_file(&contents, &path)?;

    match parsed {
        CredentialsFile::AuthorizedUser(fields) => {
            resolve_authorized_user(
                &path,
                &fields.client_id,
                &fields.client_secret,
                &fields.refresh_token,
                fields.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI),
                http,
                cache,
            )
            .await
        }
        CredentialsFile::ServiceAccount(fields) => {
            if options.oauth_scopes.is_empty() {
                return Err(BridgeError::Config(
                    "service_account credentials require at least one OAuth scope".to_string(),
                ));
            }
            resolve_service_account(
                &path,
                &fields.client_email,
                &fields.private_key,
                &options.oauth_scopes,
                fields.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI),
                http,
                cache,
            )
            .await
        }
    }
}

async fn resolve_authorized_user(
    path: &std::path::Path,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
    token_uri: &str,
    http: &reqwest::Client,
    cache: &TokenCache,
) -> Result<Credential, BridgeError> {
    let key = cache_key(&path.to_string_lossy(), "authorized_user", &[]);
    if let Some(cached) = cache.get(&key) {
        if cached.is_fresh(Utc::now()) {
            tracing::debug!("authorized_user token cache hit");
            return Ok(Credential::OAuth {
                access_token: cached.access_token,
                source: OAuthSource::AuthorizedUser,
            });
        }
    }
    tracing::debug!(token_uri, "refreshing authorized_user access token");

    let client = BasicClient::new(ClientId::new(client_id.to_string()))
        .set_client_secret(ClientSecret::new(client_secret.to_string()))
        .set_auth_uri(
            AuthUrl::new("https://accounts.google.com/o/oauth2/auth".to_string())
                .map_err(|e| BridgeError::Config(e.to_string()))?,
        )
        .set_token_uri(TokenUrl::new(token_uri.to_string()).map_err(|e| BridgeError::Config(e.to_string()))?);

    let http_client = http.clone();
    let response = client
        .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
        .request_async(&http_client)
        .await
        .map_err(|e| BridgeError::TokenExchangeFailure {
            status: 0,
            message: e.to_string(),
        })?;

    let access_token = response.access_token().secret().clone();
    let expires_at = response
        .expires_in()
        .map(|d| Utc::now() + chrono::Duration::from_std(d).unwrap_or_default());

    cache.put(
        key,
        CachedToken {
            access_token: access_token.clone(),
            expires_at,
            source: OAuthSource::AuthorizedUser,
        },
    );

    Ok(Credential::OAuth {
        access_token,
        source: OAuthSource::AuthorizedUser,
    })
}

async fn resolve_service_account(
    path: &std::path::Path,
    client_email: &str,
    private_key: &str,
    scopes: &[String],
    token_uri: &str,
    http: &reqwest::Client,
    cache: &TokenCache,
) -> Result<Credential, BridgeError> {
    let key = cache_key(&path.to_string_lossy(), "service_account", scopes);
    if let Some(cached) = cache.get(&key) {
        if cached.is_fresh(Utc::now()) {
            tracing::debug!("service_account token cache hit");
            return Ok(Credential::OAuth {
                access_token: cached.access_token,
                source: OAuthSource::ServiceAccount,
            });
        }
    }
    tracing::debug!(client_email, token_uri, "exchanging service_account assertion for an access token");

    let now_s = Utc::now().timestamp();
    let assertion = sign_service_account_assertion(client_email, private_key, scopes, token_uri, now_s)
        .map_err(|e| BridgeError::TokenExchangeFailure {
            status: 0,
            message: format!("failed to sign JWT assertion: {e}"),
        })?;

    #[derive(Deserialize)]
    struct TokenResponseBody {
        access_token: String,
        expires_in: Option<i64>,
    }

    let response = http
        .post(token_uri)
        .form(&[
            ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
            ("assertion", assertion.as_str()),
        ])
        .send()
        .await
        .map_err(|e| BridgeError::TokenExchangeFailure {
            status: 0,
            message: e.to_string(),
        })?;

    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BridgeError::TokenExchangeFailure {
            status,
            message: body,
        });
    }

    let body: TokenResponseBody = response
        .json()
        .await
        .map_err(|e| BridgeError::TokenExchangeFailure {
            status,
            message: format!("malformed token response: {e}"),
        })?;

    let expires_at = body
        .expires_in
        .map(|secs| Utc::now() + chrono::Duration::seconds(secs));

    cache.put(
        key,
        CachedToken {
            access_token: body.access_token.clone(),
            expires_at,
            source: OAuthSource::ServiceAccount,
        },
    );

    Ok(Credential::OAuth {
        access_token: body.access_token,
        source: OAuthSource::ServiceAccount,
    })
}

fn credentials_path(options: &AuthOptions) -> Result<PathBuf, BridgeError> {
    if let Ok(path) = std::env::var(&options.application_default_credentials_path_env_var) {
        if !path.is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = std::env::var("HOME").map_err(|_| {
        BridgeError::Config("HOME is not set; cannot locate default OAuth credentials".to_string())
    })?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join(&options.vendor_config_dir_name)
        .join("application_default_credentials.json"))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn base_options() -> AuthOptions {
        AuthOptions {
            inline_api_key: None,
            primary_env_var: "unused".to_string(),
            alt_env_var: None,
            key_file_env_var: None,
            key_file_paths: Vec::new(),
            oauth_scopes: vec!["https://www.googleapis.com/auth/cloud-platform".to_string()],
            oauth_token_primary_env_var: "BRIDGE_TEST_OAUTH_TOKEN".to_string(),
            oauth_token_alt_env_var: Some("BRIDGE_TEST_OAUTH_TOKEN_ALT".to_string()),
            application_default_credentials_path_env_var: "BRIDGE_TEST_ADC_PATH".to_string(),
            vendor_config_dir_name: "gcloud".to_string(),
        }
    }

    #[tokio::test]
    #[serial(env)]
    async fn direct_env_token_bypasses_the_credentials_file() {
        std::env::set_var("BRIDGE_TEST_OAUTH_TOKEN", "direct-token");
        let cache = TokenCache::new();
        let http = reqwest::Client::new();
        let cred = resolve(&base_options(), &http, &cache).await.unwrap();
        match cred {
            Credential::OAuth { access_token, source } => {
                assert_eq!(access_token, "direct-token");
                assert_eq!(source, OAuthSource::EnvToken);
            }
            Credential::ApiKey { .. } => panic!("expected OAuth"),
        }
        std::env::remove_var("BRIDGE_TEST_OAUTH_TOKEN");
    }

    #[test]
    fn unsupported_credential_type_is_rejected() {
        let raw = r#"{"type": "service_account", "client_email": "a@b", "private_key": "key"}"#;
        let path = std::path::Path::new("/tmp/creds.json");
        assert!(matches!(parse_credentials_file(raw, path), Ok(CredentialsFile::ServiceAccount(_))));

        let raw_bad = r#"{"type": "something_else"}"#;
        let err = parse_credentials_file(raw_bad, path).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::UnsupportedCredentialType { kind } if kind == "something_else"
        ));
    }
}
