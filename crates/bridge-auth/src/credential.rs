//! The resolved-credential and cache-entry types (spec §3).

use chrono::{DateTime, Utc};

/// Where an [`ApiKey`](Credential::ApiKey) credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeySource {
    Config,
    EnvPrimary,
    EnvAlt,
    File,
}

/// Where an [`OAuth`](Credential::OAuth) credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthSource {
    EnvToken,
    AuthorizedUser,
    ServiceAccount,
}

/// A resolved credential (spec §3). Never implements `Display`; its
/// `Debug` impl is hand-written so an accidental `{:?}` in a log line
/// can't leak the secret.
pub enum Credential {
    ApiKey {
        value: String,
        source: ApiKeySource,
    },
    OAuth {
        access_token: String,
        source: OAuthSource,
    },
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::ApiKey { source, .. } => f
                .debug_struct("Credential::ApiKey")
                .field("value", &"[redacted]")
                .field("source", source)
                .finish(),
            Credential::OAuth { source, .. } => f
                .debug_struct("Credential::OAuth")
                .field("access_token", &"[redacted]")
                .field("source", source)
                .finish(),
        }
    }
}

/// A token held in the [`crate::cache::TokenCache`] (spec §3).
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub source: OAuthSource,
}

impl CachedToken {
    const SKEW: chrono::Duration = chrono::Duration::seconds(60);

    /// A token with no expiry is treated as long-lived; one with an expiry
    /// is fresh only if it clears the 60-second skew window (spec §4.C).
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            None => true,
            Some(expires_at) => expires_at - now > Self::SKEW,
        }
    }
}
