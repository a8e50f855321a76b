//! Token Cache (spec §4.B).
//!
//! Keyed on `"<credentials-path>|<kind>[|<scopes-comma-joined>]"`, never
//! persisted to disk. Mirrors the teacher's `OAuth2Provider` token cache in
//! shape — a lock-guarded map behind a hand-written `Debug` impl — but
//! without the LRU eviction policy, since the key space here is bounded by
//! the number of distinct credential files configured, not by request
//! volume.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::credential::CachedToken;

/// Build a cache key from the resolved credentials path, the credential
/// `type`, and (for service accounts) the sorted, comma-joined scope set.
pub fn cache_key(path: &str, kind: &str, scopes: &[String]) -> String {
    if scopes.is_empty() {
        format!("{path}|{kind}")
    } else {
        let mut sorted = scopes.to_vec();
        sorted.sort();
        format!("{path}|{kind}|{}", sorted.join(","))
    }
}

#[derive(Clone, Default)]
pub struct TokenCache {
    inner: Arc<Mutex<HashMap<String, CachedToken>>>,
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("entries", &self.inner.lock().len())
            .finish()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<CachedToken> {
        self.inner.lock().get(key).cloned()
    }

    pub fn put(&self, key: String, token: CachedToken) {
        self.inner.lock().insert(key, token);
    }

    pub fn evict(&self, key: &str) {
        self.inner.lock().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::OAuthSource;
    use chrono::Utc;

    #[test]
    fn put_then_get_round_trips() {
        let cache = TokenCache::new();
        let key = cache_key("/tmp/creds.json", "authorized_user", &[]);
        cache.put(
            key.clone(),
            CachedToken {
                access_token: "tok".to_string(),
                expires_at: None,
                source: OAuthSource::AuthorizedUser,
            },
        );
        assert_eq!(cache.get(&key).unwrap().access_token, "tok");
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn evict_removes_entry() {
        let cache = TokenCache::new();
        let key = cache_key("/tmp/creds.json", "service_account", &["a".into(), "b".into()]);
        cache.put(
            key.clone(),
            CachedToken {
                access_token: "tok".to_string(),
                expires_at: Some(Utc::now()),
                source: OAuthSource::ServiceAccount,
            },
        );
        cache.evict(&key);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn cache_key_sorts_scopes_for_stability() {
        let a = cache_key("/p", "service_account", &["b".into(), "a".into()]);
        let b = cache_key("/p", "service_account", &["a".into(), "b".into()]);
        assert_eq!(a, b);
    }
}
