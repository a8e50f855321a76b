//! Credential resolution and token caching (spec §4.B, §4.C).
//!
//! Multi-source discovery (inline config, environment, key files, OAuth
//! authorized-user, OAuth service-account) converges on a single
//! [`AuthResolver::resolve`] call; OAuth tokens are cached in a
//! [`cache::TokenCache`] keyed by credentials path, kind, and scope set.

pub mod cache;
pub mod credential;
pub mod jwt;
pub mod providers;
pub mod resolver;

pub use cache::TokenCache;
pub use credential::{ApiKeySource, CachedToken, Credential, OAuthSource};
pub use resolver::AuthResolver;
