//! Curated model catalog hook (spec §6 glossary, SPEC_FULL.md supplement).
//!
//! The curated catalog itself — a static table of model names with feature
//! flags — is an external collaborator per spec §6 and is not implemented
//! here. [`ModelCatalog`] is the seam a caller plugs an implementation into
//! when `list_models` fails live; [`NoCatalog`] is the no-op default.

use async_trait::async_trait;
use serde_json::Value;

/// A fallback source of model metadata for `list_models` when the live
/// listing call fails.
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Return the curated listing, or `None` if this catalog has nothing
    /// to offer (e.g. not yet populated).
    async fn fallback_listing(&self) -> Option<Value>;
}

/// The default catalog: always defers to the live API, never supplies a
/// fallback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCatalog;

#[async_trait]
impl ModelCatalog for NoCatalog {
    async fn fallback_listing(&self) -> Option<Value> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_catalog_never_supplies_a_fallback() {
        assert!(NoCatalog.fallback_listing().await.is_none());
    }
}
