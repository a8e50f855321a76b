//! Generative-model HTTP client and response extractors (spec §4.G, §4.J).
//!
//! [`client::ModelClient`] composes Developer and Vertex backend URLs and
//! headers, retries OAuth 401/403s against an API key, and rewrites Vertex
//! regional listing 404s to the global host. [`extractors`] are the pure
//! accessors the tool pipeline calls on the parsed response. [`streaming`]
//! decodes `streamGenerateContent` chunks once the response's content type
//! tells it which framing the upstream used.

pub mod catalog;
pub mod client;
pub mod extractors;
pub mod headers;
pub mod streaming;
pub mod url;

pub use catalog::{ModelCatalog, NoCatalog};
pub use client::ModelClient;
pub use streaming::{ChunkDecoder, StreamFraming};
pub use url::Verb;
