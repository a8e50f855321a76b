//! Dual-backend URL composition (spec §4.G, §6).
//!
//! Both URL shapes must be reproduced bit-exactly:
//! - Developer: `<base>/models/<name>:<verb>`
//! - Vertex: `<region>-aiplatform.googleapis.com/v1/projects/<project>/locations/<region>/publishers/<publisher>/models/<name>:<verb>`

use bridge_core::config::{Backend, VertexConfig};
use percent_encoding::{percent_encode, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters a model name's path segment must escape: everything
/// `NON_ALPHANUMERIC` flags except the RFC 3986 unreserved marks
/// (`-`, `.`, `_`, `~`) that real model ids are built from.
const MODEL_NAME_UNSAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// The API verbs a model name can be suffixed with (spec §4.G).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    GenerateContent,
    StreamGenerateContent,
    CountTokens,
    EmbedContent,
    Predict,
}

impl Verb {
    pub fn as_str(self) -> &'static str {
        match self {
            Verb::GenerateContent => "generateContent",
            Verb::StreamGenerateContent => "streamGenerateContent",
            Verb::CountTokens => "countTokens",
            Verb::EmbedContent => "embedContent",
            Verb::Predict => "predict",
        }
    }
}

/// Strip a leading `models/` prefix so callers can pass either
/// `gemini-2.5-flash` or `models/gemini-2.5-flash` (spec §4.G).
fn strip_models_prefix(name: &str) -> &str {
    name.strip_prefix("models/").unwrap_or(name)
}

fn encode_model_name(name: &str) -> String {
    percent_encode(strip_models_prefix(name).as_bytes(), MODEL_NAME_UNSAFE).to_string()
}

/// Build the URL for a `models/<name>:<verb>` operation against either
/// backend shape.
pub fn model_url(backend: Backend, base_url: &str, vertex: Option<&VertexConfig>, model: &str, verb: Verb) -> String {
    let encoded = encode_model_name(model);
    match backend {
        Backend::Developer => {
            format!("{}/models/{encoded}:{}", base_url.trim_end_matches('/'), verb.as_str())
        }
        Backend::Vertex => {
            let vertex = vertex.expect("vertex backend requires VertexConfig");
            let root = vertex
                .api_base_url
                .clone()
                .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", vertex.location));
            format!(
                "{}/v1/projects/{}/locations/{}/publishers/google/models/{encoded}:{}",
                root.trim_end_matches('/'),
                vertex.project,
                vertex.location,
                verb.as_str()
            )
        }
    }
}

/// Build the `GET models` listing URL with optional pagination (spec §4.G).
pub fn list_models_url(
    backend: Backend,
    base_url: &str,
    vertex: Option<&VertexConfig>,
    page_size: Option<u32>,
    page_token: Option<&str>,
) -> String {
    let root = match backend {
        Backend::Developer => format!("{}/models", base_url.trim_end_matches('/')),
        Backend::Vertex => {
            let vertex = vertex.expect("vertex backend requires VertexConfig");
            let base = vertex
                .api_base_url
                .clone()
                .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com", vertex.location));
            format!(
                "{}/v1/projects/{}/locations/{}/publishers/google/models",
                base.trim_end_matches('/'),
                vertex.project,
                vertex.location
            )
        }
    };

    let mut query = Vec::new();
    if let Some(size) = page_size {
        query.push(format!("pageSize={size}"));
    }
    if let Some(token) = page_token {
        query.push(format!("pageToken={}", utf8_percent_encode(token, NON_ALPHANUMERIC)));
    }
    if query.is_empty() {
        root
    } else {
        format!("{root}?{}", query.join("&"))
    }
}

/// Rewrite a Vertex regional host (`<region>-aiplatform.…`) to the global
/// host (`aiplatform.…`) for the §4.G 404 retry. Returns `None` if the URL
/// does not contain a regional Vertex host.
pub fn rewrite_vertex_regional_to_global(url: &str) -> Option<String> {
    let marker = "-aiplatform.googleapis.com";
    let idx = url.find(marker)?;
    let scheme_end = url.find("://")? + 3;
    if idx <= scheme_end {
        return None;
    }
    let host_start = url[scheme_end..idx].rfind('.').map_or(scheme_end, |dot| scheme_end + dot + 1);
    let mut rewritten = String::with_capacity(url.len());
    rewritten.push_str(&url[..host_start]);
    rewritten.push_str(&url[idx + 1..]);
    Some(rewritten)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::config::VertexConfig;

    #[test]
    fn developer_url_strips_models_prefix_and_encodes() {
        let url = model_url(Backend::Developer, "https://x/v1", None, "models/gemini-2.5-flash", Verb::CountTokens);
        assert_eq!(url, "https://x/v1/models/gemini-2.5-flash:countTokens");
    }

    #[test]
    fn model_name_dashes_and_dots_are_left_unescaped() {
        assert_eq!(encode_model_name("gemini-2.5-flash"), "gemini-2.5-flash");
    }

    #[test]
    fn vertex_url_composes_project_location_publisher() {
        let vertex = VertexConfig {
            project: "p".to_string(),
            location: "us-central1".to_string(),
            quota_project: Some("q".to_string()),
            api_base_url: None,
        };
        let url = model_url(Backend::Vertex, "unused", Some(&vertex), "gemini-2.5-flash", Verb::GenerateContent);
        assert_eq!(
            url,
            "https://us-central1-aiplatform.googleapis.com/v1/projects/p/locations/us-central1/publishers/google/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn list_models_url_includes_pagination() {
        let url = list_models_url(Backend::Developer, "https://x/v1", None, Some(20), Some("tok"));
        assert_eq!(url, "https://x/v1/models?pageSize=20&pageToken=tok");
    }

    #[test]
    fn rewrites_regional_vertex_host_to_global() {
        let regional = "https://us-central1-aiplatform.googleapis.com/v1/projects/p/locations/us-central1/publishers/google/models";
        let global = rewrite_vertex_regional_to_global(regional).unwrap();
        assert_eq!(
            global,
            "https://aiplatform.googleapis.com/v1/projects/p/locations/us-central1/publishers/google/models"
        );
    }

    #[test]
    fn non_vertex_url_is_not_rewritten() {
        assert!(rewrite_vertex_regional_to_global("https://x/v1/models").is_none());
    }
}
