//! Header policy for the two backend auth shapes (spec §4.G).

use bridge_core::error::BridgeError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Which credential the request will authenticate with.
#[derive(Debug, Clone)]
pub enum AuthHeader<'a> {
    Bearer {
        access_token: &'a str,
        quota_project: Option<&'a str>,
    },
    ApiKey {
        api_key: &'a str,
    },
}

/// Build the auth headers for one outbound request. Neither variant is
/// reachable without a credential — [`BridgeError::MissingAuth`] is the
/// caller's responsibility to raise before calling this (spec §4.G).
pub fn build_headers(auth: &AuthHeader<'_>) -> Result<HeaderMap, BridgeError> {
    let mut headers = HeaderMap::new();
    match auth {
        AuthHeader::Bearer {
            access_token,
            quota_project,
        } => {
            let value = HeaderValue::from_str(&format!("Bearer {access_token}"))
                .map_err(|e| BridgeError::Config(format!("invalid bearer token: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
            if let Some(project) = quota_project {
                let value = HeaderValue::from_str(project)
                    .map_err(|e| BridgeError::Config(format!("invalid quota project: {e}")))?;
                headers.insert(
                    HeaderName::from_static("x-goog-user-project"),
                    value,
                );
            }
        }
        AuthHeader::ApiKey { api_key } => {
            let value = HeaderValue::from_str(api_key)
                .map_err(|e| BridgeError::Config(format!("invalid API key: {e}")))?;
            headers.insert(HeaderName::from_static("x-goog-api-key"), value);
        }
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_sends_quota_project_header_when_configured() {
        let headers = build_headers(&AuthHeader::Bearer {
            access_token: "xyz",
            quota_project: Some("q"),
        })
        .unwrap();
        assert_eq!(headers.get("authorization").unwrap(), "Bearer xyz");
        assert_eq!(headers.get("x-goog-user-project").unwrap(), "q");
    }

    #[test]
    fn bearer_without_quota_project_omits_the_header() {
        let headers = build_headers(&AuthHeader::Bearer {
            access_token: "xyz",
            quota_project: None,
        })
        .unwrap();
        assert!(headers.get("x-goog-user-project").is_none());
    }

    #[test]
    fn api_key_path_never_sends_quota_project() {
        let headers = build_headers(&AuthHeader::ApiKey { api_key: "k" }).unwrap();
        assert_eq!(headers.get("x-goog-api-key").unwrap(), "k");
        assert!(headers.get("x-goog-user-project").is_none());
        assert!(headers.get("authorization").is_none());
    }
}
