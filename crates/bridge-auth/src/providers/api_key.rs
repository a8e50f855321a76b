//! API-key resolution (spec §4.C).

use bridge_core::config::AuthOptions;
use bridge_core::error::BridgeError;

use crate::credential::{ApiKeySource, Credential};

/// Walk the API-key search order and return the first non-empty value
/// found: inline config, `primary_env_var`, `alt_env_var`, the first
/// existing path in `key_file_paths`, then the file named by
/// `key_file_env_var`.
pub fn resolve(options: &AuthOptions) -> Result<Credential, BridgeError> {
    if let Some(value) = non_empty(options.inline_api_key.clone()) {
        return Ok(Credential::ApiKey {
            value,
            source: ApiKeySource::Config,
        });
    }

    if let Some(value) = non_empty(std::env::var(&options.primary_env_var).ok()) {
        return Ok(Credential::ApiKey {
            value,
            source: ApiKeySource::EnvPrimary,
        });
    }

    if let Some(alt) = &options.alt_env_var {
        if let Some(value) = non_empty(std::env::var(alt).ok()) {
            return Ok(Credential::ApiKey {
                value,
                source: ApiKeySource::EnvAlt,
            });
        }
    }

    for path in &options.key_file_paths {
        if std::path::Path::new(path).exists() {
            return read_key_file(path);
        }
    }

    if let Some(env_var) = &options.key_file_env_var {
        if let Ok(path) = std::env::var(env_var) {
            if !path.is_empty() {
                return read_key_file(&path);
            }
        }
    }

    Err(BridgeError::Config(
        "no API key found in config, environment, or key files".to_string(),
    ))
}

fn read_key_file(path: &str) -> Result<Credential, BridgeError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| BridgeError::Config(format!("failed to read key file {path}: {e}")))?;
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Err(BridgeError::EmptyKeyFile {
            path: path.to_string(),
        });
    }
    Ok(Credential::ApiKey {
        value: trimmed.to_string(),
        source: ApiKeySource::File,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn base_options() -> AuthOptions {
        AuthOptions {
            inline_api_key: None,
            primary_env_var: "BRIDGE_TEST_PRIMARY_KEY".to_string(),
            alt_env_var: Some("BRIDGE_TEST_ALT_KEY".to_string()),
            key_file_env_var: Some("BRIDGE_TEST_KEY_FILE".to_string()),
            key_file_paths: Vec::new(),
            oauth_scopes: Vec::new(),
            oauth_token_primary_env_var: "unused".to_string(),
            oauth_token_alt_env_var: None,
            application_default_credentials_path_env_var: "unused".to_string(),
            vendor_config_dir_name: "gcloud".to_string(),
        }
    }

    #[test]
    #[serial(env)]
    fn inline_value_wins_over_everything() {
        let mut options = base_options();
        options.inline_api_key = Some("inline-key".to_string());
        let cred = resolve(&options).unwrap();
        match cred {
            Credential::ApiKey { value, source } => {
                assert_eq!(value, "inline-key");
                assert_eq!(source, ApiKeySource::Config);
            }
            Credential::OAuth { .. } => panic!("expected ApiKey"),
        }
    }

    #[test]
    #[serial(env)]
    fn falls_back_to_primary_env_var() {
        std::env::remove_var("BRIDGE_TEST_ALT_KEY");
        std::env::set_var("BRIDGE_TEST_PRIMARY_KEY", "primary-key");
        let cred = resolve(&base_options()).unwrap();
        match cred {
            Credential::ApiKey { value, source } => {
                assert_eq!(value, "primary-key");
                assert_eq!(source, ApiKeySource::EnvPrimary);
            }
            Credential::OAuth { .. } => panic!("expected ApiKey"),
        }
        std::env::remove_var("BRIDGE_TEST_PRIMARY_KEY");
    }

    #[test]
    #[serial(env)]
    fn empty_key_file_is_an_error() {
        std::env::remove_var("BRIDGE_TEST_PRIMARY_KEY");
        std::env::remove_var("BRIDGE_TEST_ALT_KEY");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "   \n").unwrap();
        let mut options = base_options();
        options.key_file_paths = vec![file.path().to_string_lossy().to_string()];
        let err = resolve(&options).unwrap_err();
        assert!(matches!(err, BridgeError::EmptyKeyFile { .. }));
    }

    #[test]
    #[serial(env)]
    fn trims_whitespace_from_key_file_contents() {
        std::env::remove_var("BRIDGE_TEST_PRIMARY_KEY");
        std::env::remove_var("BRIDGE_TEST_ALT_KEY");
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "  file-key \n").unwrap();
        let mut options = base_options();
        options.key_file_paths = vec![file.path().to_string_lossy().to_string()];
        let cred = resolve(&options).unwrap();
        match cred {
            Credential::ApiKey { value, .. } => assert_eq!(value, "file-key"),
            Credential::OAuth { .. } => panic!("expected ApiKey"),
        }
    }
}
