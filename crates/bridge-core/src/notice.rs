//! Notices queued by the HTTP client when it takes a non-default path
//! (spec §3, §4.G). Drained by the tool pipeline after each request and
//! never persisted.

use serde::{Deserialize, Serialize};

/// A structured warning surfaced to the MCP caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    /// Currently always `"auth_fallback"`; kept as a string so new notice
    /// kinds don't require a breaking enum change downstream.
    #[serde(rename = "type")]
    pub kind: String,
    pub from: String,
    pub to: String,
    pub status: u16,
    pub message: String,
}

impl Notice {
    /// Build the one Notice kind this bridge currently emits: an
    /// OAuth→API-key authentication fallback (spec §4.G).
    pub fn auth_fallback(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: "auth_fallback".to_string(),
            from: "oauth".to_string(),
            to: "apiKey".to_string(),
            status,
            message: message.into(),
        }
    }

    /// Render as the warning line the pipeline prepends to tool output.
    pub fn as_warning_line(&self) -> String {
        format!(
            "⚠ Switched from OAuth/ADC to API key after a {} response: {}",
            self.status, self.message
        )
    }
}
