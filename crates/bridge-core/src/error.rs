//! Error taxonomy shared across the bridge (spec §7).
//!
//! Every component raises one of these variants; the tool pipeline is the
//! single place that turns a `BridgeError` into a caller-safe message via
//! [`BridgeError::into_caller_message`].

use crate::redactor::Redactor;
use thiserror::Error;

/// The closed enumeration of error kinds described in spec §7.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Malformed configuration or an invalid flag combination.
    #[error("configuration error: {0}")]
    Config(String),

    /// No credential source in the chain produced usable credentials.
    #[error("no usable credentials found: {api_key_error}; {oauth_error}")]
    MissingCredentials {
        api_key_error: String,
        oauth_error: String,
    },

    /// A configured key file existed but was empty after trimming.
    #[error("credentials file at {path} was empty")]
    EmptyKeyFile { path: String },

    /// The credentials file named a `type` this resolver does not handle.
    #[error("unsupported credential type: {kind}")]
    UnsupportedCredentialType { kind: String },

    /// The OAuth token endpoint rejected a refresh or JWT-bearer exchange.
    #[error("token exchange failed ({status}): {message}")]
    TokenExchangeFailure { status: u16, message: String },

    /// More than `max_per_minute` admissions were attempted in the window.
    #[error("Rate limit exceeded ({max_per_minute}/minute).")]
    RateLimitExceeded { max_per_minute: u32 },

    /// The daily token budget has no remaining headroom and no approval
    /// policy can lift it.
    #[error("Budget exceeded ({used}/{max} tokens used today).")]
    BudgetExceeded { used: u64, max: u64 },

    /// The budget is over limit and the approval policy is `prompt`.
    #[error(
        "Budget approval required: increment {increment} tokens (used {used}/{max})."
    )]
    BudgetApprovalRequired {
        increment: u64,
        used: u64,
        max: u64,
    },

    /// The HTTP client hit a 401/403 with OAuth and the fallback policy is
    /// `prompt` rather than `auto`.
    #[error("API key fallback requires operator approval (status {status})")]
    ApiKeyFallbackPromptRequired { status: u16 },

    /// Neither a bearer token nor an API key was available to authenticate
    /// the outbound request.
    #[error("missing authentication: no access token or API key configured")]
    MissingAuth,

    /// A non-2xx response from the generative-model API.
    #[error("API error ({status}): {message}")]
    ApiError {
        status: u16,
        message: String,
        body: Option<serde_json::Value>,
    },

    /// The request was aborted by the caller or the configured timeout.
    #[error("request cancelled")]
    Cancelled,

    /// Anything not otherwise classified.
    #[error("Unexpected error")]
    Unexpected(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// One actionable hint per error kind, appended to the caller-safe message
/// by the pipeline's formatter (spec §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHint {
    ReAuthenticate,
    ApproveBudget,
    EnableFallback,
    CheckQuota,
    RetryLater,
    None,
}

impl ErrorHint {
    pub fn message(self) -> Option<&'static str> {
        match self {
            ErrorHint::ReAuthenticate => Some("Re-authenticate and try again."),
            ErrorHint::ApproveBudget => {
                Some("Run the budget approval step to raise today's token ceiling.")
            }
            ErrorHint::EnableFallback => {
                Some("Enable API-key fallback or approve it for this session.")
            }
            ErrorHint::CheckQuota => Some("Check your API key's quota or billing status."),
            ErrorHint::RetryLater => Some("This looks transient; retry in a moment."),
            ErrorHint::None => None,
        }
    }
}

impl BridgeError {
    /// Classify the kind of guidance a caller should receive, per spec §7's
    /// sub-cases for `ApiError` (401/403 → auth, 402/429 → quota, 5xx →
    /// retry) plus the obvious hints for the other variants.
    pub fn hint(&self) -> ErrorHint {
        match self {
            BridgeError::MissingCredentials { .. }
            | BridgeError::EmptyKeyFile { .. }
            | BridgeError::UnsupportedCredentialType { .. }
            | BridgeError::TokenExchangeFailure { .. }
            | BridgeError::MissingAuth => ErrorHint::ReAuthenticate,
            BridgeError::BudgetExceeded { .. } | BridgeError::BudgetApprovalRequired { .. } => {
                ErrorHint::ApproveBudget
            }
            BridgeError::ApiKeyFallbackPromptRequired { .. } => ErrorHint::EnableFallback,
            BridgeError::ApiError { status, .. } => match status {
                401 | 403 => ErrorHint::ReAuthenticate,
                402 | 429 => ErrorHint::CheckQuota,
                500..=599 => ErrorHint::RetryLater,
                _ => ErrorHint::None,
            },
            BridgeError::RateLimitExceeded { .. } => ErrorHint::RetryLater,
            BridgeError::Config(_) | BridgeError::Cancelled | BridgeError::Unexpected(_) => {
                ErrorHint::None
            }
        }
    }

    /// True when this error must never be charged against the daily budget
    /// (spec §7, §8: a cancelled reservation is released, not committed).
    pub fn is_cancellation(&self) -> bool {
        matches!(self, BridgeError::Cancelled)
    }

    /// Redact, cap, and attach a hint — the single formatter referenced in
    /// spec §7 that every caller-facing surface routes through.
    pub fn into_caller_message(self, redactor: &Redactor) -> String {
        const MAX_LEN: usize = 2000;
        let hint = self.hint();
        let redacted = redactor.redact_string(&self.to_string());
        let mut message = if redacted.chars().count() > MAX_LEN {
            let truncated: String = redacted.chars().take(MAX_LEN).collect();
            format!("{truncated}… (truncated)")
        } else {
            redacted
        };
        if let Some(hint) = hint.message() {
            message.push(' ');
            message.push_str(hint);
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_and_hints_on_auth_error() {
        let redactor = Redactor::new();
        let err = BridgeError::ApiError {
            status: 401,
            message: "Bearer abcdefghijklmnop rejected".to_string(),
            body: None,
        };
        let msg = err.into_caller_message(&redactor);
        assert!(!msg.contains("abcdefghijklmnop"));
        assert!(msg.contains("Re-authenticate"));
    }

    #[test]
    fn truncates_long_messages() {
        let redactor = Redactor::new();
        let err = BridgeError::Config("x".repeat(5000));
        let msg = err.into_caller_message(&redactor);
        assert!(msg.len() < 2100);
        assert!(msg.contains("truncated"));
    }

    #[test]
    fn cancellation_is_never_billable() {
        assert!(BridgeError::Cancelled.is_cancellation());
        assert!(!BridgeError::BudgetExceeded { used: 1, max: 1 }.is_cancellation());
    }
}
