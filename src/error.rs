//! Error types and classification for the resilience layer
//!
//! This module is the single policy point that maps raw failures to the
//! retry taxonomy, decides recovery eligibility, and derives the short
//! user-facing messages shown by the app. Raw backend error text is never
//! surfaced to users directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ClassificationConfig;

/// Result type alias for resilience operations
pub type Result<T> = std::result::Result<T, ResilienceError>;

/// Error types produced by, or passed through, the resilience layer
#[derive(Error, Debug)]
pub enum ResilienceError {
    /// Network absence or connection-level failures
    #[error("Network error: {0}")]
    Network(String),

    /// Operation exceeded its deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Caller lacks permission for the requested resource
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Invalid or expired credentials
    #[error("Authentication failed: {0}")]
    AuthCredential(String),

    /// Backend-client internal assertion fault (stale connection state)
    #[error("Backend assertion failure: {0}")]
    InternalAssertion(String),

    /// Raw backend error carrying a wire error code
    #[error("Backend error [{code}]: {message}")]
    Backend { code: String, message: String },

    /// Local persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Fixed error taxonomy used for retry decisions and user messaging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Network,
    Permission,
    NotFound,
    AlreadyExists,
    Timeout,
    AuthCredential,
    InternalAssertion,
    Unknown,
}

/// Explicit mapping from known backend wire codes to the taxonomy.
///
/// This table is the contract surface for classification: adding or removing
/// a code changes which errors are retried, queued, or failed fast.
const CODE_TABLE: &[(&str, ErrorKind)] = &[
    ("unavailable", ErrorKind::Network),
    ("network-request-failed", ErrorKind::Network),
    ("deadline-exceeded", ErrorKind::Timeout),
    ("cancelled", ErrorKind::Timeout),
    ("permission-denied", ErrorKind::Permission),
    ("unauthenticated", ErrorKind::AuthCredential),
    ("invalid-credential", ErrorKind::AuthCredential),
    ("user-token-expired", ErrorKind::AuthCredential),
    ("not-found", ErrorKind::NotFound),
    ("already-exists", ErrorKind::AlreadyExists),
    ("internal", ErrorKind::InternalAssertion),
];

/// Message signatures for backend-client faults that carry no usable code.
///
/// Matched case-insensitively as substrings, in order.
const MESSAGE_SIGNATURES: &[(&str, ErrorKind)] = &[
    ("internal assertion failed", ErrorKind::InternalAssertion),
    ("unexpected state", ErrorKind::InternalAssertion),
    ("transport errored", ErrorKind::InternalAssertion),
    ("stale stream", ErrorKind::InternalAssertion),
    ("network request failed", ErrorKind::Network),
    ("no connectivity", ErrorKind::Network),
];

/// Look up a backend wire code in the classification table.
pub fn kind_for_code(code: &str) -> Option<ErrorKind> {
    let code = code.to_lowercase();
    CODE_TABLE
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, kind)| *kind)
}

fn kind_for_message(message: &str) -> Option<ErrorKind> {
    let message = message.to_lowercase();
    MESSAGE_SIGNATURES
        .iter()
        .find(|(sig, _)| message.contains(sig))
        .map(|(_, kind)| *kind)
}

/// Classify an error into the fixed taxonomy.
///
/// Backend errors are resolved through the code table first, then through
/// the message signature list. Anything unmatched is `Unknown`, which is
/// treated as non-retryable.
pub fn classify(error: &ResilienceError) -> ErrorKind {
    match error {
        ResilienceError::Network(_) => ErrorKind::Network,
        ResilienceError::Timeout(_) => ErrorKind::Timeout,
        ResilienceError::PermissionDenied(_) => ErrorKind::Permission,
        ResilienceError::NotFound(_) => ErrorKind::NotFound,
        ResilienceError::AlreadyExists(_) => ErrorKind::AlreadyExists,
        ResilienceError::AuthCredential(_) => ErrorKind::AuthCredential,
        ResilienceError::InternalAssertion(_) => ErrorKind::InternalAssertion,
        ResilienceError::Backend { code, message } => kind_for_code(code)
            .or_else(|| kind_for_message(message))
            .unwrap_or(ErrorKind::Unknown),
        ResilienceError::Storage(_) => ErrorKind::Unknown,
        ResilienceError::Json(_) => ErrorKind::Unknown,
        ResilienceError::Internal(_) => ErrorKind::Unknown,
    }
}

/// Decide whether an error should be retried, honoring per-code overrides
/// from the classification config. Overrides beat the built-in table.
pub fn is_retryable(error: &ResilienceError, config: &ClassificationConfig) -> bool {
    if let Some(code) = error.backend_code() {
        let code = code.to_lowercase();
        if config.fatal_codes.iter().any(|c| c.to_lowercase() == code) {
            return false;
        }
        if config
            .retryable_codes
            .iter()
            .any(|c| c.to_lowercase() == code)
        {
            return true;
        }
    }
    classify(error).is_retryable()
}

/// Check whether an error matches the fixed set of backend-client fault
/// signatures that warrant a connection recovery sequence.
pub fn is_recovery_eligible(error: &ResilienceError) -> bool {
    match classify(error) {
        ErrorKind::InternalAssertion => true,
        _ => matches!(
            error.backend_code().map(str::to_lowercase).as_deref(),
            Some("unavailable") | Some("deadline-exceeded")
        ),
    }
}

impl ErrorKind {
    /// Whether failures of this kind are expected to resolve on retry
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Network | ErrorKind::Timeout | ErrorKind::InternalAssertion
        )
    }

    /// Stable, deterministic user-facing message for this kind
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::Network => "You appear to be offline. We'll retry as soon as you're back.",
            ErrorKind::Timeout => "The request took too long. Please try again.",
            ErrorKind::Permission => "You don't have permission to do that.",
            ErrorKind::NotFound => "We couldn't find what you were looking for.",
            ErrorKind::AlreadyExists => "That already exists.",
            ErrorKind::AuthCredential => "Your session has expired. Please sign in again.",
            ErrorKind::InternalAssertion => "Connection hiccup on our side. Reconnecting now.",
            ErrorKind::Unknown => "Something went wrong. Please try again later.",
        }
    }

    /// Short identifier used in logs and aggregated stats
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Network => "network",
            ErrorKind::Permission => "permission",
            ErrorKind::NotFound => "notFound",
            ErrorKind::AlreadyExists => "alreadyExists",
            ErrorKind::Timeout => "timeout",
            ErrorKind::AuthCredential => "authCredential",
            ErrorKind::InternalAssertion => "internalAssertion",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl ResilienceError {
    /// Create a network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create a permission-denied error
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create a not-found error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an already-exists error
    pub fn already_exists<S: Into<String>>(msg: S) -> Self {
        Self::AlreadyExists(msg.into())
    }

    /// Create an authentication/credential error
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        Self::AuthCredential(msg.into())
    }

    /// Create an internal-assertion error
    pub fn internal_assertion<S: Into<String>>(msg: S) -> Self {
        Self::InternalAssertion(msg.into())
    }

    /// Create a backend error with a wire code
    pub fn backend<C: Into<String>, S: Into<String>>(code: C, msg: S) -> Self {
        Self::Backend {
            code: code.into(),
            message: msg.into(),
        }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(anyhow::anyhow!(msg.into()))
    }

    /// The backend wire code, when this error carries one
    pub fn backend_code(&self) -> Option<&str> {
        match self {
            ResilienceError::Backend { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Classify this error into the fixed taxonomy
    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }

    /// User-facing message derived purely from the taxonomy
    pub fn user_message(&self) -> &'static str {
        self.kind().user_message()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn code_table_maps_known_codes() {
        assert_eq!(kind_for_code("unavailable"), Some(ErrorKind::Network));
        assert_eq!(kind_for_code("UNAVAILABLE"), Some(ErrorKind::Network));
        assert_eq!(kind_for_code("deadline-exceeded"), Some(ErrorKind::Timeout));
        assert_eq!(
            kind_for_code("permission-denied"),
            Some(ErrorKind::Permission)
        );
        assert_eq!(kind_for_code("not-found"), Some(ErrorKind::NotFound));
        assert_eq!(
            kind_for_code("already-exists"),
            Some(ErrorKind::AlreadyExists)
        );
        assert_eq!(
            kind_for_code("unauthenticated"),
            Some(ErrorKind::AuthCredential)
        );
        assert_eq!(
            kind_for_code("internal"),
            Some(ErrorKind::InternalAssertion)
        );
        assert_eq!(kind_for_code("definitely-not-a-code"), None);
    }

    #[test]
    fn unmatched_backend_errors_are_unknown_and_fatal() {
        let error = ResilienceError::backend("some-new-code", "mystery failure");
        assert_eq!(classify(&error), ErrorKind::Unknown);
        assert!(!is_retryable(&error, &ClassificationConfig::default()));
    }

    #[test]
    fn message_signatures_classify_assertion_faults() {
        let error = ResilienceError::backend(
            "",
            "FIRESTORE (9.6.1) INTERNAL ASSERTION FAILED: Unexpected state",
        );
        assert_eq!(classify(&error), ErrorKind::InternalAssertion);
        assert!(is_recovery_eligible(&error));
    }

    #[test]
    fn retryable_kinds() {
        assert!(ErrorKind::Network.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(ErrorKind::InternalAssertion.is_retryable());
        assert!(!ErrorKind::Permission.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
        assert!(!ErrorKind::AlreadyExists.is_retryable());
        assert!(!ErrorKind::AuthCredential.is_retryable());
        assert!(!ErrorKind::Unknown.is_retryable());
    }

    #[test]
    fn config_overrides_beat_builtin_table() {
        let mut config = ClassificationConfig::default();
        config.fatal_codes.push("unavailable".to_string());
        let error = ResilienceError::backend("unavailable", "backend down");
        assert!(!is_retryable(&error, &config));

        let mut config = ClassificationConfig::default();
        config.retryable_codes.push("resource-exhausted".to_string());
        let error = ResilienceError::backend("resource-exhausted", "quota");
        assert!(is_retryable(&error, &config));
    }

    #[test]
    fn recovery_eligibility_is_a_fixed_contract() {
        assert!(is_recovery_eligible(&ResilienceError::backend(
            "unavailable",
            "backend down"
        )));
        assert!(is_recovery_eligible(&ResilienceError::backend(
            "deadline-exceeded",
            "slow"
        )));
        assert!(is_recovery_eligible(&ResilienceError::internal_assertion(
            "stale channel"
        )));
        assert!(!is_recovery_eligible(&ResilienceError::network("offline")));
        assert!(!is_recovery_eligible(&ResilienceError::permission_denied(
            "nope"
        )));
    }

    #[test]
    fn user_messages_are_deterministic() {
        let a = ResilienceError::backend("unavailable", "raw text one");
        let b = ResilienceError::backend("unavailable", "completely different raw text");
        assert_eq!(a.user_message(), b.user_message());
        // Raw backend text never leaks into the user message.
        assert!(!a.user_message().contains("raw text"));
    }
}
