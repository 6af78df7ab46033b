// gateway-core/src/core/category.rs
// ============================================================================
// Module: Gateway Error Taxonomy
// Description: The 9-variant error category shared by steps, DLQ entries, and logs.
// Purpose: Give every layer of the pipeline a single vocabulary for failure classification.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! `ErrorCategory` is the one piece of vocabulary every collaborator agrees
//! on: the sandbox, the HTTP dispatcher, the auth provider, and the retry
//! worker all produce and consume the same nine variants so that retry
//! policy and DLQ classification stay centralized.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Category
// ============================================================================

/// Failure classification attached to a step, DLQ entry, or execution log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// The outbound request exceeded its configured timeout.
    Timeout,
    /// A transport-level failure occurred before a response was received.
    Network,
    /// The receiver returned a 5xx status.
    ServerError,
    /// The receiver returned 429 or the local rate limiter denied the attempt.
    RateLimit,
    /// The receiver returned a non-retriable 4xx status.
    ClientError,
    /// Credential resolution or token refresh failed, or token expiration was detected.
    AuthError,
    /// The payload failed transform (script or mapping) in a way attributable to the data.
    DataError,
    /// The payload failed structural validation before transform.
    ValidationError,
    /// An uncaught or unclassifiable failure.
    Unknown,
}

impl ErrorCategory {
    /// Returns whether a failure of this category should be retried under DLQ policy.
    ///
    /// `AuthError` is retriable only after the cached token has been cleared; callers
    /// that have not yet cleared the token should not treat it as retriable twice in a
    /// row without evidence of a fresh attempt.
    #[must_use]
    pub const fn is_retriable(self) -> bool {
        matches!(
            self,
            Self::RateLimit | Self::Timeout | Self::Network | Self::ServerError | Self::AuthError
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Timeout => "TIMEOUT",
            Self::Network => "NETWORK",
            Self::ServerError => "SERVER_ERROR",
            Self::RateLimit => "RATE_LIMIT",
            Self::ClientError => "CLIENT_ERROR",
            Self::AuthError => "AUTH_ERROR",
            Self::DataError => "DATA_ERROR",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCategory;

    #[test]
    fn client_and_data_errors_are_terminal() {
        assert!(!ErrorCategory::ClientError.is_retriable());
        assert!(!ErrorCategory::DataError.is_retriable());
        assert!(!ErrorCategory::ValidationError.is_retriable());
        assert!(!ErrorCategory::Unknown.is_retriable());
    }

    #[test]
    fn transient_categories_are_retriable() {
        assert!(ErrorCategory::Timeout.is_retriable());
        assert!(ErrorCategory::Network.is_retriable());
        assert!(ErrorCategory::ServerError.is_retriable());
        assert!(ErrorCategory::RateLimit.is_retriable());
        assert!(ErrorCategory::AuthError.is_retriable());
    }
}
