//! Error types for the requester API client.
//!
//! # Design
//! One closed enum covers every failure an operation can surface. Each
//! variant carries only its own payload, so callers match on the variant
//! (or on [`ErrorKind`]) to drive their own retry policy instead of parsing
//! message text.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Retry delay used when a 429 response has no usable `Retry-After` header.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Code reported for envelope failures that carry no `errorCode`.
pub const UNKNOWN_ERROR_CODE: &str = "UNKNOWN_ERROR";

/// Code for bodies that are not a well-formed envelope, or whose `data` does
/// not match the operation's result type.
pub const INVALID_RESPONSE_CODE: &str = "INVALID_RESPONSE";

/// Code for request payloads that could not be encoded as JSON.
pub const SERIALIZATION_ERROR_CODE: &str = "SERIALIZATION_ERROR";

/// Errors returned by `RequesterApi` parse methods and `YachaqClient`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdkError {
    /// 401 from the server, a rejected API key, or no key to authenticate with.
    #[error("authentication error: {message}")]
    Authentication { message: String },

    /// The server rejected the input; `errors` holds the field-level messages
    /// in the order the server sent them.
    #[error("validation error: {message} ({})", .errors.join("; "))]
    Validation { message: String, errors: Vec<String> },

    /// The requester's tier does not permit the checked request shape.
    #[error("tier restriction: {message} ({})", .violations.join("; "))]
    TierRestriction {
        message: String,
        violations: Vec<String>,
    },

    /// A capsule failed signature, schema or receipt verification.
    #[error("verification error: {message}")]
    Verification { message: String },

    /// Connection failure, timeout, closed client, or a 5xx status.
    #[error("network error: {message}")]
    Network { message: String },

    /// 429 from the server.
    #[error("rate limited: {message} (retry after {retry_after}s)")]
    RateLimit { message: String, retry_after: u64 },

    /// Any other envelope failure. `code` is the server-supplied `errorCode`,
    /// or one of the client-side codes defined in this module.
    #[error("{code}: {message}")]
    Api { code: String, message: String },
}

/// Fieldless discriminant of [`SdkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authentication,
    Validation,
    TierRestriction,
    Verification,
    Network,
    RateLimit,
    Application,
}

impl ErrorKind {
    /// Stable wire code of the kind.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Authentication => "AUTH_ERROR",
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::TierRestriction => "TIER_RESTRICTION",
            ErrorKind::Verification => "VERIFICATION_ERROR",
            ErrorKind::Network => "NETWORK_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::Application => UNKNOWN_ERROR_CODE,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl SdkError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SdkError::Authentication { .. } => ErrorKind::Authentication,
            SdkError::Validation { .. } => ErrorKind::Validation,
            SdkError::TierRestriction { .. } => ErrorKind::TierRestriction,
            SdkError::Verification { .. } => ErrorKind::Verification,
            SdkError::Network { .. } => ErrorKind::Network,
            SdkError::RateLimit { .. } => ErrorKind::RateLimit,
            SdkError::Api { .. } => ErrorKind::Application,
        }
    }

    /// The error code. For [`SdkError::Api`] this is the server-supplied code.
    pub fn code(&self) -> &str {
        match self {
            SdkError::Api { code, .. } => code,
            other => other.kind().code(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SdkError::Authentication { message }
            | SdkError::Validation { message, .. }
            | SdkError::TierRestriction { message, .. }
            | SdkError::Verification { message }
            | SdkError::Network { message }
            | SdkError::RateLimit { message, .. }
            | SdkError::Api { message, .. } => message,
        }
    }

    /// How long the server asked us to wait, for rate-limit errors.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            SdkError::RateLimit { retry_after, .. } => Some(Duration::from_secs(*retry_after)),
            _ => None,
        }
    }

    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        SdkError::Authentication {
            message: message.into(),
        }
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        SdkError::Network {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_response(message: impl Into<String>) -> Self {
        SdkError::Api {
            code: INVALID_RESPONSE_CODE.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn serialization(err: serde_json::Error) -> Self {
        SdkError::Api {
            code: SERIALIZATION_ERROR_CODE.to_string(),
            message: format!("failed to encode request body: {err}"),
        }
    }
}
