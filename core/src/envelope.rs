//! Response classification.
//!
//! Every Requester API response is wrapped in the same JSON envelope:
//! `{success, data?, errorCode?, errorMessage?, validationErrors?}`.
//! Classification runs in a fixed order:
//!
//! 1. Reserved status codes short-circuit before the body is looked at:
//!    `401` is an authentication error, `429` a rate-limit error and any
//!    `5xx` a network error.
//! 2. Otherwise the body is parsed as an envelope. `success` with non-null
//!    `data` yields the data; a non-empty `validationErrors` list yields a
//!    validation error; anything else is a generic application error.
//!
//! A 401 with a validation-shaped body is still an authentication error, and
//! a 5xx body is never parsed.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SdkError, DEFAULT_RETRY_AFTER_SECS, UNKNOWN_ERROR_CODE};
use crate::http::HttpResponse;

const VALIDATION_FALLBACK_MESSAGE: &str = "Validation failed";
const REQUEST_FALLBACK_MESSAGE: &str = "Request failed";

/// Uniform wire shape of every response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    /// Absent means failure.
    #[serde(default)]
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<Vec<String>>,
}

impl Envelope<Value> {
    /// Return the payload, or the error the envelope describes.
    ///
    /// `success: true` with absent or `null` data is a failure, never an
    /// empty success.
    pub fn into_data(mut self) -> Result<Value, SdkError> {
        if self.success {
            if let Some(data) = self.data.take().filter(|d| !d.is_null()) {
                return Ok(data);
            }
        }
        Err(self.into_failure())
    }

    fn into_failure(self) -> SdkError {
        match self.validation_errors {
            Some(errors) if !errors.is_empty() => SdkError::Validation {
                message: self
                    .error_message
                    .unwrap_or_else(|| VALIDATION_FALLBACK_MESSAGE.to_string()),
                errors,
            },
            _ => SdkError::Api {
                code: self
                    .error_code
                    .unwrap_or_else(|| UNKNOWN_ERROR_CODE.to_string()),
                message: self
                    .error_message
                    .unwrap_or_else(|| REQUEST_FALLBACK_MESSAGE.to_string()),
            },
        }
    }
}

/// Map reserved status codes to their error, before any body parsing.
pub fn check_status(response: &HttpResponse) -> Result<(), SdkError> {
    match response.status {
        401 => Err(SdkError::authentication(
            "Authentication required or token expired",
        )),
        429 => Err(SdkError::RateLimit {
            message: "Rate limit exceeded".to_string(),
            retry_after: retry_after_secs(response),
        }),
        status if status >= 500 => Err(SdkError::network(format!("Server error: {status}"))),
        _ => Ok(()),
    }
}

/// `Retry-After` as whole seconds; anything missing or unparseable falls back
/// to [`DEFAULT_RETRY_AFTER_SECS`].
fn retry_after_secs(response: &HttpResponse) -> u64 {
    response
        .header("retry-after")
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

/// Parse the body as an envelope with an untyped payload.
pub fn parse_envelope(response: &HttpResponse) -> Result<Envelope<Value>, SdkError> {
    serde_json::from_str(&response.body).map_err(|e| {
        SdkError::invalid_response(format!(
            "HTTP {} body is not a response envelope: {e}",
            response.status
        ))
    })
}

/// Classify a response and return its payload unchanged.
///
/// Used by endpoints whose `data` is an array or otherwise unstructured.
pub fn classify_raw(response: &HttpResponse) -> Result<Value, SdkError> {
    check_status(response)?;
    parse_envelope(response)?.into_data()
}

/// Classify a response and deserialize its payload into `T`.
pub fn classify<T: DeserializeOwned>(response: &HttpResponse) -> Result<T, SdkError> {
    let data = classify_raw(response)?;
    from_data(data)
}

/// Deserialize an already-classified payload.
pub fn from_data<T: DeserializeOwned>(data: Value) -> Result<T, SdkError> {
    serde_json::from_value(data).map_err(|e| {
        SdkError::invalid_response(format!(
            "response data does not match {}: {e}",
            short_type_name::<T>()
        ))
    })
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full)
}
