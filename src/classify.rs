//! Error classification and retryability rules.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// Error codes that indicate a timed-out request.
pub const TIMEOUT_CODES: &[&str] = &["ETIMEDOUT", "ECONNABORTED", "UND_ERR_CONNECT_TIMEOUT"];

/// Error codes that indicate a transport-level failure.
pub const NETWORK_CODES: &[&str] = &[
    "ECONNRESET",
    "ECONNREFUSED",
    "ENETUNREACH",
    "EHOSTUNREACH",
    "EPIPE",
    "EAI_AGAIN",
    "ENOTFOUND",
    "ERR_NETWORK",
    "UND_ERR_SOCKET",
];

/// Error codes that indicate the caller aborted the request.
pub const CANCELLED_CODES: &[&str] = &["ERR_CANCELED", "ABORT_ERR"];

/// Status codes that are retryable regardless of classification.
pub const RETRYABLE_STATUS_CODES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// Coarse semantic tag on an error; drives the default retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Classification {
    /// Transport failure before or during the exchange.
    Network,
    /// The request ran out of time.
    Timeout,
    /// 5xx response.
    Server,
    /// 429 response.
    RateLimit,
    /// Other 4xx response.
    Client,
    /// 401 or 403 response.
    Authentication,
    /// 404 response.
    NotFound,
    /// 400 or 422 response.
    Validation,
    /// The caller aborted the request.
    Cancelled,
    /// Nothing recognizable.
    Unknown,
}

impl Display for Classification {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Classification::Network => "network",
            Classification::Timeout => "timeout",
            Classification::Server => "server",
            Classification::RateLimit => "rateLimit",
            Classification::Client => "client",
            Classification::Authentication => "authentication",
            Classification::NotFound => "notFound",
            Classification::Validation => "validation",
            Classification::Cancelled => "cancelled",
            Classification::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// Classifies an error from its status code and/or error code.
///
/// Error-code tests take precedence over the status ladder; the timeout set
/// is checked before the network set so codes in both classify as timeout.
pub fn classify_error(status_code: Option<u16>, error_code: Option<&str>) -> Classification {
    if let Some(code) = error_code {
        if TIMEOUT_CODES.contains(&code) {
            return Classification::Timeout;
        }
        if NETWORK_CODES.contains(&code) {
            return Classification::Network;
        }
        if CANCELLED_CODES.contains(&code) {
            return Classification::Cancelled;
        }
    }

    if let Some(status) = status_code {
        return match status {
            429 => Classification::RateLimit,
            401 | 403 => Classification::Authentication,
            404 => Classification::NotFound,
            400 | 422 => Classification::Validation,
            s if s >= 500 => Classification::Server,
            s if s >= 400 => Classification::Client,
            _ => Classification::Unknown,
        };
    }

    Classification::Unknown
}

/// Whether an error with this classification (and optional status) is worth
/// retrying.
pub fn is_retryable_error(classification: Classification, status_code: Option<u16>) -> bool {
    if matches!(
        classification,
        Classification::Network
            | Classification::Timeout
            | Classification::Server
            | Classification::RateLimit
    ) {
        return true;
    }

    status_code.is_some_and(|s| RETRYABLE_STATUS_CODES.contains(&s))
}
