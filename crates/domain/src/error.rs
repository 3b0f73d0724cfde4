//! Error classification shared by every layer.

use serde::{Deserialize, Serialize};

/// Caller-facing category of a failed negotiation request.
///
/// Every domain, store, and service error maps to exactly one kind. The HTTP
/// layer turns the kind into a status code; callers use it to decide whether
/// to refetch, change their input, or give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The offer or listing does not exist (or is not visible).
    NotFound,

    /// The caller is not a party to the offer, or it is not their turn.
    Forbidden,

    /// The request is illegal for the offer's current state or carries bad input.
    BadRequest,

    /// The offer changed underneath the request; refetch and retry.
    Conflict,

    /// The caller exceeded the request rate limit.
    TooManyRequests,

    /// Infrastructure failure unrelated to the caller's input.
    Internal,
}

impl ErrorKind {
    /// Returns the kind as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TooManyRequests => "too_many_requests",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
