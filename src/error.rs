//! Transport and session errors.
//!
//! DESIGN
//! ======
//! Failed calls are classified by what the caller can do about them:
//! `Unauthorized` may be recovered by a credential refresh, everything else
//! propagates. The display message of an HTTP failure is the server's own
//! `detail` text when it sent one, so presentation code can show it verbatim.

use serde_json::Value;

// =============================================================================
// TRANSPORT ERROR
// =============================================================================

/// Errors produced by a single HTTP exchange with the identity service.
///
/// `Clone` so one refresh outcome can be handed to every waiter when refreshes
/// are coalesced.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// No response was received (connect failure, timeout, broken body).
    #[error("network error: {message}")]
    Network { message: String },

    /// The service answered 401.
    #[error("{message}")]
    Unauthorized { message: String, body: Value },

    /// The service answered with a 4xx other than 401.
    #[error("{message}")]
    Client { status: u16, message: String, body: Value },

    /// The service answered with a 5xx.
    #[error("{message}")]
    Server { status: u16, message: String, body: Value },

    /// A success body could not be decoded into the expected type.
    #[error("response decode failed: {0}")]
    Decode(String),

    /// The base URL and path do not form a valid URL.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl TransportError {
    /// Classify a non-success HTTP status and its decoded body.
    #[must_use]
    pub fn from_status(status: u16, body: Value) -> Self {
        let message = extract_detail(&body).unwrap_or_else(|| generic_message(status));
        match status {
            401 => Self::Unauthorized { message, body },
            500..=599 => Self::Server { status, message, body },
            _ => Self::Client { status, message, body },
        }
    }

    pub(crate) fn network(err: &reqwest::Error) -> Self {
        Self::Network { message: err.to_string() }
    }

    /// HTTP status of the failed exchange, if the service answered.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(401),
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Decoded error body, if the service answered.
    #[must_use]
    pub fn body(&self) -> Option<&Value> {
        match self {
            Self::Unauthorized { body, .. } | Self::Client { body, .. } | Self::Server { body, .. } => Some(body),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Server { .. })
    }

    /// Stable machine-readable code for logs and CLI output.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "E_NETWORK",
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::Client { .. } => "E_CLIENT",
            Self::Server { .. } => "E_SERVER",
            Self::Decode(_) => "E_DECODE",
            Self::InvalidUrl(_) => "E_INVALID_URL",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }
}

fn generic_message(status: u16) -> String {
    format!("request failed with status {status}")
}

/// Pull a human-readable message out of a DRF error body.
///
/// `{"detail": "..."}` wins; otherwise the first message of a field-error
/// list such as `{"non_field_errors": ["..."]}` or `{"email": ["..."]}`.
pub(crate) fn extract_detail(body: &Value) -> Option<String> {
    let object = body.as_object()?;
    if let Some(detail) = object.get("detail").and_then(Value::as_str) {
        return Some(detail.to_owned());
    }
    object
        .values()
        .filter_map(Value::as_array)
        .find_map(|messages| messages.first().and_then(Value::as_str))
        .map(str::to_owned)
}

// =============================================================================
// SESSION ERROR
// =============================================================================

/// Errors from session operations that require a signed-in user.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The operation needs a signed-in user and there is none.
    #[error("not signed in")]
    NotAuthenticated,
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
