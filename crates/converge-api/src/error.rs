use thiserror::Error;

/// Top-level error type for the `converge-api` crate.
///
/// Covers every failure mode of a remote call: authentication, transport,
/// structured API rejections, and response decoding.
/// `converge-core` wraps these without reinterpreting them.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Token rejected or missing.
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── API ─────────────────────────────────────────────────────────
    /// Structured error returned by the remote endpoint.
    #[error("API error (HTTP {status}): {message}")]
    Api {
        message: String,
        code: Option<String>,
        status: u16,
    },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the remote side reported the resource as absent.
    ///
    /// Refresh callbacks use this to turn a 404 into the synthetic
    /// "absent" status instead of failing the wait episode.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Api { status: 404, .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the remote side rejected the call because another
    /// transition is still in flight.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Api { status: 409, .. })
    }

    /// Returns `true` if this is a transient error worth retrying.
    ///
    /// The engine itself never retries; this is exposed for callers that
    /// wrap the client with their own policy.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Api { status, .. } => matches!(status, 429 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Extract the API error code, if available.
    pub fn api_error_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_404_is_not_found() {
        let err = Error::Api {
            message: "cluster not found".into(),
            code: Some("not_found".into()),
            status: 404,
        };
        assert!(err.is_not_found());
        assert!(!err.is_transient());
        assert_eq!(err.api_error_code(), Some("not_found"));
    }

    #[test]
    fn api_409_is_conflict_not_transient() {
        let err = Error::Api {
            message: "cluster is busy".into(),
            code: None,
            status: 409,
        };
        assert!(err.is_conflict());
        assert!(!err.is_not_found());
        assert!(!err.is_transient());
    }

    #[test]
    fn api_503_is_transient() {
        let err = Error::Api {
            message: "unavailable".into(),
            code: None,
            status: 503,
        };
        assert!(err.is_transient());
    }

    #[test]
    fn deserialization_is_neither() {
        let err = Error::Deserialization {
            message: "expected value".into(),
            body: "<html>".into(),
        };
        assert!(!err.is_not_found());
        assert!(!err.is_transient());
        assert!(err.api_error_code().is_none());
    }
}
