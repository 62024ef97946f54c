use thiserror::Error;

use crate::encoder::FileValidationError;

/// Shown when neither the server nor the transport says what went wrong.
pub const FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

/// Top-level error type for the `buildmart-api` crate.
///
/// The gateway never returns these to callers directly: each one is folded
/// into a failed `Envelope` via [`Error::user_message`]. They stay typed so
/// the folding rules live in one place and logs keep the full cause.
#[derive(Debug, Error)]
pub enum Error {
    // ── Encoding ────────────────────────────────────────────────────
    /// Upload validation failed before anything was sent.
    #[error(transparent)]
    Encoding(#[from] FileValidationError),

    /// The payload can't be expressed for this request (e.g. files on a GET).
    #[error("Unsupported request: {0}")]
    Unsupported(&'static str),

    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The spawned request task died before producing a response.
    #[error("Request task failed: {0}")]
    Task(String),

    // ── Server ──────────────────────────────────────────────────────
    /// Non-2xx status. `message` is whatever the body said, if anything.
    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("request failed"))]
    Status { status: u16, message: Option<String> },

    /// A 2xx body that wasn't JSON.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Build from a `reqwest` error, mapping timeouts to [`Error::Timeout`].
    pub fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout { timeout_secs }
        } else {
            Self::Transport(err)
        }
    }

    /// Message for a failed envelope: the server's own message when one was
    /// received, otherwise this error's description, otherwise a fallback.
    pub fn user_message(&self) -> String {
        let message = match self {
            Self::Status {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            Self::Status { status, .. } => reqwest::StatusCode::from_u16(*status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .map_or_else(|| format!("HTTP {status}"), |r| format!("HTTP {status} {r}")),
            other => other.to_string(),
        };
        if message.trim().is_empty() {
            FALLBACK_MESSAGE.to_owned()
        } else {
            message
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::Violation;

    #[test]
    fn server_message_wins() {
        let err = Error::Status {
            status: 422,
            message: Some("The name field is required.".into()),
        };
        assert_eq!(err.user_message(), "The name field is required.");
    }

    #[test]
    fn status_without_message_uses_reason() {
        let err = Error::Status {
            status: 500,
            message: None,
        };
        assert_eq!(err.user_message(), "HTTP 500 Internal Server Error");
    }

    #[test]
    fn blank_server_message_is_ignored() {
        let err = Error::Status {
            status: 404,
            message: Some("  ".into()),
        };
        assert_eq!(err.user_message(), "HTTP 404 Not Found");
    }

    #[test]
    fn encoding_errors_describe_violations() {
        let err = Error::from(FileValidationError {
            field: "logo".into(),
            violations: vec![Violation::TooManyFiles {
                count: 3,
                max_files: 2,
            }],
        });
        assert_eq!(
            err.user_message(),
            "invalid upload for `logo`: 3 files given, at most 2 allowed"
        );
    }
}
