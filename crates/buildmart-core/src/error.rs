// ── Core error types ──
//
// User-facing errors from buildmart-core. Store actions never return
// these: they are rendered into `StoreState::error`. Constructors and
// config translation return them directly.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Local preconditions ──────────────────────────────────────────
    /// The target isn't in the store, so nothing was sent.
    #[error("{entity} {identifier} not found")]
    NotFound { entity: String, identifier: String },

    /// An upload was asked for with nothing to send.
    #[error("No files to upload")]
    NoFiles,

    // ── Application errors ───────────────────────────────────────────
    /// The server answered `success: false` (or the gateway folded a
    /// transport failure into one).
    #[error("{message}")]
    Api { message: String },

    /// `success: true` but the payload didn't have the expected shape.
    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    // ── Setup ────────────────────────────────────────────────────────
    /// The gateway could not be built (bad TLS setup, unusable base URL).
    #[error("Configuration error: {message}")]
    Config { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_entity() {
        let err = CoreError::NotFound {
            entity: "Product".into(),
            identifier: "42".into(),
        };
        assert_eq!(err.to_string(), "Product 42 not found");
    }

    #[test]
    fn api_errors_show_the_server_message_verbatim() {
        let err = CoreError::Api {
            message: "not found".into(),
        };
        assert_eq!(err.to_string(), "not found");
    }
}
