//! Portal transport error types.

use thiserror::Error;

/// Errors that can occur when talking to the grading portal.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The portal rejected the token.
    #[error("authentication failed: {0}")]
    Unauthorized(String),

    /// The exercise or submission does not exist on the portal.
    #[error("not found: {0}")]
    NotFound(String),

    /// The portal returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// The portal answered with something we cannot interpret.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A required URL or token is not configured.
    #[error("portal is not configured: {0}")]
    NotConfigured(&'static str),
}
