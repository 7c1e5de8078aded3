use thiserror::Error;

/// Errors surfaced by [`ApiClient`](crate::ApiClient) calls.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request never completed: DNS, connect, TLS, or timeout.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server rejected the bearer token (HTTP 401).
    #[error("Unauthorized")]
    Unauthorized,

    /// Any other non-success response, carrying the server's message when
    /// the body had one.
    #[error("Request failed with HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The response body did not match the expected shape.
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// True for HTTP 401, which callers treat as a dead session.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}
