use thiserror::Error;

/// Errors surfaced by upstream client implementations
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Upstream response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("No upstream identity found for MBI {mbi}")]
    IdentityNotFound { mbi: String },

    #[error("Upstream client error: {0}")]
    Other(String),
}

impl UpstreamError {
    /// Create a new Status error
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create a new IdentityNotFound error
    pub fn identity_not_found(mbi: impl Into<String>) -> Self {
        Self::IdentityNotFound { mbi: mbi.into() }
    }

    /// Create a new Other error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}
