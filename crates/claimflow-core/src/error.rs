use thiserror::Error;

/// Core error types for claimflow domain operations
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("Invalid beneficiary id: {0}")]
    InvalidBeneficiaryId(String),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("UUID error: {0}")]
    UuidError(#[from] uuid::Error),
}

impl CoreError {
    /// Create a new UnsupportedResourceType error
    pub fn unsupported_resource_type(resource_type: impl Into<String>) -> Self {
        Self::UnsupportedResourceType(resource_type.into())
    }

    /// Create a new InvalidBeneficiaryId error
    pub fn invalid_beneficiary_id(id: impl Into<String>) -> Self {
        Self::InvalidBeneficiaryId(id.into())
    }

    /// Check if this error indicates unusable input rather than an
    /// infrastructure problem. Unusable input is never worth retrying.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedResourceType(_)
                | Self::InvalidBeneficiaryId(_)
                | Self::JsonError(_)
        )
    }
}

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;
