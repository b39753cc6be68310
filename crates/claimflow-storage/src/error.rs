//! Error types shared by all storage backends.

use std::fmt;

/// Errors that can occur during store operations.
///
/// Every operation may fail transiently; unless a caller matches one of the
/// specific variants below, a storage error should be treated as retryable.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested parent job does not exist.
    #[error("Job not found: {id}")]
    JobNotFound {
        /// Parent job id.
        id: i64,
    },

    /// The requested tenant does not exist.
    #[error("ACO not found: {id}")]
    AcoNotFound {
        /// Tenant UUID as a string.
        id: String,
    },

    /// The requested beneficiary does not exist in the lookup table.
    #[error("Beneficiary not found: {id}")]
    BeneficiaryNotFound {
        /// Beneficiary row id.
        id: i64,
    },

    /// A conditional status update matched no row. The job either holds a
    /// different status than expected or does not exist.
    #[error("Job {id} not updated: status was not {expected}")]
    JobNotUpdated {
        /// Parent job id.
        id: i64,
        /// The status the caller required the job to hold.
        expected: String,
    },

    /// Failed to reach the storage backend.
    #[error("Connection error: {message}")]
    ConnectionError {
        /// Description of the connection error.
        message: String,
    },

    /// The backend rejected or failed the operation.
    #[error("Database error: {message}")]
    Database {
        /// Description of the database error.
        message: String,
    },

    /// An internal storage error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `JobNotFound` error.
    #[must_use]
    pub fn job_not_found(id: i64) -> Self {
        Self::JobNotFound { id }
    }

    /// Creates a new `AcoNotFound` error.
    #[must_use]
    pub fn aco_not_found(id: impl Into<String>) -> Self {
        Self::AcoNotFound { id: id.into() }
    }

    /// Creates a new `BeneficiaryNotFound` error.
    #[must_use]
    pub fn beneficiary_not_found(id: i64) -> Self {
        Self::BeneficiaryNotFound { id }
    }

    /// Creates a new `JobNotUpdated` error.
    #[must_use]
    pub fn job_not_updated(id: i64, expected: impl Into<String>) -> Self {
        Self::JobNotUpdated {
            id,
            expected: expected.into(),
        }
    }

    /// Creates a new `ConnectionError` error.
    #[must_use]
    pub fn connection_error(message: impl Into<String>) -> Self {
        Self::ConnectionError {
            message: message.into(),
        }
    }

    /// Creates a new `Database` error.
    #[must_use]
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a job-not-found error.
    #[must_use]
    pub fn is_job_not_found(&self) -> bool {
        matches!(self, Self::JobNotFound { .. })
    }

    /// Returns `true` if this is a conditional-update miss.
    #[must_use]
    pub fn is_not_updated(&self) -> bool {
        matches!(self, Self::JobNotUpdated { .. })
    }

    /// Returns the error category for logging and monitoring.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::JobNotFound { .. }
            | Self::AcoNotFound { .. }
            | Self::BeneficiaryNotFound { .. } => ErrorCategory::NotFound,
            Self::JobNotUpdated { .. } => ErrorCategory::Conflict,
            Self::ConnectionError { .. } | Self::Database { .. } => {
                ErrorCategory::Infrastructure
            }
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A referenced record does not exist.
    NotFound,
    /// A compare-and-set matched no row.
    Conflict,
    /// Backend or connection failure.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "not_found"),
            Self::Conflict => write!(f, "conflict"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::job_not_found(12);
        assert_eq!(err.to_string(), "Job not found: 12");

        let err = StorageError::job_not_updated(12, "pending");
        assert_eq!(err.to_string(), "Job 12 not updated: status was not pending");
    }

    #[test]
    fn test_error_predicates() {
        assert!(StorageError::job_not_found(1).is_job_not_found());
        assert!(!StorageError::job_not_found(1).is_not_updated());
        assert!(StorageError::job_not_updated(1, "pending").is_not_updated());
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            StorageError::beneficiary_not_found(9).category(),
            ErrorCategory::NotFound
        );
        assert_eq!(
            StorageError::job_not_updated(1, "pending").category(),
            ErrorCategory::Conflict
        );
        assert_eq!(
            StorageError::database("boom").category(),
            ErrorCategory::Infrastructure
        );
    }
}
