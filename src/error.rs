//! Error types for the UpCloud provider.

use thiserror::Error;

use crate::id::IdError;

/// Errors that can occur while serving a provider operation.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested remote object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A validation error occurred.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource or data source type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request to the cloud API could not be completed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The cloud API rejected the request.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the API.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// A composite resource ID could not be encoded or decoded.
    #[error("Invalid resource ID: {0}")]
    InvalidId(#[from] IdError),

    /// A poll loop gave up before the remote object reached its target state.
    #[error("max retries reached while waiting for {target} to become {desired} (last state: {last_state}, {attempts} attempts)")]
    MaxRetriesReached {
        /// What was being polled, e.g. `gateway 0a1b...`.
        target: String,
        /// The state that was waited for.
        desired: String,
        /// The last observed state.
        last_state: String,
        /// Number of fetches performed.
        attempts: u32,
    },

    /// The operation was cancelled because the provider is stopping.
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Resource already exists (create conflict).
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// Permission denied (authentication/authorization failure).
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Quota or rate limit exceeded.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Service temporarily unavailable.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation failed due to current state (precondition not met).
    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    /// Operation not implemented.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),
}

impl ProviderError {
    /// Returns true for errors that mean the remote object is gone.
    ///
    /// Adapters use this on read to drop the resource from state instead of
    /// failing the refresh.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true for authentication/authorization failures.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }

    /// Build an API error from a status code and message.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }
}

impl From<ProviderError> for tonic::Status {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound(msg) => tonic::Status::not_found(msg),
            ProviderError::Validation(msg) => tonic::Status::invalid_argument(msg),
            ProviderError::Configuration(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::UnknownResource(msg) => tonic::Status::not_found(msg),
            ProviderError::Serialization(err) => {
                tonic::Status::invalid_argument(format!("Serialization error: {}", err))
            },
            ProviderError::Http(err) => tonic::Status::unavailable(format!("HTTP error: {}", err)),
            ProviderError::Api { status, message } => {
                tonic::Status::unknown(format!("API error ({}): {}", status, message))
            },
            ProviderError::InvalidId(err) => tonic::Status::invalid_argument(err.to_string()),
            err @ ProviderError::MaxRetriesReached { .. } => {
                tonic::Status::deadline_exceeded(err.to_string())
            },
            ProviderError::Cancelled(msg) => tonic::Status::cancelled(msg),
            ProviderError::AlreadyExists(msg) => tonic::Status::already_exists(msg),
            ProviderError::PermissionDenied(msg) => tonic::Status::permission_denied(msg),
            ProviderError::ResourceExhausted(msg) => tonic::Status::resource_exhausted(msg),
            ProviderError::Unavailable(msg) => tonic::Status::unavailable(msg),
            ProviderError::FailedPrecondition(msg) => tonic::Status::failed_precondition(msg),
            ProviderError::Unimplemented(msg) => tonic::Status::unimplemented(msg),
        }
    }
}
