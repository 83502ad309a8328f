//! Error types for card controls
//!
//! Every failure is one of six kinds. Workflows wrap the first failing step
//! with their own operation label; the label never hides the inner kind.

use std::fmt;

use thiserror::Error;

/// Result type for card-control operations
pub type Result<T> = std::result::Result<T, CardControlError>;

/// Status classification reported by a downstream collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownstreamStatus {
    /// Service unreachable or overloaded
    Unavailable,
    /// Call did not complete in time
    DeadlineExceeded,
    /// Service rejected the payload
    InvalidArgument,
    /// Service refused the caller
    PermissionDenied,
    /// Service reported a resource as missing
    NotFound,
    /// Service failed internally
    Internal,
    /// Anything else
    Unknown,
}

impl fmt::Display for DownstreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unavailable => "unavailable",
            Self::DeadlineExceeded => "deadline exceeded",
            Self::InvalidArgument => "invalid argument",
            Self::PermissionDenied => "permission denied",
            Self::NotFound => "not found",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Kind of a card-control failure, independent of any operation label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationFailure,
    PermissionDenied,
    NotFound,
    FeatureDisabled,
    AlreadyExists,
    DownstreamFailure,
}

/// Card-control error types
#[derive(Debug, Clone, Error)]
pub enum CardControlError {
    /// Malformed input
    #[error("Invalid input: {field} - {reason}")]
    ValidationFailure { field: String, reason: String },

    /// Caller does not own the card, or the card state disallows the action
    #[error("Permission denied: {reason}")]
    PermissionDenied { reason: String },

    /// Expected resource is missing
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Requested control type is switched off
    #[error("Control type {control_type} is disabled")]
    FeatureDisabled { control_type: String },

    /// Requested controls are already configured exactly as asked
    #[error("Control already configured: {detail}")]
    AlreadyExists { detail: String },

    /// A collaborator call failed
    #[error("{service} call failed ({status}): {message}")]
    Downstream {
        service: String,
        status: DownstreamStatus,
        message: String,
    },

    /// A failure wrapped with the label of the workflow it aborted
    #[error("{operation}: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<CardControlError>,
    },
}

impl CardControlError {
    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ValidationFailure {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a permission error
    pub fn permission_denied(reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            reason: reason.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a downstream error
    pub fn downstream(
        service: impl Into<String>,
        status: DownstreamStatus,
        message: impl Into<String>,
    ) -> Self {
        Self::Downstream {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// Wrap with a workflow label
    ///
    /// An already-labeled error keeps its original cause and takes the new
    /// label, so the chain is never more than one level deep.
    pub fn labeled(self, operation: &'static str) -> Self {
        let source = match self {
            Self::Operation { source, .. } => source,
            other => Box::new(other),
        };
        Self::Operation { operation, source }
    }

    /// The error with any operation label stripped
    pub fn root(&self) -> &CardControlError {
        match self {
            Self::Operation { source, .. } => source.root(),
            other => other,
        }
    }

    /// Operation label, if one was applied
    pub fn operation(&self) -> Option<&'static str> {
        match self {
            Self::Operation { operation, .. } => Some(operation),
            _ => None,
        }
    }

    /// Classify the failure
    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::ValidationFailure { .. } => ErrorKind::ValidationFailure,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::FeatureDisabled { .. } => ErrorKind::FeatureDisabled,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::Downstream { .. } | Self::Operation { .. } => ErrorKind::DownstreamFailure,
        }
    }

    /// Downstream status, if the root cause is a collaborator failure
    pub fn downstream_status(&self) -> Option<DownstreamStatus> {
        match self.root() {
            Self::Downstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(
            self.downstream_status(),
            Some(DownstreamStatus::Unavailable | DownstreamStatus::DeadlineExceeded)
        )
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::ValidationFailure => "VALIDATION_FAILURE",
            ErrorKind::PermissionDenied => "PERMISSION_DENIED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::FeatureDisabled => "FEATURE_DISABLED",
            ErrorKind::AlreadyExists => "ALREADY_EXISTS",
            ErrorKind::DownstreamFailure => "DOWNSTREAM_FAILURE",
        }
    }
}
