use sea_orm::DbErr;
use thiserror::Error;

/// Failure classes surfaced by the permission engines.
///
/// Absent root entities on read paths are reported as `Ok(None)` rather than
/// `NotFound`; the variant is used when a lookup is the whole operation.
#[derive(Debug, Error)]
pub enum RbacError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A named template, version or role that the operation depends on is
    /// missing, or a uniqueness rule would be broken.
    #[error("{0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(#[from] DbErr),

    #[error("stored permission payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),
}

impl RbacError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Stable machine-readable code for the presentation layer.
    pub fn code(&self) -> &'static str {
        match self {
            RbacError::NotFound(_) => "NOT_FOUND",
            RbacError::InvalidArgument(_) => "INVALID_ARGUMENT",
            RbacError::Conflict(_) => "CONFLICT",
            RbacError::Storage(_) => "STORAGE_FAILURE",
            RbacError::Payload(_) => "PAYLOAD_MALFORMED",
        }
    }
}

pub type RbacResult<T> = Result<T, RbacError>;
