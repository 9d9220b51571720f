use kindred_shared::errors::{AppError, ErrorCode};

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// Rejected before any write, e.g. liking yourself.
    #[error("{0}")]
    InvalidOperation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("users are not matched")]
    NotMatched,

    #[error("message not found")]
    MessageNotFound,

    #[error("email is already registered")]
    EmailTaken,

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Storage(#[from] StoreError),

    /// A non-transactional operation failed after `completed_steps` writes were committed.
    #[error("{operation} stopped after {completed_steps} committed step(s): {source}")]
    PartialCompletion {
        operation: &'static str,
        completed_steps: usize,
        #[source]
        source: StoreError,
    },
}

pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

impl From<DiscoveryError> for AppError {
    fn from(err: DiscoveryError) -> Self {
        match err {
            DiscoveryError::InvalidOperation(msg) => AppError::new(ErrorCode::InvalidOperation, msg),
            DiscoveryError::NotFound(msg) => AppError::new(ErrorCode::NotFound, msg),
            DiscoveryError::NotMatched => {
                AppError::new(ErrorCode::NotMatched, "you are not matched with this user")
            }
            DiscoveryError::MessageNotFound => AppError::new(ErrorCode::MessageNotFound, "message not found"),
            DiscoveryError::EmailTaken => {
                AppError::new(ErrorCode::EmailAlreadyExists, "email is already registered")
            }
            DiscoveryError::Validation(msg) => AppError::Validation(msg),
            DiscoveryError::Storage(StoreError::UniqueViolation(constraint)) => {
                AppError::new(ErrorCode::Conflict, format!("conflicting record: {constraint}"))
            }
            DiscoveryError::Storage(StoreError::Database(e)) => AppError::Database(e),
            DiscoveryError::Storage(e) => {
                tracing::error!(error = %e, "storage failure");
                AppError::internal("storage failure")
            }
            DiscoveryError::PartialCompletion { operation, completed_steps, source } => {
                tracing::warn!(
                    operation,
                    completed_steps,
                    error = %source,
                    "operation partially applied"
                );
                AppError::with_details(
                    ErrorCode::PartialCompletion,
                    format!("{operation} was only partially applied, retry the request"),
                    serde_json::json!({ "operation": operation, "completed_steps": completed_steps }),
                )
            }
        }
    }
}
