use sea_orm::error::DbErr;
use sea_orm::TransactionError;
use serde::Serialize;

/// Error taxonomy for the inventory core.
///
/// `NotFound` and `InsufficientStock` are expected, caller-facing
/// conditions and are not system faults. `Conflict` signals a lock or
/// serialization failure the caller should retry (see
/// [`crate::db::retry_on_conflict`]). Any error aborts the enclosing
/// transaction; nothing partially commits.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Whether retrying the whole transaction may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }

    /// Expected caller-facing conditions that should not be logged as
    /// system faults.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_)
                | ServiceError::InsufficientStock(_)
                | ServiceError::InvalidOperation(_)
                | ServiceError::ValidationError(_)
        )
    }
}

/// Unwraps sea-orm's transaction error wrapper back into a
/// `ServiceError`, mapping connection-level failures to database errors.
pub fn from_transaction_error(err: TransactionError<ServiceError>) -> ServiceError {
    match err {
        TransactionError::Connection(db_err) => ServiceError::db_error(db_err),
        TransactionError::Transaction(service_err) => service_err,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_the_only_retryable_error() {
        assert!(ServiceError::Conflict("lock timeout".into()).is_retryable());
        assert!(!ServiceError::NotFound("x".into()).is_retryable());
        assert!(!ServiceError::InsufficientStock("x".into()).is_retryable());
    }

    #[test]
    fn expected_errors_are_user_facing() {
        assert!(ServiceError::InsufficientStock("x".into()).is_expected());
        assert!(ServiceError::NotFound("x".into()).is_expected());
        assert!(!ServiceError::InternalError("x".into()).is_expected());
    }
}
