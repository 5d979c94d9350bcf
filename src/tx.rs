use crate::error::ApiError;

/// Attempts for a transactional body before surfacing `Conflict`. Room
/// reservation and session eviction both go through this bound.
pub const MAX_TX_ATTEMPTS: u32 = 3;

/// Postgres signals a lost optimistic race as a serialization failure (40001)
/// or a deadlock (40P01); both are safe to retry from the top of the
/// transaction because nothing committed.
pub fn is_retryable(err: &ApiError) -> bool {
    match err {
        ApiError::Storage(sqlx::Error::Database(db)) => {
            matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_storage_errors_are_retryable() {
        assert!(!is_retryable(&ApiError::Validation("x".into())));
        assert!(!is_retryable(&ApiError::Conflict("x".into())));
        assert!(!is_retryable(&ApiError::Storage(sqlx::Error::RowNotFound)));
    }
}
