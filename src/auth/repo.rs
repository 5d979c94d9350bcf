use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use crate::error::ApiError;

const UNIQUE_VIOLATION: &str = "23505";

fn is_unique_violation(code: Option<&str>) -> bool {
    code == Some(UNIQUE_VIOLATION)
}

/// Two registrations racing past the duplicate-email check resolve at the
/// primary key; the loser gets the same 400 the check would have given,
/// not a storage failure.
fn dup_email_to_validation(err: sqlx::Error) -> ApiError {
    match &err {
        sqlx::Error::Database(db) if is_unique_violation(db.code().as_deref()) => {
            ApiError::Validation("Email already registered".into())
        }
        _ => err.into(),
    }
}

/// User record. Email is the primary key; the hash is absent for identities
/// that originate from a federated login.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub email: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Admin record, kept in its own table.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Admin {
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<User>, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT email, full_name, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn create(
        db: &PgPool,
        email: &str,
        full_name: &str,
        password_hash: Option<&str>,
    ) -> Result<User, ApiError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, full_name, password_hash)
            VALUES ($1, $2, $3)
            RETURNING email, full_name, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(full_name)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(dup_email_to_validation)?;
        Ok(user)
    }
}

impl Admin {
    pub async fn find_by_email(db: &PgPool, email: &str) -> Result<Option<Admin>, ApiError> {
        let admin = sqlx::query_as::<_, Admin>(
            r#"
            SELECT email, password_hash, created_at
            FROM admins
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(admin)
    }

    pub async fn create(db: &PgPool, email: &str, password_hash: &str) -> Result<Admin, ApiError> {
        let admin = sqlx::query_as::<_, Admin>(
            r#"
            INSERT INTO admins (email, password_hash)
            VALUES ($1, $2)
            RETURNING email, password_hash, created_at
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(dup_email_to_validation)?;
        Ok(admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_sqlstate_23505_counts_as_duplicate() {
        assert!(is_unique_violation(Some("23505")));
        assert!(!is_unique_violation(Some("40001")));
        assert!(!is_unique_violation(None));
    }

    #[test]
    fn non_duplicate_errors_stay_storage_errors() {
        let err = dup_email_to_validation(sqlx::Error::RowNotFound);
        assert!(matches!(err, ApiError::Storage(_)));
    }
}
