use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use super::{evict_count, ClientMeta, Role, SESSION_CAP};
use crate::error::ApiError;
use crate::tx::{is_retryable, MAX_TX_ATTEMPTS};

/// Live device binding for one authenticated identity. Sessions are never
/// updated in place: created on login, deleted on logout or eviction.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub subject: String,
    pub role: String,
    pub device_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Advisory lock key for one login identity. Concurrent logins for the same
/// (subject, role) must serialize: row locks alone cannot enforce the cap,
/// because a transaction that blocked on another login's rows resumes with
/// the evicted rows gone and the new insert invisible to its snapshot, then
/// counts too few sessions. FNV-1a rather than the std hasher so every
/// server process derives the same key.
fn identity_lock_key(subject: &str, role: Role) -> i64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in subject.bytes().chain([0u8]).chain(role.as_str().bytes()) {
        h ^= u64::from(byte);
        h = h.wrapping_mul(0x0000_0100_0000_01b3);
    }
    h as i64
}

/// Create a session for (subject, role), evicting the oldest session(s)
/// inside the same transaction whenever the cap would be exceeded. The
/// transaction takes a per-identity advisory lock first, so two logins for
/// the same identity never count sessions concurrently; if eviction fails
/// the transaction rolls back and the insert never happens.
pub async fn create_session(
    db: &PgPool,
    subject: &str,
    role: Role,
    device_id: Uuid,
    meta: &ClientMeta,
) -> Result<Uuid, ApiError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match create_session_tx(db, subject, role, device_id, meta).await {
            Ok(id) => return Ok(id),
            Err(e) if is_retryable(&e) && attempt < MAX_TX_ATTEMPTS => {
                warn!(subject, attempt, error = %e, "session create lost a race, retrying");
            }
            Err(e) if is_retryable(&e) => {
                return Err(ApiError::Conflict(
                    "login conflicted with concurrent requests, please retry".into(),
                ))
            }
            Err(e) => return Err(e),
        }
    }
}

async fn create_session_tx(
    db: &PgPool,
    subject: &str,
    role: Role,
    device_id: Uuid,
    meta: &ClientMeta,
) -> Result<Uuid, ApiError> {
    let mut tx = db.begin().await?;

    // Serialize logins per identity. Held until commit or rollback.
    sqlx::query(r#"SELECT pg_advisory_xact_lock($1)"#)
        .bind(identity_lock_key(subject, role))
        .execute(&mut *tx)
        .await?;

    let existing: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id
        FROM sessions
        WHERE subject = $1 AND role = $2
        ORDER BY created_at ASC
        FOR UPDATE
        "#,
    )
    .bind(subject)
    .bind(role.as_str())
    .fetch_all(&mut *tx)
    .await?;

    for (old_id,) in existing.iter().take(evict_count(existing.len(), SESSION_CAP)) {
        sqlx::query(r#"DELETE FROM sessions WHERE id = $1"#)
            .bind(old_id)
            .execute(&mut *tx)
            .await?;
        info!(subject, session_id = %old_id, "session cap reached, evicted oldest");
    }

    let session_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO sessions (id, subject, role, device_id, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(session_id)
    .bind(subject)
    .bind(role.as_str())
    .bind(device_id)
    .bind(&meta.ip_address)
    .bind(&meta.user_agent)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    info!(subject, session_id = %session_id, device_id = %device_id, "session created");
    Ok(session_id)
}

/// Look up the live session a credential claims to belong to. `None` means
/// the session was logged out or evicted; the caller must reject the
/// credential even though its signature is still valid.
pub async fn find_live(
    db: &PgPool,
    subject: &str,
    role: Role,
    device_id: Uuid,
) -> Result<Option<Session>, ApiError> {
    let session = sqlx::query_as::<_, Session>(
        r#"
        SELECT id, subject, role, device_id, ip_address, user_agent, created_at
        FROM sessions
        WHERE subject = $1 AND role = $2 AND device_id = $3
        "#,
    )
    .bind(subject)
    .bind(role.as_str())
    .bind(device_id)
    .fetch_optional(db)
    .await?;
    Ok(session)
}

/// Delete the session bound to (subject, device_id). Idempotent: deleting an
/// already-absent session is not an error.
pub async fn destroy_session(
    db: &PgPool,
    subject: &str,
    device_id: Uuid,
) -> Result<(), ApiError> {
    let result = sqlx::query(r#"DELETE FROM sessions WHERE subject = $1 AND device_id = $2"#)
        .bind(subject)
        .bind(device_id)
        .execute(db)
        .await?;
    info!(subject, device_id = %device_id, deleted = result.rows_affected(), "session destroyed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_stable_per_identity() {
        let a = identity_lock_key("alice@example.com", Role::User);
        let b = identity_lock_key("alice@example.com", Role::User);
        assert_eq!(a, b);
    }

    #[test]
    fn lock_key_distinguishes_role_and_subject() {
        let user = identity_lock_key("alice@example.com", Role::User);
        let admin = identity_lock_key("alice@example.com", Role::Admin);
        let other = identity_lock_key("bob@example.com", Role::User);
        assert_ne!(user, admin);
        assert_ne!(user, other);
    }

    #[test]
    fn lock_key_separates_subject_from_role_suffix() {
        // "xuser" as a subject must not collide with subject "x" + role user.
        let glued = identity_lock_key("xuser", Role::User);
        let split = identity_lock_key("x", Role::User);
        assert_ne!(glued, split);
    }
}
