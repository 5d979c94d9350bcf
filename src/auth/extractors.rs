use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::dto::{Claims, JwtKeys};
use crate::error::ApiError;
use crate::sessions::{repo as sessions_repo, Role};
use crate::state::AppState;

/// A verified credential backed by a live session, any role. This is the
/// verification gate: signature and expiry first, then the session store —
/// a stolen-but-still-signed token is useless once its session row is gone.
pub struct SessionIdentity {
    pub email: String,
    pub role: Role,
    pub device_id: Uuid,
}

/// Identity restricted to the user space.
pub struct AuthSession {
    pub email: String,
    pub device_id: Uuid,
}

/// Identity restricted to the admin space.
pub struct AdminSession {
    pub email: String,
    pub device_id: Uuid,
}

async fn resolve(parts: &mut Parts, state: &AppState) -> Result<Claims, ApiError> {
    let auth_header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Auth("Missing Authorization header".into()))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .ok_or_else(|| ApiError::Auth("Invalid Authorization header".into()))?;

    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify(token).map_err(|_| {
        warn!("invalid or expired token");
        ApiError::Auth("Invalid or expired token".into())
    })?;

    // Signature alone is not enough: the session bound to this device id
    // must still be live (not logged out, not evicted by the cap).
    let session =
        sessions_repo::find_live(&state.db, &claims.sub, claims.role, claims.device_id).await?;
    if session.is_none() {
        warn!(subject = %claims.sub, device_id = %claims.device_id, "credential without live session");
        return Err(ApiError::Auth(
            "Your session has expired or is invalid. Please log in again.".into(),
        ));
    }

    Ok(claims)
}

#[async_trait]
impl FromRequestParts<AppState> for SessionIdentity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = resolve(parts, state).await?;
        Ok(SessionIdentity {
            email: claims.sub,
            role: claims.role,
            device_id: claims.device_id,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = resolve(parts, state).await?;
        if claims.role != Role::User {
            return Err(ApiError::Auth("User credential required".into()));
        }
        Ok(AuthSession {
            email: claims.sub,
            device_id: claims.device_id,
        })
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminSession {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let claims = resolve(parts, state).await?;
        if claims.role != Role::Admin {
            return Err(ApiError::Auth("Admin credential required".into()));
        }
        Ok(AdminSession {
            email: claims.sub,
            device_id: claims.device_id,
        })
    }
}
