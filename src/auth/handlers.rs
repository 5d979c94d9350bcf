use axum::{
    extract::{FromRef, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{
    dto::{
        AdminCredentials, AuthResponse, JwtKeys, LoginRequest, MeResponse, PublicUser,
        RegisterRequest,
    },
    extractors::{AuthSession, SessionIdentity},
    password::{hash_password, verify_password},
    repo::{Admin, User},
};
use crate::error::ApiError;
use crate::sessions::{repo as sessions_repo, ClientMeta, Role};
use crate::state::AppState;

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn client_meta(headers: &HeaderMap) -> ClientMeta {
    ClientMeta {
        ip_address: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
    }
}

/// Shared login tail: register a session under the cap, then sign a
/// credential bound to the fresh device id.
async fn start_session(
    state: &AppState,
    subject: &str,
    role: Role,
    meta: &ClientMeta,
) -> Result<(String, Uuid), ApiError> {
    let device_id = Uuid::new_v4();
    sessions_repo::create_session(&state.db, subject, role, device_id, meta).await?;
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(subject, device_id, role)?;
    Ok((token, device_id))
}

#[instrument(skip(state, headers, payload))]
pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.full_name.trim().is_empty() {
        return Err(ApiError::Validation("Full name is required".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Validation("Password too short".into()));
    }

    if User::find_by_email(&state.db, &payload.email).await?.is_some() {
        warn!(email = %payload.email, "email already registered");
        return Err(ApiError::Validation("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let user = User::create(&state.db, &payload.email, payload.full_name.trim(), Some(&hash))
        .await?;

    // Registration logs the user in.
    let meta = client_meta(&headers);
    let (token, device_id) = start_session(&state, &user.email, Role::User, &meta).await?;

    info!(email = %user.email, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            device_id,
            user: PublicUser {
                email: user.email,
                full_name: Some(user.full_name),
            },
        }),
    ))
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.is_empty() {
        return Err(ApiError::Validation("Password is required".into()));
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| {
            warn!(email = %payload.email, "login unknown email");
            ApiError::Auth("Invalid credentials".into())
        })?;

    // Federated identities carry no hash; password login is not available
    // for them.
    let hash = user.password_hash.as_deref().ok_or_else(|| {
        warn!(email = %user.email, "password login for federated identity");
        ApiError::Auth("Invalid credentials".into())
    })?;

    if !verify_password(&payload.password, hash)? {
        warn!(email = %user.email, "login invalid password");
        return Err(ApiError::Auth("Invalid credentials".into()));
    }

    let meta = client_meta(&headers);
    let (token, device_id) = start_session(&state, &user.email, Role::User, &meta).await?;

    info!(email = %user.email, "user logged in");
    Ok(Json(AuthResponse {
        token,
        device_id,
        user: PublicUser {
            email: user.email,
            full_name: Some(user.full_name),
        },
    }))
}

#[instrument(skip(state, payload))]
pub async fn admin_register(
    State(state): State<AppState>,
    Json(mut payload): Json<AdminCredentials>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        return Err(ApiError::Validation("Invalid email".into()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::Validation("Password too short".into()));
    }
    if Admin::find_by_email(&state.db, &payload.email).await?.is_some() {
        return Err(ApiError::Validation("Email already registered".into()));
    }

    let hash = hash_password(&payload.password)?;
    let admin = Admin::create(&state.db, &payload.email, &hash).await?;

    info!(email = %admin.email, "admin registered");
    Ok((
        StatusCode::CREATED,
        Json(PublicUser {
            email: admin.email,
            full_name: None,
        }),
    ))
}

#[instrument(skip(state, headers, payload))]
pub async fn admin_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<AdminCredentials>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();

    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(ApiError::Validation("Email and password are required".into()));
    }

    let admin = Admin::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(|| ApiError::Auth("Invalid credentials".into()))?;

    if !verify_password(&payload.password, &admin.password_hash)? {
        warn!(email = %admin.email, "admin login invalid password");
        return Err(ApiError::Auth("Invalid credentials".into()));
    }

    let meta = client_meta(&headers);
    let (token, device_id) = start_session(&state, &admin.email, Role::Admin, &meta).await?;

    info!(email = %admin.email, "admin logged in");
    Ok(Json(AuthResponse {
        token,
        device_id,
        user: PublicUser {
            email: admin.email,
            full_name: None,
        },
    }))
}

#[instrument(skip(state, identity))]
pub async fn logout(
    State(state): State<AppState>,
    identity: SessionIdentity,
) -> Result<Json<serde_json::Value>, ApiError> {
    sessions_repo::destroy_session(&state.db, &identity.email, identity.device_id).await?;
    info!(email = %identity.email, "logged out");
    Ok(Json(serde_json::json!({ "message": "Logout successful" })))
}

#[instrument(skip(state, session))]
pub async fn get_me(
    State(state): State<AppState>,
    session: AuthSession,
) -> Result<Json<MeResponse>, ApiError> {
    // The session gate already vouched for the identity; the lookup only
    // confirms the user record still exists.
    User::find_by_email(&state.db, &session.email)
        .await?
        .ok_or_else(|| ApiError::Auth("User not found".into()))?;

    Ok(Json(MeResponse {
        email: session.email,
        device_id: session.device_id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_plain_addresses() {
        assert!(is_valid_email("guest@example.com"));
        assert!(is_valid_email("a.b+c@mail.co.uk"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
    }

    #[test]
    fn me_response_serializes_device_id() {
        let resp = MeResponse {
            email: "guest@example.com".into(),
            device_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("guest@example.com"));
        assert!(json.contains("device_id"));
    }
}
