use jsonwebtoken::{DecodingKey, EncodingKey};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::sessions::Role;

/// Signed credential payload: identity + device binding. The token is
/// stateless by itself and meaningless without a matching live session row.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,     // subject email
    pub device_id: Uuid, // per-login device binding
    pub role: Role,      // user or admin credential space
    pub iat: usize,      // issued at
    pub exp: usize,      // expires at
}

/// JWT signing and verification material derived from config.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub ttl: Duration,
}

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for admin registration and login.
#[derive(Debug, Deserialize)]
pub struct AdminCredentials {
    pub email: String,
    pub password: String,
}

/// Response returned after registration or login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub device_id: Uuid,
    pub user: PublicUser,
}

/// Public part of an identity returned to the client.
#[derive(Debug, Serialize)]
pub struct PublicUser {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Body of `GET /me`.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub email: String,
    pub device_id: Uuid,
}
