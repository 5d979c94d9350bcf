use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::dto::{Claims, JwtKeys};
use crate::sessions::Role;
use crate::state::AppState;

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        let jwt = &state.config.jwt;
        Self {
            encoding: EncodingKey::from_secret(jwt.secret.as_bytes()),
            decoding: DecodingKey::from_secret(jwt.secret.as_bytes()),
            ttl: Duration::from_secs((jwt.ttl_days as u64) * 24 * 60 * 60),
        }
    }
}

impl JwtKeys {
    fn sign_with_ttl(
        &self,
        subject: &str,
        device_id: Uuid,
        role: Role,
        ttl: TimeDuration,
    ) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = Claims {
            sub: subject.to_string(),
            device_id,
            role,
            iat: now.unix_timestamp() as usize,
            exp: (now + ttl).unix_timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(subject, device_id = %device_id, role = ?role, "jwt signed");
        Ok(token)
    }

    /// Sign a credential binding `subject` to one device id.
    pub fn sign(&self, subject: &str, device_id: Uuid, role: Role) -> anyhow::Result<String> {
        self.sign_with_ttl(
            subject,
            device_id,
            role,
            TimeDuration::seconds(self.ttl.as_secs() as i64),
        )
    }

    /// Check signature and expiry only. Session liveness is the caller's
    /// responsibility; see the extractors.
    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let validation = Validation::default();
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(subject = %data.claims.sub, device_id = %data.claims.device_id, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        let state = AppState::fake();
        JwtKeys::from_ref(&state)
    }

    #[tokio::test]
    async fn sign_and_verify_preserves_device_binding() {
        let keys = make_keys();
        let device_id = Uuid::new_v4();
        let token = keys
            .sign("guest@example.com", device_id, Role::User)
            .expect("sign");
        let claims = keys.verify(&token).expect("verify");
        assert_eq!(claims.sub, "guest@example.com");
        assert_eq!(claims.device_id, device_id);
        assert_eq!(claims.role, Role::User);
        assert!(claims.exp > claims.iat);
    }

    #[tokio::test]
    async fn admin_role_survives_the_roundtrip() {
        let keys = make_keys();
        let token = keys
            .sign("ops@example.com", Uuid::new_v4(), Role::Admin)
            .expect("sign");
        assert_eq!(keys.verify(&token).expect("verify").role, Role::Admin);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let keys = make_keys();
        // Past the default 60s validation leeway.
        let token = keys
            .sign_with_ttl(
                "guest@example.com",
                Uuid::new_v4(),
                Role::User,
                TimeDuration::seconds(-120),
            )
            .expect("sign");
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn token_signed_with_other_secret_is_rejected() {
        let keys = make_keys();
        let other = JwtKeys {
            encoding: EncodingKey::from_secret(b"different-secret"),
            decoding: DecodingKey::from_secret(b"different-secret"),
            ttl: Duration::from_secs(60),
        };
        let token = other
            .sign("guest@example.com", Uuid::new_v4(), Role::User)
            .expect("sign");
        assert!(keys.verify(&token).is_err());
    }
}
