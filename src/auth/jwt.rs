use std::time::Duration;

use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::Claims;
use crate::{config::JwtConfig, state::AppState};

/// Malformed, expired, wrongly signed, or issued for another issuer/audience.
#[derive(Debug, Error)]
#[error("invalid token")]
pub struct InvalidToken(#[source] jsonwebtoken::errors::Error);

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        Self::new(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            ttl: Duration::from_secs(cfg.ttl_minutes.max(0) as u64 * 60),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: Uuid) -> anyhow::Result<String> {
        self.issue_at(user_id, OffsetDateTime::now_utc())
    }

    pub(crate) fn issue_at(&self, user_id: Uuid, now: OffsetDateTime) -> anyhow::Result<String> {
        let exp = now + TimeDuration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp().max(0) as usize,
            exp: exp.unix_timestamp().max(0) as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, "jwt signed");
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, InvalidToken> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(InvalidToken)?;
        debug!(user_id = %data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::new(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            ttl_minutes: 5,
        })
    }

    #[test]
    fn issue_and_verify_session_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id).expect("sign");
        let claims = keys.verify(&token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, 5 * 60);
    }

    #[test]
    fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.issue(Uuid::new_v4()).expect("sign");
        assert!(bad_keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let token = make_keys("secret-a", "iss", "aud").issue(Uuid::new_v4()).unwrap();
        assert!(make_keys("secret-b", "iss", "aud").verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_expired_tokens() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let long_ago = OffsetDateTime::now_utc() - TimeDuration::hours(2);
        let token = keys.issue_at(Uuid::new_v4(), long_ago).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[test]
    fn verify_rejects_garbage() {
        let keys = make_keys("dev-secret", "iss", "aud");
        assert!(keys.verify("not.a.jwt").is_err());
        assert!(keys.verify("").is_err());
    }
}
