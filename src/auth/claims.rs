use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT payload of a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,   // user ID
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
}

impl Claims {
    pub fn issued_at(&self) -> i64 {
        i64::try_from(self.iat).unwrap_or(i64::MAX)
    }
}
