//! Signing and verification of session tokens.
//!
//! Access and refresh tokens share one HS256 secret but carry a
//! `token_use` claim so one can never stand in for the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("failed to encode token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
    #[error("token is not valid for {expected} use")]
    WrongUse { expected: &'static str },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenUse {
    Access,
    Refresh,
}

impl TokenUse {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenUse::Access => "access",
            TokenUse::Refresh => "refresh",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: Uuid,
    /// Session id, matched against the server-side session whitelist.
    pub sid: Uuid,
    pub token_use: TokenUse,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct JwtSigner {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtSigner {
    pub fn new(secret: &[u8], access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    pub fn issue_access(&self, user_id: Uuid, session_id: Uuid) -> Result<String, JwtError> {
        self.issue(user_id, session_id, TokenUse::Access, self.access_ttl)
    }

    pub fn issue_refresh(&self, user_id: Uuid, session_id: Uuid) -> Result<String, JwtError> {
        self.issue(user_id, session_id, TokenUse::Refresh, self.refresh_ttl)
    }

    fn issue(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        token_use: TokenUse,
        ttl: Duration,
    ) -> Result<String, JwtError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            sid: session_id,
            token_use,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(JwtError::Encode)
    }

    /// Decodes and validates a token, then checks it was minted for
    /// `expected` use.
    pub fn verify(&self, token: &str, expected: TokenUse) -> Result<Claims, JwtError> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(JwtError::Invalid)?;
        if data.claims.token_use != expected {
            return Err(JwtError::WrongUse {
                expected: expected.as_str(),
            });
        }
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> JwtSigner {
        JwtSigner::new(b"test-secret", Duration::minutes(15), Duration::days(14))
    }

    #[test]
    fn roundtrips_access_claims() {
        let signer = signer();
        let user_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();

        let token = signer.issue_access(user_id, session_id).unwrap();
        let claims = signer.verify(&token, TokenUse::Access).unwrap();

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.sid, session_id);
        assert_eq!(claims.token_use, TokenUse::Access);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_refresh_token_for_access_use() {
        let signer = signer();
        let token = signer
            .issue_refresh(Uuid::new_v4(), Uuid::new_v4())
            .unwrap();

        let err = signer.verify(&token, TokenUse::Access).unwrap_err();
        assert!(matches!(err, JwtError::WrongUse { expected: "access" }));
    }

    #[test]
    fn rejects_expired_token() {
        // Negative TTL puts `exp` in the past, well outside the leeway.
        let signer = JwtSigner::new(b"test-secret", Duration::hours(-2), Duration::days(14));
        let token = signer.issue_access(Uuid::new_v4(), Uuid::new_v4()).unwrap();

        let err = signer.verify(&token, TokenUse::Access).unwrap_err();
        assert!(matches!(err, JwtError::Invalid(_)));
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let signer = signer();
        let other = JwtSigner::new(b"other-secret", Duration::minutes(15), Duration::days(14));

        let token = other.issue_access(Uuid::new_v4(), Uuid::new_v4()).unwrap();
        assert!(signer.verify(&token, TokenUse::Access).is_err());
    }
}
