//! Issue and verify signed session tokens.

use std::sync::Arc;

use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Environment variable holding the HMAC signing secret.
pub const SECRET_ENV: &str = "JWT_SECRET_KEY";
const SECONDS_PER_HOUR: i64 = 60 * 60;

/// Errors raised while issuing or verifying a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("token is expired")]
    Expired,
    #[error("token is malformed")]
    Malformed(#[source] jsonwebtoken::errors::Error),
    #[error("signing secret must not be empty")]
    EmptySecret,
    #[error("failed to sign token")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// User fields asserted on a token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UserClaims {
    pub id: String,
    #[serde(default)]
    pub username: String,
    pub role_id: String,
}

/// Pieces of information asserted on a JWT.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// Identifies the organization that issued the JWT.
    pub iss: String,
    /// Expiration time, as Unix seconds.
    pub exp: i64,
    pub user: UserClaims,
}

/// Authenticated identity resolved from a verified token.
#[derive(Clone, Debug, PartialEq)]
pub struct Principal {
    pub subject_id: String,
    pub username: String,
    pub role_id: String,
    pub issuer: String,
    pub expires_at: i64,
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            subject_id: claims.user.id,
            username: claims.user.username,
            role_id: claims.user.role_id,
            issuer: claims.iss,
            expires_at: claims.exp,
        }
    }
}

/// Encode and decode HS256 session tokens.
///
/// The secret is read once at startup and never rotated.
#[derive(Clone)]
pub struct ClaimsCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_duration: i64,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ClaimsCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimsCodec")
            .field("algorithm", &self.algorithm)
            .field("session_duration", &self.session_duration)
            .finish_non_exhaustive()
    }
}

impl ClaimsCodec {
    /// Create a new [`ClaimsCodec`].
    ///
    /// `session_duration` is expressed in hours.
    pub fn new(
        secret: &[u8],
        session_duration: u32,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        Ok(Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            session_duration: i64::from(session_duration) * SECONDS_PER_HOUR,
            clock,
        })
    }

    /// Create a new signed token valid for the configured session duration.
    pub fn issue(
        &self,
        issuer: &str,
        user: UserClaims,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            iss: issuer.to_owned(),
            exp: self.clock.timestamp() + self.session_duration,
            user,
        };

        encode(&Header::new(self.algorithm), &claims, &self.encoding_key)
            .map_err(TokenError::Signing)
    }

    /// Decode and check a token.
    ///
    /// A token stays valid up to and including its `exp` second.
    pub fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        let mut validation = Validation::new(self.algorithm);
        // expiry is checked against the injected clock below.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp"]);

        let claims = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(TokenError::Malformed)?
            .claims;

        if self.clock.timestamp() > claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims.into())
    }
}
