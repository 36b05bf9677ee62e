//! JWT Token Handler
//! Mission: Issue and validate HS256 bearer tokens without touching storage

use crate::auth::models::{Claims, UserRole};
use crate::config::AuthConfig;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use secrecy::ExposeSecret;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Why a token was rejected. The gate collapses all of these into one
/// `Unauthenticated` for callers; the distinction is kept for logs.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("token could not be decoded")]
    Malformed,
    #[error("token signature does not match")]
    InvalidSignature,
    #[error("token has expired")]
    Expired,
    #[error("token could not be signed")]
    Signing,
}

impl TokenError {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenError::Malformed => "malformed",
            TokenError::InvalidSignature => "invalid_signature",
            TokenError::Expired => "expired",
            TokenError::Signing => "signing",
        }
    }
}

/// Freshly signed token plus its expiry instant.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Identity asserted by a valid token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSubject {
    pub subject_id: Uuid,
    pub role: UserRole,
}

/// JWT Handler for token operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    issuer: String,
}

impl std::fmt::Debug for JwtHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtHandler")
            .field("ttl_hours", &self.ttl.num_hours())
            .field("issuer", &self.issuer)
            .finish_non_exhaustive()
    }
}

impl JwtHandler {
    /// Create a handler from validated auth configuration
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl: Duration::hours(config.token_ttl_hours),
            issuer: config.issuer.clone(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Sign a token for `subject_id` valid from `now` until `now + ttl`
    pub fn issue(
        &self,
        subject_id: Uuid,
        role: UserRole,
        now: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = now.checked_add_signed(self.ttl).ok_or(TokenError::Signing)?;

        let claims = Claims {
            sub: subject_id.to_string(),
            role,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|_| TokenError::Signing)?;

        debug!(
            "Issued token for user {} ({}), expires {}",
            subject_id,
            role,
            expires_at.to_rfc3339()
        );

        Ok(IssuedToken {
            token,
            // Whole seconds, as encoded in the token.
            expires_at: DateTime::from_timestamp(claims.exp, 0).ok_or(TokenError::Signing)?,
        })
    }

    /// Verify signature and issuer, then check expiry against `now`
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<TokenSubject, TokenError> {
        let claims = self.decode_claims(token)?;

        if now.timestamp() >= claims.exp {
            return Err(TokenError::Expired);
        }

        let subject_id = Uuid::parse_str(&claims.sub).map_err(|_| TokenError::Malformed)?;

        Ok(TokenSubject {
            subject_id,
            role: claims.role,
        })
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, TokenError> {
        // Expiry is checked by the caller against the injected clock.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation.set_issuer(&[self.issuer.as_str()]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                _ => TokenError::Malformed,
            })
    }
}
