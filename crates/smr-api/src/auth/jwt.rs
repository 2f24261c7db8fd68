//! JWT token issuance and validation
//!
//! Tokens are signed with HMAC-SHA512 using a secret injected at startup.
//! Both access and refresh tokens carry the principal's login identifier as
//! `sub`; the `typ` claim tells them apart.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use smr_core::AuthConfig;
use thiserror::Error;
use uuid::Uuid;

/// Which boundary a token was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// JWT claims
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the principal's login identifier (e-mail)
    pub sub: String,
    /// Issued at (Unix seconds)
    pub iat: u64,
    /// Expiration (Unix seconds)
    pub exp: u64,
    /// Token kind
    pub typ: TokenKind,
    /// Unique token id; two tokens issued in the same second still differ
    pub jti: String,
}

/// Why a token was rejected
///
/// Classification comes from the decoder's error kind, never from message text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token signature")]
    SignatureInvalid,

    #[error("Malformed token")]
    Malformed,

    #[error("Unsupported token format")]
    InvalidFormat,

    #[error("Expected {expected} token, got {found}")]
    UnexpectedKind {
        expected: TokenKind,
        found: TokenKind,
    },

    #[error("Failed to encode JWT: {0}")]
    Encoding(String),
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::SignatureInvalid,
            ErrorKind::InvalidToken
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => TokenError::Malformed,
            _ => TokenError::InvalidFormat,
        }
    }
}

/// Signing configuration, immutable after startup
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC secret
    pub secret: String,
    /// Access token lifetime in seconds
    pub access_expiration_secs: u64,
    /// Refresh token lifetime in seconds
    pub refresh_expiration_secs: u64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_expiration_secs", &self.access_expiration_secs)
            .field("refresh_expiration_secs", &self.refresh_expiration_secs)
            .finish()
    }
}

impl From<&AuthConfig> for JwtConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            secret: config.jwt_secret.clone(),
            access_expiration_secs: config.access_token_ttl_secs,
            refresh_expiration_secs: config.refresh_token_ttl_secs,
        }
    }
}

/// Issues and verifies signed tokens
///
/// Keys are derived once from [`JwtConfig`] and shared read-only across
/// request tasks.
#[derive(Clone)]
pub struct TokenCodec {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS512);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            config,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Sign a token for `subject` valid for `lifetime_secs` from now
    ///
    /// # Arguments
    ///
    /// * `subject` - Login identifier placed in `sub`
    /// * `kind` - Boundary the token is meant for
    /// * `lifetime_secs` - Seconds until `exp`
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - Compact JWT
    /// * `Err(TokenError::Encoding)` - If signing fails
    pub fn issue(
        &self,
        subject: &str,
        kind: TokenKind,
        lifetime_secs: u64,
    ) -> Result<String, TokenError> {
        let now = jsonwebtoken::get_current_timestamp();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now + lifetime_secs,
            typ: kind,
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::new(Algorithm::HS512), &claims, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))
    }

    pub fn issue_access(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(subject, TokenKind::Access, self.config.access_expiration_secs)
    }

    pub fn issue_refresh(&self, subject: &str) -> Result<String, TokenError> {
        self.issue(subject, TokenKind::Refresh, self.config.refresh_expiration_secs)
    }

    /// Verify signature and expiry, then return the claims
    ///
    /// A failing token never yields a partially trusted payload.
    pub fn decode(&self, token: &str) -> Result<Claims, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)?;
        Ok(data.claims)
    }

    /// Decode and require a specific token kind
    pub fn decode_kind(&self, token: &str, expected: TokenKind) -> Result<Claims, TokenError> {
        let claims = self.decode(token)?;
        if claims.typ != expected {
            return Err(TokenError::UnexpectedKind {
                expected,
                found: claims.typ,
            });
        }
        Ok(claims)
    }

    /// `Ok(true)` when the only thing wrong with the token is its age
    pub fn is_expired(&self, token: &str) -> Result<bool, TokenError> {
        match self.decode(token) {
            Ok(_) => Ok(false),
            Err(TokenError::Expired) => Ok(true),
            Err(e) => Err(e),
        }
    }
}
