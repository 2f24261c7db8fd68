//! Authentication failures and their HTTP rendering
//!
//! Every failure renders as 401 with a stable `errorType` tag, except
//! internal failures which render as 500 without leaking details.

use super::jwt::TokenError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use smr_core::SmrError;
use thiserror::Error;
use utoipa::ToSchema;

/// Authentication failure taxonomy
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication token is required")]
    TokenMissing,

    #[error("Authorization header is not a Bearer token")]
    TokenInvalidFormat,

    #[error("Authentication token has expired")]
    TokenExpired,

    #[error("Authentication token signature is invalid")]
    TokenSignatureInvalid,

    #[error("Authentication token is malformed")]
    TokenMalformed,

    #[error("Token cannot be used here")]
    InvalidTokenClaims,

    #[error("User for this token no longer exists")]
    PrincipalNotFound,

    #[error("Refresh token has been revoked")]
    RefreshRevoked,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Stable tag reported to clients as `errorType`
    pub fn error_type(&self) -> &'static str {
        match self {
            AuthError::TokenMissing => "TOKEN_MISSING",
            AuthError::TokenInvalidFormat => "TOKEN_INVALID_FORMAT",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenSignatureInvalid => "TOKEN_SIGNATURE_INVALID",
            AuthError::TokenMalformed => "TOKEN_MALFORMED",
            AuthError::InvalidTokenClaims => "INVALID_TOKEN_CLAIMS",
            AuthError::PrincipalNotFound => "USER_NOT_FOUND",
            AuthError::RefreshRevoked => "REFRESH_REVOKED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Hint for the client on how to recover
    fn details(&self) -> Option<&'static str> {
        match self {
            AuthError::TokenMissing | AuthError::TokenExpired | AuthError::PrincipalNotFound => {
                Some("Please log in again")
            }
            AuthError::RefreshRevoked => Some("Session ended, please log in again"),
            AuthError::TokenInvalidFormat
            | AuthError::TokenSignatureInvalid
            | AuthError::TokenMalformed
            | AuthError::InvalidTokenClaims => {
                Some("Please contact support if the problem persists")
            }
            AuthError::InvalidCredentials => Some("Check your email and password"),
            AuthError::Internal(_) => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::SignatureInvalid => AuthError::TokenSignatureInvalid,
            TokenError::Malformed => AuthError::TokenMalformed,
            TokenError::InvalidFormat => AuthError::TokenInvalidFormat,
            TokenError::UnexpectedKind { .. } => AuthError::InvalidTokenClaims,
            TokenError::Encoding(msg) => AuthError::Internal(msg),
        }
    }
}

impl From<SmrError> for AuthError {
    fn from(err: SmrError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// Body written for every rejected request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthErrorBody {
    pub status: u16,
    pub error: String,
    pub message: String,
    pub error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl From<&AuthError> for AuthErrorBody {
    fn from(err: &AuthError) -> Self {
        let status = err.status();
        let message = match err {
            AuthError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        Self {
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            error_type: err.error_type().to_string(),
            details: err.details().map(str::to_string),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        if let AuthError::Internal(ref msg) = self {
            tracing::error!(error = %msg, "Authentication internal error");
        }

        let body = AuthErrorBody::from(&self);
        (self.status(), Json(body)).into_response()
    }
}
