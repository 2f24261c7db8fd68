//! Authentication module
//!
//! - Token issuance and validation (`jwt`)
//! - Password hashing with Argon2 (`password`)
//! - Authenticator: login, refresh, logout, registration (`service`)
//! - Request gate and public allow-list (`middleware`)
//! - Refresh token cookie (`cookies`)

pub mod cookies;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use error::{AuthError, AuthErrorBody};
pub use jwt::{Claims, JwtConfig, TokenCodec, TokenError, TokenKind};
pub use middleware::{auth_gate, bearer_token, AuthenticatedUser, PublicRoutes};
pub use password::{hash_password_with_config, verify_password, PasswordConfig};
pub use service::{
    AccountnameCheck, AuthService, EmailCheck, LoginOutcome, LoginRequest, RefreshOutcome,
    RegisterRequest,
};
