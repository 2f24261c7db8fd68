//! SMR Core - Domain models, traits, and shared types
//!
//! This crate defines the core abstractions used by the API server:
//! - The principal (user account) model
//! - The credential store trait and its implementations
//! - Common error types
//! - Configuration management

pub mod config;
pub mod memory;
pub mod store;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig, StoreBackend,
};
pub use memory::InMemoryCredentialStore;
pub use store::PgCredentialStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Avatar assigned when a user registers without one
pub const DEFAULT_AVATAR: &str = "https://api.mandarin.weniv.co.kr/Ellipse.png";

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for SMR operations
#[derive(Error, Debug)]
pub enum SmrError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

pub type Result<T> = std::result::Result<T, SmrError>;

// ============================================================================
// Principal
// ============================================================================

/// Authority granted to a principal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = SmrError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "USER" => Ok(Role::User),
            "ADMIN" => Ok(Role::Admin),
            other => Err(SmrError::ValidationError(format!("unknown role: {other}"))),
        }
    }
}

/// A registered user account as seen by the authentication core
///
/// The login identifier is `email`. It is compared exactly as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub accountname: String,
    pub intro: String,
    pub image: String,
    pub role: Role,
    /// Argon2 PHC string, never the plaintext
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Last refresh token handed out, `None` when no session is active
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Principal {
    /// Whether `token` is the refresh credential currently on record
    pub fn holds_refresh_token(&self, token: &str) -> bool {
        self.refresh_token.as_deref() == Some(token)
    }
}

/// Data required to create a principal
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub username: String,
    pub email: String,
    pub accountname: String,
    pub intro: String,
    pub image: String,
    pub password_hash: String,
}

impl NewPrincipal {
    /// Build a principal record with a fresh id
    pub fn into_principal(self) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            username: self.username,
            email: self.email,
            accountname: self.accountname,
            intro: self.intro,
            image: self.image,
            role: Role::User,
            password_hash: self.password_hash,
            refresh_token: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }
}

// ============================================================================
// Traits
// ============================================================================

/// Persistence of user records and their refresh credential
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find a principal by its stable id
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>>;

    /// Find a principal by login identifier
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>>;

    /// Check whether the login identifier is taken
    async fn exists_by_email(&self, email: &str) -> Result<bool>;

    /// Check whether the account name is taken
    async fn exists_by_accountname(&self, accountname: &str) -> Result<bool>;

    /// Insert a new principal; duplicates fail with `SmrError::Conflict`
    async fn create(&self, principal: NewPrincipal) -> Result<Principal>;

    /// Overwrite (or clear with `None`) the stored refresh credential
    ///
    /// Returns `false` when no principal has that login identifier.
    async fn set_refresh_token(&self, email: &str, token: Option<&str>) -> Result<bool>;

    /// Cheap connectivity probe used by the readiness check
    async fn ping(&self) -> Result<()>;

    /// Backend name for logging
    fn name(&self) -> &str;
}

// ============================================================================
// Tests
// ============================================================================
