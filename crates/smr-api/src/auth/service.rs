//! Authentication service layer
//!
//! Owns the session lifecycle of a principal:
//! unauthenticated, then authenticated with an access/refresh pair, then any
//! number of access renewals, then logged out. Also covers registration and
//! identifier availability, which the login flow depends on.

use super::error::AuthError;
use super::jwt::{TokenCodec, TokenKind};
use super::password::{
    hash_password_blocking, validate_password_strength, verify_password_blocking, PasswordConfig,
};
use crate::error::AppError;
use serde::{Deserialize, Serialize};
use smr_core::{CredentialStore, NewPrincipal, Principal, DEFAULT_AVATAR};
use std::borrow::Cow;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "username is required"))]
    pub username: String,
    #[validate(email(message = "invalid email format"))]
    pub email: String,
    #[validate(custom(function = "password_rule"))]
    pub password: String,
    #[validate(custom(function = "accountname_rule"))]
    pub accountname: String,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Account name availability query
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AccountnameCheck {
    #[validate(custom(function = "accountname_rule"))]
    pub accountname: String,
}

/// E-mail availability query
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct EmailCheck {
    #[validate(email(message = "invalid email format"))]
    pub email: String,
}

fn password_rule(password: &str) -> Result<(), ValidationError> {
    validate_password_strength(password).map_err(|msg| {
        let mut err = ValidationError::new("password");
        err.message = Some(Cow::Owned(msg));
        err
    })
}

/// Account names: ASCII letters, digits, `_` and `.`
fn accountname_rule(accountname: &str) -> Result<(), ValidationError> {
    let valid = !accountname.is_empty()
        && accountname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');

    if valid {
        Ok(())
    } else {
        let mut err = ValidationError::new("accountname");
        err.message = Some(Cow::Borrowed(
            "only letters, digits, underscores and periods are allowed",
        ));
        Err(err)
    }
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub principal: Principal,
    pub access_token: String,
    pub refresh_token: String,
}

/// Result of a successful access token renewal
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub principal: Principal,
    pub access_token: String,
}

/// Authentication service
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    password_config: PasswordConfig,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, codec: TokenCodec) -> Self {
        Self {
            store,
            codec,
            password_config: PasswordConfig::default(),
        }
    }

    /// Override Argon2 cost parameters for newly hashed passwords
    pub fn with_password_config(mut self, config: PasswordConfig) -> Self {
        self.password_config = config;
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Register a new user
    ///
    /// # Returns
    ///
    /// * `Ok(Principal)` - Newly created user
    /// * `Err(AppError::BadRequest)` - Input failed validation
    /// * `Err(AppError::Conflict)` - E-mail or account name already taken
    pub async fn register(&self, request: RegisterRequest) -> Result<Principal, AppError> {
        request.validate()?;

        if self.store.exists_by_email(&request.email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }
        if self.store.exists_by_accountname(&request.accountname).await? {
            return Err(AppError::Conflict(
                "Account name already registered".to_string(),
            ));
        }

        let password_hash =
            hash_password_blocking(request.password, self.password_config.clone())
                .await
                .map_err(|e| AppError::Internal(e.to_string()))?;

        let image = request
            .image
            .filter(|image| !image.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AVATAR.to_string());

        // create() re-checks uniqueness; a racing duplicate still ends in Conflict
        let principal = self
            .store
            .create(NewPrincipal {
                username: request.username,
                email: request.email,
                accountname: request.accountname,
                intro: request.intro.unwrap_or_default(),
                image,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = %principal.id, "User registered");
        Ok(principal)
    }

    pub async fn is_email_available(&self, email: &str) -> Result<bool, AppError> {
        Ok(!self.store.exists_by_email(email).await?)
    }

    pub async fn is_accountname_available(&self, accountname: &str) -> Result<bool, AppError> {
        Ok(!self.store.exists_by_accountname(accountname).await?)
    }

    /// Login with email and password
    ///
    /// Issues an access/refresh pair and records the refresh token as the
    /// principal's only live session. Any earlier refresh token stops working.
    ///
    /// Unknown account and wrong password both yield
    /// [`AuthError::InvalidCredentials`].
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let Some(principal) = self.store.find_by_email(email).await? else {
            tracing::debug!("Login rejected: unknown account");
            return Err(AuthError::InvalidCredentials);
        };

        let matches =
            verify_password_blocking(password.to_string(), principal.password_hash.clone())
                .await
                .map_err(|e| AuthError::Internal(e.to_string()))?;
        if !matches {
            tracing::debug!(user_id = %principal.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials);
        }

        let access_token = self.codec.issue_access(&principal.email)?;
        let refresh_token = self.codec.issue_refresh(&principal.email)?;

        self.store
            .set_refresh_token(&principal.email, Some(&refresh_token))
            .await?;

        Ok(LoginOutcome {
            principal,
            access_token,
            refresh_token,
        })
    }

    /// Exchange a refresh token for a new access token
    ///
    /// The refresh token must be signed, unexpired, of refresh kind, and
    /// byte-for-byte equal to the one currently on record. The stored refresh
    /// token is left unchanged.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshOutcome, AuthError> {
        let claims = self.codec.decode_kind(refresh_token, TokenKind::Refresh)?;

        let principal = self
            .store
            .find_by_email(&claims.sub)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        if !principal.holds_refresh_token(refresh_token) {
            return Err(AuthError::RefreshRevoked);
        }

        let access_token = self.codec.issue_access(&principal.email)?;

        Ok(RefreshOutcome {
            principal,
            access_token,
        })
    }

    /// Clear the stored refresh token
    ///
    /// Idempotent. An unknown principal is not an error.
    pub async fn logout(&self, email: &str) -> Result<(), AuthError> {
        let found = self.store.set_refresh_token(email, None).await?;
        if !found {
            tracing::debug!("Logout for unknown account ignored");
        }
        Ok(())
    }

    /// Resolve the principal behind an access token
    ///
    /// Used by the request gate. Refresh tokens are rejected with
    /// [`AuthError::InvalidTokenClaims`].
    pub async fn authenticate_access(&self, token: &str) -> Result<Principal, AuthError> {
        let claims = self.codec.decode_kind(token, TokenKind::Access)?;

        let principal = self
            .store
            .find_by_email(&claims.sub)
            .await?
            .ok_or(AuthError::PrincipalNotFound)?;

        if principal.email != claims.sub {
            return Err(AuthError::PrincipalNotFound);
        }

        Ok(principal)
    }

    /// Whether `token` is a usable access token for an existing principal
    ///
    /// Never fails; store errors count as "not valid".
    pub async fn validate_token(&self, token: &str) -> bool {
        match self.authenticate_access(token).await {
            Ok(_) => true,
            Err(AuthError::Internal(e)) => {
                tracing::warn!(error = %e, "Token validation failed on store error");
                false
            }
            Err(_) => false,
        }
    }

    pub async fn principal_by_email(&self, email: &str) -> Result<Option<Principal>, AuthError> {
        Ok(self.store.find_by_email(email).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtConfig;
    use smr_core::InMemoryCredentialStore;

    fn service() -> AuthService {
        let codec = TokenCodec::new(JwtConfig {
            secret: "service-test-secret".to_string(),
            access_expiration_secs: 900,
            refresh_expiration_secs: 604_800,
        });
        AuthService::new(Arc::new(InMemoryCredentialStore::new()), codec)
            .with_password_config(PasswordConfig::fast())
    }

    fn registration(email: &str, accountname: &str) -> RegisterRequest {
        RegisterRequest {
            username: "tester".to_string(),
            email: email.to_string(),
            password: "secret1".to_string(),
            accountname: accountname.to_string(),
            intro: None,
            image: None,
        }
    }

    async fn registered() -> AuthService {
        let service = service();
        service
            .register(registration("a@x.com", "alpha"))
            .await
            .unwrap();
        service
    }

    #[tokio::test]
    async fn test_register_defaults() {
        let service = service();
        let principal = service
            .register(registration("a@x.com", "alpha"))
            .await
            .unwrap();

        assert_eq!(principal.image, DEFAULT_AVATAR);
        assert_eq!(principal.intro, "");
        assert!(principal.password_hash.starts_with("$argon2id$"));
        assert!(!service.is_email_available("a@x.com").await.unwrap());
        assert!(!service.is_accountname_available("alpha").await.unwrap());
        assert!(service.is_accountname_available("beta").await.unwrap());
    }

    #[tokio::test]
    async fn test_register_rejects_bad_input() {
        let service = service();

        let mut bad_email = registration("not-an-email", "alpha");
        assert!(matches!(
            service.register(bad_email.clone()).await,
            Err(AppError::BadRequest(_))
        ));

        bad_email.email = "a@x.com".to_string();
        bad_email.password = "12345".to_string();
        assert!(matches!(
            service.register(bad_email.clone()).await,
            Err(AppError::BadRequest(_))
        ));

        bad_email.password = "secret1".to_string();
        bad_email.accountname = "has space".to_string();
        assert!(matches!(
            service.register(bad_email).await,
            Err(AppError::BadRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_register_duplicate_conflicts() {
        let service = registered().await;

        let dup = service.register(registration("a@x.com", "other")).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));

        let dup = service.register(registration("b@x.com", "alpha")).await;
        assert!(matches!(dup, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_login_issues_tokens_keyed_on_email() {
        let service = registered().await;
        let outcome = service.login("a@x.com", "secret1").await.unwrap();

        let claims = service.codec().decode(&outcome.access_token).unwrap();
        assert_eq!(claims.sub, "a@x.com");
        assert_eq!(claims.typ, TokenKind::Access);

        let stored = service.principal_by_email("a@x.com").await.unwrap().unwrap();
        assert!(stored.holds_refresh_token(&outcome.refresh_token));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let service = registered().await;

        let wrong_password = service.login("a@x.com", "secret2").await;
        let unknown = service.login("nobody@x.com", "secret1").await;

        assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
        assert!(matches!(unknown, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_refresh_after_login() {
        let service = registered().await;
        let login = service.login("a@x.com", "secret1").await.unwrap();

        let refreshed = service
            .refresh_access_token(&login.refresh_token)
            .await
            .unwrap();
        assert_eq!(refreshed.principal.email, "a@x.com");
        assert!(service.validate_token(&refreshed.access_token).await);

        // No rotation
        let stored = service.principal_by_email("a@x.com").await.unwrap().unwrap();
        assert!(stored.holds_refresh_token(&login.refresh_token));
    }

    #[tokio::test]
    async fn test_second_login_revokes_first_refresh() {
        let service = registered().await;
        let first = service.login("a@x.com", "secret1").await.unwrap();
        let second = service.login("a@x.com", "secret1").await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);

        assert!(matches!(
            service.refresh_access_token(&first.refresh_token).await,
            Err(AuthError::RefreshRevoked)
        ));
        assert!(service
            .refresh_access_token(&second.refresh_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_logout_revokes_refresh_and_is_idempotent() {
        let service = registered().await;
        let login = service.login("a@x.com", "secret1").await.unwrap();

        service.logout("a@x.com").await.unwrap();
        service.logout("a@x.com").await.unwrap();
        service.logout("nobody@x.com").await.unwrap();

        assert!(matches!(
            service.refresh_access_token(&login.refresh_token).await,
            Err(AuthError::RefreshRevoked)
        ));
    }

    #[tokio::test]
    async fn test_token_kinds_are_not_interchangeable() {
        let service = registered().await;
        let login = service.login("a@x.com", "secret1").await.unwrap();

        assert!(matches!(
            service.refresh_access_token(&login.access_token).await,
            Err(AuthError::InvalidTokenClaims)
        ));
        assert!(matches!(
            service.authenticate_access(&login.refresh_token).await,
            Err(AuthError::InvalidTokenClaims)
        ));
        assert!(!service.validate_token(&login.refresh_token).await);
    }

    #[tokio::test]
    async fn test_refresh_for_unknown_subject() {
        let service = registered().await;
        let token = service.codec().issue_refresh("ghost@x.com").unwrap();

        assert!(matches!(
            service.refresh_access_token(&token).await,
            Err(AuthError::PrincipalNotFound)
        ));
    }

    #[tokio::test]
    async fn test_validate_token() {
        let service = registered().await;
        let login = service.login("a@x.com", "secret1").await.unwrap();

        assert!(service.validate_token(&login.access_token).await);
        assert!(!service.validate_token("malformed.token.value").await);

        let ghost = service.codec().issue_access("ghost@x.com").unwrap();
        assert!(!service.validate_token(&ghost).await);
    }
}
