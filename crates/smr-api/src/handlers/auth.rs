//! User and session API handlers
//!
//! Request and response bodies wrap the user payload in a `user` object.

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::cookies::{clear_refresh_cookie, refresh_cookie, refresh_token_from};
use crate::auth::{
    bearer_token, AccountnameCheck, AuthError, AuthenticatedUser, EmailCheck, LoginRequest,
    RegisterRequest,
};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use smr_core::Principal;
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterBody {
    pub user: RegisterRequest,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginBody {
    pub user: LoginRequest,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AccountnameBody {
    pub user: AccountnameCheck,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct EmailBody {
    pub user: EmailCheck,
}

// ============================================================================
// Response bodies
// ============================================================================

/// Public view of a user
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserView {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub accountname: String,
    pub intro: String,
    pub image: String,
    /// Access token, present on login and refresh
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl UserView {
    fn with_token(principal: &Principal, token: String) -> Self {
        Self {
            token: Some(token),
            ..Self::from(principal)
        }
    }
}

impl From<&Principal> for UserView {
    fn from(principal: &Principal) -> Self {
        Self {
            id: principal.id.to_string(),
            username: principal.username.clone(),
            email: principal.email.clone(),
            accountname: principal.accountname.clone(),
            intro: principal.intro.clone(),
            image: principal.image.clone(),
            token: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub user: UserView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
    pub user: UserView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenValidResponse {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
}

fn failure_reason(err: &AppError) -> String {
    match err {
        AppError::BadRequest(msg) | AppError::Conflict(msg) => msg.clone(),
        _ => "internal error".to_string(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Register a new user account
///
/// An empty `image` falls back to the default avatar.
#[utoipa::path(
    post,
    path = "/api/user",
    tag = "user",
    request_body = RegisterBody,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid input", body = crate::error::ApiError),
        (status = 409, description = "Email or account name taken", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RegisterBody>,
) -> Result<impl IntoResponse, AppError> {
    let email = body.user.email.clone();
    let ip_address = extract_ip_address(&headers);

    match state.auth.register(body.user).await {
        Ok(principal) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: principal.id,
                email: principal.email.clone(),
                accountname: principal.accountname.clone(),
                ip_address,
            });

            Ok((
                StatusCode::CREATED,
                Json(RegisterResponse {
                    message: "Registration successful".to_string(),
                    user: UserView::from(&principal),
                }),
            ))
        }
        Err(err) => {
            audit_log(&AuditEvent::RegistrationFailure {
                email,
                reason: failure_reason(&err),
                ip_address,
            });
            Err(err)
        }
    }
}

/// Check whether an account name is still free
#[utoipa::path(
    post,
    path = "/api/user/accountnamevalid",
    tag = "user",
    request_body = AccountnameBody,
    responses(
        (status = 200, description = "Availability message", body = MessageResponse),
        (status = 400, description = "Invalid account name", body = crate::error::ApiError),
    )
)]
pub async fn accountname_valid_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AccountnameBody>,
) -> Result<Json<MessageResponse>, AppError> {
    body.user.validate()?;

    let message = if state
        .auth
        .is_accountname_available(&body.user.accountname)
        .await?
    {
        "Account name is available"
    } else {
        "Account name already registered"
    };

    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

/// Check whether an e-mail address is still free
#[utoipa::path(
    post,
    path = "/api/user/emailvalid",
    tag = "user",
    request_body = EmailBody,
    responses(
        (status = 200, description = "Availability message", body = MessageResponse),
        (status = 400, description = "Invalid email", body = crate::error::ApiError),
    )
)]
pub async fn email_valid_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<EmailBody>,
) -> Result<Json<MessageResponse>, AppError> {
    body.user.validate()?;

    let message = if state.auth.is_email_available(&body.user.email).await? {
        "Email is available"
    } else {
        "Email already registered"
    };

    Ok(Json(MessageResponse {
        message: message.to_string(),
    }))
}

/// Login with email and password
///
/// Returns the access token in the body and sets the refresh token as an
/// HttpOnly cookie scoped to the refresh endpoint.
#[utoipa::path(
    post,
    path = "/api/user/login",
    tag = "user",
    request_body = LoginBody,
    responses(
        (status = 200, description = "Login successful", body = UserResponse),
        (status = 401, description = "Invalid credentials", body = crate::auth::AuthErrorBody),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(body): Json<LoginBody>,
) -> Result<(CookieJar, Json<UserResponse>), AuthError> {
    let ip_address = extract_ip_address(&headers);
    let user_agent = extract_user_agent(&headers);

    let result = state
        .auth
        .login(&body.user.email, &body.user.password)
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => {
            audit_log(&AuditEvent::LoginFailure {
                email: body.user.email,
                reason: err.error_type().to_string(),
                ip_address,
                user_agent,
            });
            return Err(err);
        }
    };

    audit_log(&AuditEvent::LoginSuccess {
        user_id: outcome.principal.id,
        email: outcome.principal.email.clone(),
        ip_address,
        user_agent,
    });

    let jar = jar.add(refresh_cookie(&outcome.refresh_token, &state.config.auth));
    let user = UserView::with_token(&outcome.principal, outcome.access_token);

    Ok((jar, Json(UserResponse { user })))
}

/// Exchange the refresh cookie for a new access token
///
/// Any validation failure answers 401 with an empty body. The refresh token
/// itself is not rotated.
#[utoipa::path(
    post,
    path = "/api/user/refresh",
    tag = "user",
    responses(
        (status = 200, description = "New access token", body = UserResponse),
        (status = 401, description = "Missing, invalid or revoked refresh token"),
        (status = 500, description = "Credential store failure"),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Response {
    let ip_address = extract_ip_address(&headers);

    let Some(token) = refresh_token_from(&jar) else {
        audit_log(&AuditEvent::RefreshRejected {
            reason: "missing refresh cookie".to_string(),
            ip_address,
        });
        return StatusCode::UNAUTHORIZED.into_response();
    };

    match state.auth.refresh_access_token(&token).await {
        Ok(outcome) => {
            audit_log(&AuditEvent::TokenRefresh {
                user_id: outcome.principal.id,
                email: outcome.principal.email.clone(),
                ip_address,
            });
            let user = UserView::with_token(&outcome.principal, outcome.access_token);
            Json(UserResponse { user }).into_response()
        }
        Err(err @ AuthError::Internal(_)) => err.into_response(),
        Err(err) => {
            audit_log(&AuditEvent::RefreshRejected {
                reason: err.error_type().to_string(),
                ip_address,
            });
            StatusCode::UNAUTHORIZED.into_response()
        }
    }
}

/// End the current session
///
/// Clears the stored refresh token and expires the refresh cookie.
#[utoipa::path(
    post,
    path = "/api/user/logout",
    tag = "user",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = crate::auth::AuthErrorBody),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Extension(user): Extension<AuthenticatedUser>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AuthError> {
    state.auth.logout(&user.email).await?;

    audit_log(&AuditEvent::Logout {
        user_id: user.user_id,
        email: user.email,
        ip_address: extract_ip_address(&headers),
    });

    Ok((
        jar.add(clear_refresh_cookie(&state.config.auth)),
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

/// Report whether the bearer token is a usable access token
#[utoipa::path(
    get,
    path = "/api/user/checktoken",
    tag = "user",
    responses(
        (status = 200, description = "Validity of the presented token", body = TokenValidResponse),
        (status = 401, description = "No Bearer token presented", body = TokenValidResponse),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn checktoken_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    match bearer_token(&headers) {
        Ok(token) => {
            let is_valid = state.auth.validate_token(token).await;
            Json(TokenValidResponse { is_valid }).into_response()
        }
        Err(_) => (
            StatusCode::UNAUTHORIZED,
            Json(TokenValidResponse { is_valid: false }),
        )
            .into_response(),
    }
}

/// Current user's profile
#[utoipa::path(
    get,
    path = "/api/user/myinfo",
    tag = "user",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Unauthorized", body = crate::auth::AuthErrorBody),
    ),
    security(
        ("bearer_auth" = [])
    )
)]
pub async fn myinfo_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<Json<UserResponse>, AuthError> {
    let principal = state
        .auth
        .principal_by_email(&user.email)
        .await?
        .ok_or(AuthError::PrincipalNotFound)?;

    Ok(Json(UserResponse {
        user: UserView::from(&principal),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smr_core::{NewPrincipal, DEFAULT_AVATAR};

    fn principal() -> Principal {
        NewPrincipal {
            username: "tester".to_string(),
            email: "a@x.com".to_string(),
            accountname: "alpha".to_string(),
            intro: "hi".to_string(),
            image: DEFAULT_AVATAR.to_string(),
            password_hash: "hash".to_string(),
        }
        .into_principal()
    }

    #[test]
    fn test_user_view_serialization() {
        let principal = principal();
        let json = serde_json::to_value(UserView::from(&principal)).unwrap();

        assert_eq!(json["_id"], principal.id.to_string());
        assert_eq!(json["accountname"], "alpha");
        assert!(json.get("token").is_none());
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_user_view_with_token() {
        let json =
            serde_json::to_value(UserView::with_token(&principal(), "tok".to_string())).unwrap();
        assert_eq!(json["token"], "tok");
    }

    #[test]
    fn test_token_valid_response_field_name() {
        let json = serde_json::to_string(&TokenValidResponse { is_valid: true }).unwrap();
        assert_eq!(json, r#"{"isValid":true}"#);
    }
}
