//! Request gate
//!
//! Runs once per request before any handler. Public routes pass through when
//! no `Authorization` header is sent; a header that is sent is verified on
//! every route except the token-exempt ones, whose handlers read credentials
//! themselves. Protected routes need a Bearer access token whose subject
//! resolves to an existing principal. On success the principal is attached
//! to request extensions as [`AuthenticatedUser`].

use super::error::AuthError;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use smr_core::{Principal, Role};
use std::sync::Arc;
use uuid::Uuid;

/// Authenticated principal attached to request extensions
///
/// Extract in handlers with `Extension<AuthenticatedUser>`, or
/// `Option<Extension<AuthenticatedUser>>` on public routes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub accountname: String,
    pub role: Role,
}

impl From<&Principal> for AuthenticatedUser {
    fn from(principal: &Principal) -> Self {
        Self {
            user_id: principal.id,
            email: principal.email.clone(),
            accountname: principal.accountname.clone(),
            role: principal.role,
        }
    }
}

/// Routes that do not require authentication
#[derive(Debug, Clone, Default)]
pub struct PublicRoutes {
    /// Exact path matches, optionally restricted to one method
    exact: Vec<(Option<Method>, String)>,
    /// Path prefixes, any method
    prefixes: Vec<String>,
    /// Public paths whose `Authorization` header the gate never inspects
    token_exempt: Vec<String>,
}

impl PublicRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `path` for any method
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.exact.push((None, path.into()));
        self
    }

    /// Allow `path` for `method` only
    pub fn route(mut self, method: Method, path: impl Into<String>) -> Self {
        self.exact.push((Some(method), path.into()));
        self
    }

    /// Allow every path starting with `prefix`
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Allow `path` for any method and leave its `Authorization` header to
    /// the handler
    pub fn exempt(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.token_exempt.push(path.clone());
        self.path(path)
    }

    pub fn is_token_exempt(&self, path: &str) -> bool {
        self.token_exempt.iter().any(|p| p == path)
    }

    pub fn is_public(&self, method: &Method, path: &str) -> bool {
        let exact = self.exact.iter().any(|(m, p)| {
            p == path && m.as_ref().map_or(true, |m| m == method)
        });

        exact || self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// The allow-list used by the server
    pub fn defaults() -> Self {
        Self::new()
            .route(Method::POST, "/api/user")
            .path("/api/user/accountnamevalid")
            .path("/api/user/emailvalid")
            .path("/api/user/login")
            .exempt("/api/user/checktoken")
            .exempt("/api/user/refresh")
            .prefix("/api/image/")
            .prefix("/swagger-ui")
            .prefix("/api-docs")
            .path("/health")
            .path("/ready")
            .path("/metrics")
    }
}

/// Pull the token out of `Authorization: Bearer <token>`
///
/// * header absent - [`AuthError::TokenMissing`]
/// * not visible ASCII or not a Bearer scheme - [`AuthError::TokenInvalidFormat`]
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::TokenMissing)?
        .to_str()
        .map_err(|_| AuthError::TokenInvalidFormat)?;

    value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::TokenInvalidFormat)
}

/// Authentication gate for every route
///
/// Install with `axum::middleware::from_fn_with_state`. Rejections are
/// rendered as 401 JSON (500 for store failures), audit logged, and counted.
pub async fn auth_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.extensions().get::<AuthenticatedUser>().is_some() {
        return next.run(request).await;
    }

    let path = request.uri().path();
    if state.public_routes.is_public(request.method(), path)
        && (state.public_routes.is_token_exempt(path)
            || !request.headers().contains_key(header::AUTHORIZATION))
    {
        state.metrics.record_gate("public");
        return next.run(request).await;
    }

    let result = match bearer_token(request.headers()) {
        Ok(token) => state.auth.authenticate_access(token).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(principal) => {
            state.metrics.record_gate("authenticated");
            request
                .extensions_mut()
                .insert(AuthenticatedUser::from(&principal));
            next.run(request).await
        }
        Err(err) => {
            state.metrics.record_gate(err.error_type());
            audit_log(&AuditEvent::InvalidToken {
                path: request.uri().path().to_string(),
                error_type: err.error_type().to_string(),
                ip_address: extract_ip_address(request.headers()),
                user_agent: extract_user_agent(request.headers()),
            });
            err.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_public_routes_exact_and_method() {
        let routes = PublicRoutes::defaults();

        assert!(routes.is_public(&Method::POST, "/api/user"));
        assert!(!routes.is_public(&Method::GET, "/api/user"));
        assert!(routes.is_public(&Method::POST, "/api/user/login"));
        assert!(routes.is_public(&Method::GET, "/api/user/checktoken"));
        assert!(!routes.is_public(&Method::GET, "/api/user/myinfo"));
        assert!(!routes.is_public(&Method::POST, "/api/user/logout"));
        assert!(!routes.is_public(&Method::POST, "/api/user/login/extra"));
    }

    #[test]
    fn test_token_exempt_routes() {
        let routes = PublicRoutes::defaults();

        assert!(routes.is_token_exempt("/api/user/checktoken"));
        assert!(routes.is_token_exempt("/api/user/refresh"));
        assert!(routes.is_public(&Method::POST, "/api/user/refresh"));
        assert!(!routes.is_token_exempt("/api/user/emailvalid"));
        assert!(!routes.is_token_exempt("/api/user/login"));
    }

    #[test]
    fn test_public_routes_prefixes() {
        let routes = PublicRoutes::defaults();

        assert!(routes.is_public(&Method::POST, "/api/image/uploadfile"));
        assert!(routes.is_public(&Method::GET, "/swagger-ui/index.html"));
        assert!(routes.is_public(&Method::GET, "/api-docs/openapi.json"));
        assert!(!routes.is_public(&Method::GET, "/api/post/feed"));
    }

    #[test]
    fn test_bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::TokenMissing)));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(
            bearer_token(&headers),
            Err(AuthError::TokenInvalidFormat)
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("bearer abc"));
        assert!(matches!(
            bearer_token(&headers),
            Err(AuthError::TokenInvalidFormat)
        ));

        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_bytes(b"Bearer \xfftoken").unwrap(),
        );
        assert!(matches!(
            bearer_token(&headers),
            Err(AuthError::TokenInvalidFormat)
        ));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def");
    }

    #[test]
    fn test_authenticated_user_from_principal() {
        let principal = smr_core::NewPrincipal {
            username: "tester".to_string(),
            email: "a@x.com".to_string(),
            accountname: "alpha".to_string(),
            intro: String::new(),
            image: smr_core::DEFAULT_AVATAR.to_string(),
            password_hash: "hash".to_string(),
        }
        .into_principal();

        let user = AuthenticatedUser::from(&principal);
        assert_eq!(user.user_id, principal.id);
        assert_eq!(user.email, "a@x.com");
        assert_eq!(user.accountname, "alpha");
        assert_eq!(user.role, Role::User);
    }
}
