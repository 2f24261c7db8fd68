//! SMR API - HTTP server with token authentication
//!
//! Provides the user and session endpoints of the soon-my-room backend and
//! the request gate that guards every other route.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use crate::state::AppState;
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

/// OpenAPI document served at `/api-docs/openapi.json`
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::register_handler,
        handlers::auth::accountname_valid_handler,
        handlers::auth::email_valid_handler,
        handlers::auth::login_handler,
        handlers::auth::refresh_handler,
        handlers::auth::logout_handler,
        handlers::auth::checktoken_handler,
        handlers::auth::myinfo_handler,
        handlers::health::health_check,
        handlers::health::readiness_check,
        handlers::health::prometheus_metrics,
    ),
    components(schemas(
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::AccountnameCheck,
        auth::EmailCheck,
        auth::AuthErrorBody,
        error::ApiError,
        handlers::auth::RegisterBody,
        handlers::auth::LoginBody,
        handlers::auth::AccountnameBody,
        handlers::auth::EmailBody,
        handlers::auth::UserView,
        handlers::auth::UserResponse,
        handlers::auth::RegisterResponse,
        handlers::auth::MessageResponse,
        handlers::auth::TokenValidResponse,
        handlers::health::HealthResponse,
        handlers::health::BuildInfo,
        handlers::health::ReadinessResponse,
        handlers::health::ReadinessChecks,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "user", description = "Registration, login and session management"),
        (name = "health", description = "Probes and metrics"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Build the application router
///
/// Layer order, outermost first: timeout, tracing, CORS, metrics, request
/// gate. Metrics therefore see gate rejections, and CORS preflights never
/// reach the gate.
pub fn create_router(state: Arc<AppState>) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout_secs);
    let cors = cors_layer(&state.config.server.cors_origins);

    Router::new()
        .nest("/api/user", routes::user_routes())
        .route("/health", get(handlers::health::health_check))
        .route("/ready", get(handlers::health::readiness_check))
        .route("/metrics", get(handlers::health::prometheus_metrics))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(from_fn_with_state(state.clone(), auth::auth_gate))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(timeout))
        .with_state(state)
}

/// CORS policy
///
/// With no configured origins any origin is allowed but credentials are not.
/// Listed origins may send cookies.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

// ============================================================================
// Test utilities
// ============================================================================

/// Signing secret used by [`test_config`]
#[cfg(any(test, feature = "test-utils"))]
pub const TEST_JWT_SECRET: &str = "test-secret-key-for-integration-tests-only";

/// Configuration for tests: in-memory store, known secret
#[cfg(any(test, feature = "test-utils"))]
pub fn test_config() -> smr_core::AppConfig {
    let mut config = smr_core::AppConfig::default();
    config.database.backend = smr_core::StoreBackend::Memory;
    config.auth.jwt_secret = TEST_JWT_SECRET.to_string();
    config
}

/// Application state over an empty in-memory store
///
/// Uses cheap Argon2 parameters so tests that hash passwords stay fast.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state() -> Arc<AppState> {
    let store = Arc::new(smr_core::InMemoryCredentialStore::new());
    let state = AppState::new(test_config(), store)
        .expect("metrics registry")
        .with_password_config(auth::PasswordConfig::fast());
    Arc::new(state)
}

/// Create a router for testing over [`create_test_state`]
#[cfg(any(test, feature = "test-utils"))]
pub fn create_router_for_testing() -> Router {
    create_router(create_test_state())
}
