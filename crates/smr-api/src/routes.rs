//! API route definitions
//!
//! Which of these routes need a token is decided by the request gate and its
//! public allow-list, not by the router.

use crate::handlers::auth;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// User and session routes, nested under `/api/user`
pub fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(auth::register_handler))
        .route("/accountnamevalid", post(auth::accountname_valid_handler))
        .route("/emailvalid", post(auth::email_valid_handler))
        .route("/login", post(auth::login_handler))
        .route("/refresh", post(auth::refresh_handler))
        .route("/logout", post(auth::logout_handler))
        .route("/checktoken", get(auth::checktoken_handler))
        .route("/myinfo", get(auth::myinfo_handler))
}
