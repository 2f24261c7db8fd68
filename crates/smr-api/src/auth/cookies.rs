//! Refresh token cookie
//!
//! The refresh token never travels in a response body. It is set as an
//! HttpOnly cookie scoped to the refresh endpoint.

use axum_extra::extract::cookie::{Cookie, CookieJar};
use smr_core::AuthConfig;
use time::Duration;

pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Cookie carrying a freshly issued refresh token
pub fn refresh_cookie(token: &str, config: &AuthConfig) -> Cookie<'static> {
    let max_age = i64::try_from(config.refresh_token_ttl_secs).unwrap_or(i64::MAX);

    Cookie::build((REFRESH_COOKIE_NAME, token.to_string()))
        .http_only(true)
        .secure(config.refresh_cookie_secure)
        .path(config.refresh_cookie_path.clone())
        .max_age(Duration::seconds(max_age))
        .build()
}

/// Removal cookie for logout
pub fn clear_refresh_cookie(config: &AuthConfig) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, ""))
        .http_only(true)
        .secure(config.refresh_cookie_secure)
        .path(config.refresh_cookie_path.clone())
        .max_age(Duration::ZERO)
        .build()
}

pub fn refresh_token_from(jar: &CookieJar) -> Option<String> {
    jar.get(REFRESH_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|v| !v.is_empty())
}
