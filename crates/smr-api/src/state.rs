//! Application state management

use crate::auth::{AuthService, JwtConfig, PasswordConfig, PublicRoutes, TokenCodec};
use crate::middleware::Metrics;
use smr_core::config::AppConfig;
use smr_core::CredentialStore;
use std::sync::Arc;
use std::time::Instant;

/// Application state shared across handlers
///
/// Built once at startup and never mutated; request tasks share it through
/// `Arc<AppState>`.
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Authenticator
    pub auth: AuthService,
    /// Routes the request gate lets through without a token
    pub public_routes: PublicRoutes,
    /// Prometheus collectors
    pub metrics: Metrics,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create application state with the default public allow-list
    pub fn new(
        config: AppConfig,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, prometheus::Error> {
        let codec = TokenCodec::new(JwtConfig::from(&config.auth));

        Ok(Self {
            auth: AuthService::new(store, codec),
            public_routes: PublicRoutes::defaults(),
            metrics: Metrics::new()?,
            start_time: Instant::now(),
            config,
        })
    }

    /// Replace the Argon2 parameters used for new password hashes
    pub fn with_password_config(mut self, config: PasswordConfig) -> Self {
        self.auth = self.auth.with_password_config(config);
        self
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
