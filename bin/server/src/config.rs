//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables. Nested keys use
//! `__` as separator, e.g. `OIDC__ISSUER_URL` or `SESSION__SECURE_COOKIES`.
//!
//! See [`OidcConfig`](clerk_platform_access::OidcConfig) for OIDC
//! authentication configuration.

use clerk_authz::AuthzConfig;
use clerk_platform_access::{DEFAULT_TOKEN_LIFETIME_SECONDS, OidcConfig, RetryPolicy};
use serde::Deserialize;

/// Server configuration composed from library configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on. Default: "0.0.0.0:8080"
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// PostgreSQL connection URL. Sessions are kept in memory when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// OIDC authentication configuration.
    pub oidc: OidcConfig,

    /// Timeouts and retries for identity provider calls.
    #[serde(default)]
    pub provider: RetryPolicy,

    /// Tenant-scope authorization configuration.
    #[serde(default)]
    pub authz: AuthzConfig,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Name of the session cookie.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Defaults to true for production safety; set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,

    /// Sessions untouched for this long are purged; also the cookie max-age.
    #[serde(default = "default_idle_timeout_minutes")]
    pub idle_timeout_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Token lifetime assumed when the provider omits `expires_in`.
    #[serde(default = "default_token_lifetime_seconds")]
    pub default_token_lifetime_seconds: i64,
}

fn default_cookie_name() -> String {
    "clerk_session".to_string()
}

fn default_secure_cookies() -> bool {
    true
}

fn default_idle_timeout_minutes() -> i64 {
    8 * 60
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_token_lifetime_seconds() -> i64 {
    DEFAULT_TOKEN_LIFETIME_SECONDS
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            secure_cookies: default_secure_cookies(),
            idle_timeout_minutes: default_idle_timeout_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            default_token_lifetime_seconds: default_token_lifetime_seconds(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.session.validate()?;
        Ok(config)
    }
}

impl SessionConfig {
    /// Rejects values the session cleanup task cannot run with.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero cleanup interval or a non-positive idle timeout.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.cleanup_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "session.cleanup_interval_seconds must be at least 1".to_string(),
            ));
        }
        if self.idle_timeout_minutes <= 0 {
            return Err(config::ConfigError::Message(
                "session.idle_timeout_minutes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clerk_authz::MutationPolicy;

    #[test]
    fn session_config_has_correct_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.cookie_name, "clerk_session");
        assert!(config.secure_cookies);
        assert_eq!(config.cleanup_interval_seconds, 300);
        assert_eq!(config.default_token_lifetime_seconds, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_cleanup_interval_is_rejected() {
        let config = SessionConfig {
            cleanup_interval_seconds: 0,
            ..SessionConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cleanup_interval_seconds"));

        let config = SessionConfig {
            idle_timeout_minutes: 0,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn server_config_fills_optional_sections() {
        let config: ServerConfig = serde_json::from_value(serde_json::json!({
            "oidc": {
                "issuer_url": "https://auth.example.com/realms/dlza",
                "client_id": "clerk",
                "client_secret": "secret",
                "redirect_uri": "https://clerk.example.com/auth/callback"
            },
            "authz": {"mutation_policy": "operation_specific"}
        }))
        .expect("deserialize");

        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert!(config.database_url.is_none());
        assert_eq!(config.provider, RetryPolicy::default());
        assert_eq!(config.authz.admin_group, "dlza-admin");
        assert_eq!(config.authz.mutation_policy, MutationPolicy::OperationSpecific);
    }
}
