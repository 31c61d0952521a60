//! Service configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `ACCOUNT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `CLERK_SECRET_KEY` - Clerk backend API secret key
//!
//! ## Optional
//! - `ACCOUNT_HOST` - Bind address (default: 127.0.0.1)
//! - `ACCOUNT_PORT` - Listen port (default: 8080)
//! - `ACCOUNT_MODE` - Deployment mode, used as the Sentry environment fallback (default: development)
//! - `REDIS_URL` - Redis connection string; the in-process cache is used when unset
//! - `CACHE_TTL_SHORT_SECS` - TTL for list results (default: 60)
//! - `CACHE_TTL_MEDIUM_SECS` - Medium TTL (default: 3600)
//! - `CACHE_TTL_LONG_SECS` - Long TTL (default: 86400)
//! - `CACHE_MAX_ENTRIES` - In-process cache capacity (default: 10000)
//! - `CACHE_POPULATE_WORKERS` - Concurrent cache writes (default: 4)
//! - `CACHE_POPULATE_QUEUE` - Pending cache writes before new ones are dropped (default: 256)
//! - `CLERK_API_URL` - Clerk backend API base URL (default: <https://api.clerk.com/v1>)
//! - `IDENTITY_REQUEST_TIMEOUT_SECS` - Per-request timeout for Clerk calls (default: 10)
//! - `COMPENSATION_TIMEOUT_SECS` - Budget for deleting an orphaned identity (default: 3)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "put-your",
];

const DEFAULT_CLERK_API_URL: &str = "https://api.clerk.com/v1";

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Account service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Deployment mode (development, staging, production)
    pub mode: String,
    /// List cache configuration
    pub cache: CacheConfig,
    /// Identity provider configuration
    pub identity: IdentityConfig,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (defaults to `mode`)
    pub sentry_environment: Option<String>,
}

/// Cache configuration.
///
/// Implements `Debug` manually to redact credentials embedded in the Redis URL.
#[derive(Clone)]
pub struct CacheConfig {
    /// Redis URL; `None` selects the in-process cache
    pub redis_url: Option<SecretString>,
    /// TTL applied to cached list results
    pub ttl_short: Duration,
    pub ttl_medium: Duration,
    pub ttl_long: Duration,
    /// Maximum entries held by the in-process cache
    pub max_entries: u64,
    /// Maximum concurrent population writes
    pub populate_workers: usize,
    /// Capacity of the population queue
    pub populate_queue: usize,
}

impl std::fmt::Debug for CacheConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheConfig")
            .field(
                "redis_url",
                &self.redis_url.as_ref().map(|_| "[REDACTED]"),
            )
            .field("ttl_short", &self.ttl_short)
            .field("ttl_medium", &self.ttl_medium)
            .field("ttl_long", &self.ttl_long)
            .field("max_entries", &self.max_entries)
            .field("populate_workers", &self.populate_workers)
            .field("populate_queue", &self.populate_queue)
            .finish()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl_short: Duration::from_secs(60),
            ttl_medium: Duration::from_secs(3600),
            ttl_long: Duration::from_secs(86_400),
            max_entries: 10_000,
            populate_workers: 4,
            populate_queue: 256,
        }
    }
}

/// Identity provider (Clerk) configuration.
///
/// Implements `Debug` manually to redact the secret key.
#[derive(Clone)]
pub struct IdentityConfig {
    /// Backend API base URL
    pub api_url: Url,
    /// Backend API secret key
    pub secret_key: SecretString,
    /// Timeout applied to each identity provider request
    pub request_timeout: Duration,
    /// Budget for the compensating delete after a failed registration
    pub compensation_timeout: Duration,
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("api_url", &self.api_url.as_str())
            .field("secret_key", &"[REDACTED]")
            .field("request_timeout", &self.request_timeout)
            .field("compensation_timeout", &self.compensation_timeout)
            .finish()
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets look like placeholders.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("ACCOUNT_DATABASE_URL")?;
        let host = parse_env_or_default::<IpAddr>("ACCOUNT_HOST", "127.0.0.1")?;
        let port = parse_env_or_default::<u16>("ACCOUNT_PORT", "8080")?;
        let mode = get_env_or_default("ACCOUNT_MODE", "development");

        let cache = CacheConfig::from_env()?;
        let identity = IdentityConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment =
            get_optional_env("SENTRY_ENVIRONMENT").or_else(|| Some(mode.clone()));

        Ok(Self {
            database_url,
            host,
            port,
            mode,
            cache,
            identity,
            sentry_dsn,
            sentry_environment,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

impl CacheConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let populate_workers = parse_env_or_default::<usize>("CACHE_POPULATE_WORKERS", "4")?;
        if populate_workers == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CACHE_POPULATE_WORKERS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let populate_queue = parse_env_or_default::<usize>("CACHE_POPULATE_QUEUE", "256")?;
        if populate_queue == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "CACHE_POPULATE_QUEUE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            redis_url: get_optional_env("REDIS_URL").map(SecretString::from),
            ttl_short: get_duration_secs("CACHE_TTL_SHORT_SECS", "60")?,
            ttl_medium: get_duration_secs("CACHE_TTL_MEDIUM_SECS", "3600")?,
            ttl_long: get_duration_secs("CACHE_TTL_LONG_SECS", "86400")?,
            max_entries: parse_env_or_default::<u64>("CACHE_MAX_ENTRIES", "10000")?,
            populate_workers,
            populate_queue,
        })
    }
}

impl IdentityConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            api_url: parse_env_or_default::<Url>("CLERK_API_URL", DEFAULT_CLERK_API_URL)?,
            secret_key: get_validated_secret("CLERK_SECRET_KEY")?,
            request_timeout: get_duration_secs("IDENTITY_REQUEST_TIMEOUT_SECS", "10")?,
            compensation_timeout: get_duration_secs("COMPENSATION_TIMEOUT_SECS", "3")?,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_env_or_default<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_value(key, &get_env_or_default(key, default))
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Parse a whole number of seconds into a `Duration`.
fn get_duration_secs(key: &str, default: &str) -> Result<Duration, ConfigError> {
    parse_env_or_default::<u64>(key, default).map(Duration::from_secs)
}

/// Reject secrets that look like copy-pasted placeholders.
fn validate_secret(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.trim().is_empty() {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "must not be empty".to_string(),
        ));
    }

    let lower = secret.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_secret_placeholder() {
        let result = validate_secret("your-clerk-key-here", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_changeme() {
        assert!(validate_secret("CHANGEME", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_empty() {
        assert!(validate_secret("   ", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_valid() {
        assert!(validate_secret("sk_live_4f9a1c7e2b8d", "TEST_VAR").is_ok());
    }

    #[test]
    fn test_parse_value_invalid_number() {
        let result = parse_value::<u64>("CACHE_TTL_SHORT_SECS", "soon");
        assert!(matches!(
            result,
            Err(ConfigError::InvalidEnvVar(key, _)) if key == "CACHE_TTL_SHORT_SECS"
        ));
    }

    #[test]
    fn test_parse_value_trims() {
        let port: u16 = parse_value("ACCOUNT_PORT", " 8080 ").unwrap();
        assert_eq!(port, 8080);
    }

    #[test]
    fn test_parse_value_url() {
        let url: Url = parse_value("CLERK_API_URL", DEFAULT_CLERK_API_URL).unwrap();
        assert_eq!(url.host_str(), Some("api.clerk.com"));
    }

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl_short, Duration::from_secs(60));
        assert_eq!(config.ttl_medium, Duration::from_secs(3600));
        assert_eq!(config.ttl_long, Duration::from_secs(86_400));
        assert!(config.redis_url.is_none());
    }

    #[test]
    fn test_identity_config_debug_redacts_secret() {
        let config = IdentityConfig {
            api_url: Url::parse(DEFAULT_CLERK_API_URL).unwrap(),
            secret_key: SecretString::from("sk_live_4f9a1c7e2b8d"),
            request_timeout: Duration::from_secs(10),
            compensation_timeout: Duration::from_secs(3),
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk_live"));
        assert!(debug.contains("[REDACTED]"));
    }
}
