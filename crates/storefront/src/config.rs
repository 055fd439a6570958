//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `STOREFRONT_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `STOREFRONT_BASE_URL` - Public URL for the storefront, used in email links
//!
//! ## Optional
//! - `STOREFRONT_HOST` - Bind address (default: 127.0.0.1)
//! - `STOREFRONT_PORT` - Listen port (default: 3000)
//! - `STOREFRONT_TAX_RATE` - Tax rate as a fraction (default: 0.08)
//! - `STOREFRONT_NOTIFY_TIMEOUT_SECS` - Upper bound for one notification send (default: 10)
//! - `SMTP_HOST`, `SMTP_PORT` (587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM` -
//!   outgoing mail; when `SMTP_HOST` is unset notifications are disabled, otherwise
//!   the rest of the group is required
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name
//! - `SENTRY_SAMPLE_RATE` - Error sample rate (default: 1.0)
//! - `SENTRY_TRACES_SAMPLE_RATE` - Performance sample rate (default: 0.0)

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use bazaar_core::TaxRate;

/// Values that must never be deployed as an SMTP password (case-insensitive).
const PLACEHOLDER_PATTERNS: &[&str] = &["changeme", "placeholder", "your-", "xxx", "todo"];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Storefront application configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the storefront
    pub base_url: String,
    /// Tax applied to every order subtotal
    pub tax_rate: TaxRate,
    /// Upper bound on a single notification send
    pub notify_timeout: Duration,
    /// Outgoing mail; `None` disables notifications
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g. "production")
    pub sentry_environment: Option<String>,
    /// Fraction of errors sent to Sentry
    pub sentry_sample_rate: f32,
    /// Fraction of transactions traced
    pub sentry_traces_sample_rate: f32,
}

/// SMTP settings.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: SecretString,
    /// Sender address, e.g. `Bazaar <orders@bazaar.test>`
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let database_url = env
            .get("STOREFRONT_DATABASE_URL")
            .or_else(|| env.get("DATABASE_URL"))
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar("STOREFRONT_DATABASE_URL".to_string()))?;
        let host = env.parse_or("STOREFRONT_HOST", "127.0.0.1")?;
        let port = env.parse_or("STOREFRONT_PORT", "3000")?;
        let base_url = validate_base_url(&env.required("STOREFRONT_BASE_URL")?)?;
        let tax_rate = env.parse_or::<TaxRate>("STOREFRONT_TAX_RATE", "0.08")?;
        let notify_timeout = Duration::from_secs(env.parse_or("STOREFRONT_NOTIFY_TIMEOUT_SECS", "10")?);
        let email = EmailConfig::from_env(&env)?;

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            tax_rate,
            notify_timeout,
            email,
            sentry_dsn: env.get("SENTRY_DSN"),
            sentry_environment: env.get("SENTRY_ENVIRONMENT"),
            sentry_sample_rate: env.parse_or("SENTRY_SAMPLE_RATE", "1.0")?,
            sentry_traces_sample_rate: env.parse_or("SENTRY_TRACES_SAMPLE_RATE", "0.0")?,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether session cookies must be marked `Secure`.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl EmailConfig {
    fn from_env<F: Fn(&str) -> Option<String>>(env: &Env<F>) -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = env.get("SMTP_HOST") else {
            return Ok(None);
        };
        let smtp_password = env.required("SMTP_PASSWORD")?;
        reject_placeholder(&smtp_password, "SMTP_PASSWORD")?;

        Ok(Some(Self {
            smtp_host,
            smtp_port: env.parse_or("SMTP_PORT", "587")?,
            smtp_username: env.required("SMTP_USERNAME")?,
            smtp_password: SecretString::from(smtp_password),
            from_address: env.required("EMAIL_FROM")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Variable source; empty values count as unset.
struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Get an optional variable.
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Parse a variable, using `default` when it is unset.
    fn parse_or<T>(&self, key: &str, default: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.get(key).unwrap_or_else(|| default.to_string());
        raw.trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
    }
}

/// Require an absolute http(s) URL and strip any trailing slash.
fn validate_base_url(raw: &str) -> Result<String, ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidEnvVar("STOREFRONT_BASE_URL".to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigError::InvalidEnvVar(
            "STOREFRONT_BASE_URL".to_string(),
            "must be an http or https URL with a host".to_string(),
        ));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn reject_placeholder(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();
    if let Some(pattern) = PLACEHOLDER_PATTERNS.iter().find(|p| lower.contains(*p)) {
        return Err(ConfigError::InvalidEnvVar(
            var_name.to_string(),
            format!("appears to be a placeholder (contains '{pattern}')"),
        ));
    }
    Ok(())
}
