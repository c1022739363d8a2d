//! Checkout configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `CHECKOUT_API_BASE_URL` - Base URL of the cart/address/order services
//!
//! ## Optional
//! - `CHECKOUT_GEO_BASE_URL` - Geo lookup base URL (default: `{CHECKOUT_API_BASE_URL}/geo/`)
//! - `CHECKOUT_API_TOKEN` - Bearer token for an authenticated buyer (high entropy)
//! - `CHECKOUT_OWNER_ID` - Authenticated buyer ID; unset means guest checkout
//! - `CHECKOUT_LOCATION_TTL_SECS` - Location list lifetime (default: 300)
//! - `CHECKOUT_LOCATION_SWEEP_SECS` - Expiry sweep interval (default: 60)
//! - `CHECKOUT_LOCATION_CAPACITY` - Maximum cached location lists (default: 2000)
//! - `CHECKOUT_BOOTSTRAP_TIMEOUT_SECS` - Initial cart/address load bound (default: 15)
//! - `CHECKOUT_REQUEST_TIMEOUT_SECS` - Per-request HTTP timeout (default: 30)
//! - `CHECKOUT_PARCEL_WEIGHT` - Parcel weight in grams (default: 1000)
//! - `CHECKOUT_PARCEL_LENGTH` / `_WIDTH` / `_HEIGHT` - Parcel size in cm (default: 20/20/10)
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment tag

use std::str::FromStr;
use std::time::Duration;

use cartwheel_core::OwnerId;
use secrecy::SecretString;
use thiserror::Error;
use url::Url;

use crate::pricing::ParcelProfile;

/// Bearer tokens below this many bits per character are rejected.
const MIN_TOKEN_BITS_PER_CHAR: f64 = 3.3;

/// Fragments of sample tokens copied from `.env.example` files (lowercase).
const SAMPLE_TOKEN_MARKERS: &[&str] = &["your-", "changeme", "placeholder", "example", "xxx", "token-here"];

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

/// Complete checkout configuration.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub api: ApiConfig,
    pub location: LocationConfig,
    /// Parcel profile sent with every shipping quote
    pub parcel: ParcelProfile,
    /// Upper bound on the initial cart and address load
    pub bootstrap_timeout: Duration,
    /// Authenticated buyer, if any
    pub owner_id: Option<OwnerId>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    pub sentry_environment: Option<String>,
}

/// Remote service endpoints.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct ApiConfig {
    /// Base URL for cart, address, shipping, discount, order and payment calls
    pub base_url: Url,
    /// Base URL for province/district/ward lookups
    pub geo_base_url: Url,
    /// Bearer token for an authenticated buyer
    pub token: Option<SecretString>,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url.as_str())
            .field("geo_base_url", &self.geo_base_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl ApiConfig {
    /// Endpoints rooted at `base_url`, with geo lookups under `geo/`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEnvVar` if `base_url` is not an absolute URL.
    pub fn for_base_url(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = parse_base_url("CHECKOUT_API_BASE_URL", base_url)?;
        let geo_base_url = base_url
            .join("geo/")
            .map_err(|e| ConfigError::InvalidEnvVar("CHECKOUT_GEO_BASE_URL".to_string(), e.to_string()))?;
        Ok(Self {
            base_url,
            geo_base_url,
            token: None,
            request_timeout: Duration::from_secs(30),
        })
    }
}

/// Location cache tuning.
#[derive(Debug, Clone)]
pub struct LocationConfig {
    /// Lifetime of a cached list
    pub ttl: Duration,
    /// Interval of the background expiry sweep
    pub sweep_interval: Duration,
    /// Maximum number of cached lists
    pub capacity: u64,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            sweep_interval: Duration::from_secs(60),
            capacity: 2000,
        }
    }
}

impl CheckoutConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the API token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`CheckoutConfig::from_env`].
    pub fn from_source(source: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { source };

        let mut api = ApiConfig::for_base_url(&env.required("CHECKOUT_API_BASE_URL")?)?;
        if let Some(geo) = env.optional("CHECKOUT_GEO_BASE_URL") {
            api.geo_base_url = parse_base_url("CHECKOUT_GEO_BASE_URL", &geo)?;
        }
        api.token = env.validated_secret("CHECKOUT_API_TOKEN")?;
        api.request_timeout = env.seconds_or("CHECKOUT_REQUEST_TIMEOUT_SECS", 30)?;

        let location = LocationConfig {
            ttl: env.seconds_or("CHECKOUT_LOCATION_TTL_SECS", 300)?,
            sweep_interval: env.seconds_or("CHECKOUT_LOCATION_SWEEP_SECS", 60)?,
            capacity: env.parsed_or("CHECKOUT_LOCATION_CAPACITY", 2000)?,
        };

        let defaults = ParcelProfile::default();
        let parcel = ParcelProfile {
            weight: env.parsed_or("CHECKOUT_PARCEL_WEIGHT", defaults.weight)?,
            length: env.parsed_or("CHECKOUT_PARCEL_LENGTH", defaults.length)?,
            width: env.parsed_or("CHECKOUT_PARCEL_WIDTH", defaults.width)?,
            height: env.parsed_or("CHECKOUT_PARCEL_HEIGHT", defaults.height)?,
        };

        let owner_id = env
            .optional("CHECKOUT_OWNER_ID")
            .map(|raw| {
                raw.parse::<OwnerId>().map_err(|e| {
                    ConfigError::InvalidEnvVar("CHECKOUT_OWNER_ID".to_string(), e.to_string())
                })
            })
            .transpose()?;

        Ok(Self {
            api,
            location,
            parcel,
            bootstrap_timeout: env.seconds_or("CHECKOUT_BOOTSTRAP_TIMEOUT_SECS", 15)?,
            owner_id,
            sentry_dsn: env.optional("SENTRY_DSN"),
            sentry_environment: env.optional("SENTRY_ENVIRONMENT"),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

struct Env<F> {
    source: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// Get an optional variable; blank counts as unset.
    fn optional(&self, key: &str) -> Option<String> {
        (self.source)(key).filter(|v| !v.trim().is_empty())
    }

    /// Get a required variable.
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    /// Parse a variable, falling back to a default when unset.
    fn parsed_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
            None => Ok(default),
        }
    }

    /// Parse a positive number of seconds.
    fn seconds_or(&self, key: &str, default: u64) -> Result<Duration, ConfigError> {
        let secs: u64 = self.parsed_or(key, default)?;
        if secs == 0 {
            return Err(ConfigError::InvalidEnvVar(
                key.to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        Ok(Duration::from_secs(secs))
    }

    /// Load and validate an optional secret.
    fn validated_secret(&self, key: &str) -> Result<Option<SecretString>, ConfigError> {
        self.optional(key)
            .map(|value| {
                check_api_token(key, &value)?;
                Ok(SecretString::from(value))
            })
            .transpose()
    }
}

/// Parse a base URL, ensuring a trailing slash so relative joins append.
fn parse_base_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let mut raw = raw.trim().to_string();
    if !raw.ends_with('/') {
        raw.push('/');
    }
    let url = Url::parse(&raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be an absolute http(s) URL".to_string(),
        ));
    }
    Ok(url)
}

/// Shannon entropy of a token, in bits per character.
#[allow(clippy::cast_precision_loss)]
fn bits_per_char(token: &str) -> f64 {
    let mut chars: Vec<char> = token.chars().collect();
    if chars.is_empty() {
        return 0.0;
    }
    chars.sort_unstable();

    let len = chars.len() as f64;
    chars
        .chunk_by(|a, b| a == b)
        .map(|run| {
            let p = run.len() as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Reject sample values and trivially guessable API tokens.
fn check_api_token(key: &str, token: &str) -> Result<(), ConfigError> {
    let lower = token.to_lowercase();
    if let Some(marker) = SAMPLE_TOKEN_MARKERS.iter().find(|m| lower.contains(**m)) {
        return Err(ConfigError::InsecureSecret(
            key.to_string(),
            format!("looks like a sample value (contains '{marker}')"),
        ));
    }

    let bits = bits_per_char(token);
    if bits < MIN_TOKEN_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            key.to_string(),
            format!("too predictable for a bearer token ({bits:.2} bits/char)"),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config =
            CheckoutConfig::from_source(source(&[("CHECKOUT_API_BASE_URL", "https://shop.test/api")]))
                .unwrap();

        assert_eq!(config.api.base_url.as_str(), "https://shop.test/api/");
        assert_eq!(config.api.geo_base_url.as_str(), "https://shop.test/api/geo/");
        assert!(config.api.token.is_none());
        assert_eq!(config.location.ttl, Duration::from_secs(300));
        assert_eq!(config.location.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.location.capacity, 2000);
        assert_eq!(config.bootstrap_timeout, Duration::from_secs(15));
        assert_eq!(config.parcel, ParcelProfile::default());
        assert!(config.owner_id.is_none());
    }

    #[test]
    fn test_missing_base_url() {
        let err = CheckoutConfig::from_source(source(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "CHECKOUT_API_BASE_URL"));
    }

    #[test]
    fn test_overrides() {
        let config = CheckoutConfig::from_source(source(&[
            ("CHECKOUT_API_BASE_URL", "http://localhost:8080/"),
            ("CHECKOUT_GEO_BASE_URL", "http://geo.local/master-data"),
            ("CHECKOUT_OWNER_ID", "42"),
            ("CHECKOUT_LOCATION_TTL_SECS", "10"),
            ("CHECKOUT_PARCEL_WEIGHT", "2500"),
        ]))
        .unwrap();

        assert_eq!(config.api.geo_base_url.as_str(), "http://geo.local/master-data/");
        assert_eq!(config.owner_id, Some(OwnerId::new(42)));
        assert_eq!(config.location.ttl, Duration::from_secs(10));
        assert_eq!(config.parcel.weight, 2500);
        assert_eq!(config.parcel.height, 10);
    }

    #[test]
    fn test_invalid_numbers_are_rejected() {
        let err = CheckoutConfig::from_source(source(&[
            ("CHECKOUT_API_BASE_URL", "http://localhost:8080"),
            ("CHECKOUT_LOCATION_TTL_SECS", "five"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(key, _) if key == "CHECKOUT_LOCATION_TTL_SECS"));

        let err = CheckoutConfig::from_source(source(&[
            ("CHECKOUT_API_BASE_URL", "http://localhost:8080"),
            ("CHECKOUT_BOOTSTRAP_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar(_, _)));
    }

    #[test]
    fn test_placeholder_token_rejected() {
        let err = CheckoutConfig::from_source(source(&[
            ("CHECKOUT_API_BASE_URL", "http://localhost:8080"),
            ("CHECKOUT_API_TOKEN", "your-token-here"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
    }

    #[test]
    fn test_token_kept_and_redacted() {
        let config = CheckoutConfig::from_source(source(&[
            ("CHECKOUT_API_BASE_URL", "http://localhost:8080"),
            ("CHECKOUT_API_TOKEN", "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6"),
        ]))
        .unwrap();

        let token = config.api.token.as_ref().unwrap();
        assert_eq!(token.expose_secret(), "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6");
        let debug_output = format!("{:?}", config.api);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("aB3$xY9"));
    }

    #[test]
    fn test_bits_per_char() {
        assert!(bits_per_char("").abs() < f64::EPSILON);
        assert!(bits_per_char("aaaaaaa").abs() < f64::EPSILON);
        assert!((bits_per_char("abab") - 1.0).abs() < 0.01);
        assert!(bits_per_char("aB3$xY9!mK2@nL5#") > MIN_TOKEN_BITS_PER_CHAR);
    }

    #[test]
    fn test_repetitive_token_rejected() {
        let result = check_api_token("CHECKOUT_API_TOKEN", "abababababababababababababababab");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }
}
