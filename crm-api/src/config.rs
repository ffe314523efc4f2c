//! API Configuration Module
//!
//! CORS and rate limiting settings for the HTTP surface. Loaded from
//! `CRM_*` environment variables with development-friendly defaults.

use crate::constants::{
    DEFAULT_CORS_MAX_AGE_SECS, DEFAULT_RATE_LIMIT_AUTHENTICATED, DEFAULT_RATE_LIMIT_BURST,
    DEFAULT_RATE_LIMIT_MAX_KEYS, DEFAULT_RATE_LIMIT_UNAUTHENTICATED,
};

// ============================================================================
// API CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ApiConfig {
    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins. Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    pub cors_allow_credentials: bool,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    // ========================================================================
    // Rate Limiting Configuration
    // ========================================================================
    pub rate_limit_enabled: bool,

    /// Requests per minute per client IP.
    pub rate_limit_unauthenticated: u32,

    /// Requests per minute per tenant.
    pub rate_limit_authenticated: u32,

    /// Burst capacity beyond the steady rate.
    pub rate_limit_burst: u32,

    /// Keys tracked per limiter before idle ones are pruned.
    pub rate_limit_max_keys: usize,

    /// Take the client IP from `X-Forwarded-For`/`X-Real-IP`. Only safe
    /// behind a proxy that overwrites those headers.
    pub trust_forwarded_headers: bool,

    /// Record Prometheus metrics and serve them at `/metrics`.
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            cors_allow_credentials: false,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
            rate_limit_enabled: true,
            rate_limit_unauthenticated: DEFAULT_RATE_LIMIT_UNAUTHENTICATED,
            rate_limit_authenticated: DEFAULT_RATE_LIMIT_AUTHENTICATED,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_max_keys: DEFAULT_RATE_LIMIT_MAX_KEYS,
            trust_forwarded_headers: false,
            metrics_enabled: true,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// - `CRM_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `CRM_CORS_ALLOW_CREDENTIALS`: "true" or "false"
    /// - `CRM_CORS_MAX_AGE_SECS`
    /// - `CRM_RATE_LIMIT_ENABLED`: anything but "false" enables it
    /// - `CRM_RATE_LIMIT_UNAUTHENTICATED`, `CRM_RATE_LIMIT_AUTHENTICATED`
    /// - `CRM_RATE_LIMIT_BURST`, `CRM_RATE_LIMIT_MAX_KEYS`
    /// - `CRM_TRUST_FORWARDED_HEADERS`: "true" behind a trusted proxy
    /// - `CRM_METRICS_ENABLED`: "false" turns off `/metrics` and recording
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let cors_origins = std::env::var("CRM_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let cors_allow_credentials = std::env::var("CRM_CORS_ALLOW_CREDENTIALS")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let rate_limit_enabled = std::env::var("CRM_RATE_LIMIT_ENABLED")
            .map(|s| !s.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Self {
            cors_origins,
            cors_allow_credentials,
            cors_max_age_secs: env_parse("CRM_CORS_MAX_AGE_SECS")
                .unwrap_or(defaults.cors_max_age_secs),
            rate_limit_enabled,
            rate_limit_unauthenticated: env_parse("CRM_RATE_LIMIT_UNAUTHENTICATED")
                .unwrap_or(defaults.rate_limit_unauthenticated),
            rate_limit_authenticated: env_parse("CRM_RATE_LIMIT_AUTHENTICATED")
                .unwrap_or(defaults.rate_limit_authenticated),
            rate_limit_burst: env_parse("CRM_RATE_LIMIT_BURST")
                .unwrap_or(defaults.rate_limit_burst),
            rate_limit_max_keys: env_parse("CRM_RATE_LIMIT_MAX_KEYS")
                .unwrap_or(defaults.rate_limit_max_keys),
            trust_forwarded_headers: env_parse("CRM_TRUST_FORWARDED_HEADERS")
                .unwrap_or(defaults.trust_forwarded_headers),
            metrics_enabled: env_parse("CRM_METRICS_ENABLED")
                .unwrap_or(defaults.metrics_enabled),
        }
    }

    /// Strict CORS is on once any origin is configured.
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }

    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        if self.cors_origins.is_empty() {
            return true;
        }

        self.cors_origins.iter().any(|allowed| {
            if allowed == origin {
                return true;
            }
            // *.example.com matches any https subdomain
            match (allowed.strip_prefix("*."), origin.strip_prefix("https://")) {
                (Some(suffix), Some(host)) => {
                    host == suffix || host.ends_with(&format!(".{}", suffix))
                }
                _ => false,
            }
        })
    }
}
