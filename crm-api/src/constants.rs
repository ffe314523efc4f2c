//! Defaults shared by the auth and HTTP configuration.

/// Lifetime of issued tokens: one hour.
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 3600;
/// Grace period on `exp`.
pub const DEFAULT_JWT_CLOCK_SKEW_SECS: i64 = 60;
/// Shortest HMAC secret accepted in production.
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

/// Preflight cache lifetime: one day.
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86_400;

// requests per minute
pub const DEFAULT_RATE_LIMIT_UNAUTHENTICATED: u32 = 100;
pub const DEFAULT_RATE_LIMIT_AUTHENTICATED: u32 = 1000;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;
/// Tracked keys per limiter before idle ones are pruned.
pub const DEFAULT_RATE_LIMIT_MAX_KEYS: usize = 10_000;
