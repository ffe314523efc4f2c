//! Request authentication.
//!
//! A caller presents either an `X-API-Key` header or an
//! `Authorization: Bearer <jwt>` header. Either way the request ends up with
//! an [`AuthContext`] naming the tenant it acts for, and every ordered list
//! the handlers touch is scoped to that tenant.
//!
//! Tenant resolution: a JWT `tenant_id` claim binds the caller to that
//! tenant and an `X-Tenant-ID` naming another one is rejected with 403.
//! Otherwise the header names the tenant, falling back to the nil tenant
//! when the deployment does not require one.

use crate::constants::{
    DEFAULT_JWT_CLOCK_SKEW_SECS, DEFAULT_JWT_EXPIRATION_SECS, MIN_JWT_SECRET_LENGTH,
};
use crate::error::{ApiError, ApiResult};
use crm_core::{ConfigError, CrmError, EntityIdType, TenantId};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Placeholder used when `CRM_JWT_SECRET` is unset. Refused in production.
const DEV_SECRET: &str = "crm-dev-secret-do-not-deploy";

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "now" for token expiry checks.
pub trait JwtClock: Send + Sync {
    /// Unix epoch seconds. Negative when the host clock is before 1970.
    fn now_epoch_secs(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Clock frozen at a given epoch second.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// SECRET
// ============================================================================

/// HMAC signing secret. Its `Debug` output only reveals the length.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// # Errors
    /// `ConfigError::MissingRequired` for an empty string.
    pub fn new(secret: String) -> Result<Self, CrmError> {
        if secret.is_empty() {
            return Err(CrmError::Config(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            }));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    fn dev_placeholder() -> Self {
        Self(SecretString::new(DEV_SECRET.into()))
    }

    /// Read `CRM_JWT_SECRET`, falling back to the development placeholder.
    fn from_env() -> Self {
        std::env::var("CRM_JWT_SECRET")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .and_then(|s| Self::new(s).ok())
            .unwrap_or_else(Self::dev_placeholder)
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.expose().len()
    }

    pub fn is_empty(&self) -> bool {
        self.expose().is_empty()
    }

    pub fn is_dev_placeholder(&self) -> bool {
        self.expose() == DEV_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret(<{} bytes>)", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Clone)]
pub struct AuthConfig {
    /// Accepted `X-API-Key` values.
    pub api_keys: HashSet<String>,
    pub jwt_secret: JwtSecret,
    pub jwt_algorithm: Algorithm,
    /// Lifetime of issued tokens.
    pub jwt_expiration_secs: i64,
    /// Grace period applied to `exp`.
    pub jwt_clock_skew_secs: i64,
    /// Reject requests that name no tenant at all.
    pub require_tenant_header: bool,
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_keys", &self.api_keys.len())
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("require_tenant_header", &self.require_tenant_header)
            .finish_non_exhaustive()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            api_keys: HashSet::new(),
            jwt_secret: JwtSecret::from_env(),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            jwt_clock_skew_secs: DEFAULT_JWT_CLOCK_SKEW_SECS,
            require_tenant_header: true,
            clock: Arc::new(SystemClock),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl AuthConfig {
    /// Build from the environment.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `CRM_API_KEYS` (comma separated) | none |
    /// | `CRM_JWT_SECRET` | development placeholder |
    /// | `CRM_JWT_EXPIRATION_SECS` | 3600 |
    /// | `CRM_JWT_CLOCK_SKEW_SECS` | 60 |
    /// | `CRM_REQUIRE_TENANT_HEADER` | true |
    pub fn from_env() -> Self {
        let api_keys: HashSet<String> = std::env::var("CRM_API_KEYS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            api_keys,
            jwt_expiration_secs: env_or("CRM_JWT_EXPIRATION_SECS", DEFAULT_JWT_EXPIRATION_SECS),
            jwt_clock_skew_secs: env_or("CRM_JWT_CLOCK_SKEW_SECS", DEFAULT_JWT_CLOCK_SKEW_SECS),
            require_tenant_header: env_or("CRM_REQUIRE_TENANT_HEADER", true),
            ..Self::default()
        }
    }

    /// Check the signing secret. A placeholder or short secret is an error
    /// when `production` is set and a warning otherwise.
    pub fn check_secret(&self, production: bool) -> ApiResult<()> {
        let problem = if self.jwt_secret.is_dev_placeholder() {
            Some("CRM_JWT_SECRET is not set".to_string())
        } else if self.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            Some(format!(
                "JWT secret has {} bytes, at least {} are required",
                self.jwt_secret.len(),
                MIN_JWT_SECRET_LENGTH
            ))
        } else {
            None
        };

        match problem {
            Some(problem) if production => Err(ApiError::invalid_input(format!(
                "refusing to start in production: {}",
                problem
            ))),
            Some(problem) => {
                tracing::warn!(%problem, "weak JWT secret");
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn add_api_key(&mut self, key: String) {
        self.api_keys.insert(key);
    }

    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.api_keys.contains(key)
    }

    /// A token's `tenant_id` claim is authoritative; a header may only
    /// repeat it. Without a claim the header decides, and with neither the
    /// nil tenant is used for single-tenant deployments.
    fn resolve_tenant(&self, header: Option<&str>, claim: Option<TenantId>) -> ApiResult<TenantId> {
        let header = header.map(extract_tenant_id).transpose()?;
        match (header, claim) {
            (Some(named), Some(claimed)) if named != claimed => {
                tracing::warn!(
                    claimed_tenant = %claimed,
                    header_tenant = %named,
                    "X-Tenant-ID does not match token tenant"
                );
                Err(ApiError::forbidden("X-Tenant-ID does not match the token's tenant"))
            }
            (_, Some(claimed)) => Ok(claimed),
            (Some(named), None) => Ok(named),
            (None, None) if self.require_tenant_header => Err(ApiError::missing_field("X-Tenant-ID")),
            (None, None) => Ok(TenantId::new(Uuid::nil())),
        }
    }
}

// ============================================================================
// CLAIMS AND CONTEXT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Claims {
    pub fn tenant_id(&self) -> Option<TenantId> {
        self.tenant_id
            .as_deref()
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(TenantId::new)
    }
}

/// The authenticated caller. The auth middleware stores it in request
/// extensions; handlers read it through `AuthExtractor`.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: String,
    pub tenant_id: TenantId,
    pub auth_method: AuthMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    ApiKey,
    Jwt,
}

/// Credential presented on a request. An API key wins over a bearer token.
#[derive(Debug, Clone, Copy)]
enum Credential<'a> {
    ApiKey(&'a str),
    Bearer(&'a str),
}

impl<'a> Credential<'a> {
    fn from_headers(api_key: Option<&'a str>, authorization: Option<&'a str>) -> ApiResult<Self> {
        if let Some(key) = api_key {
            return Ok(Self::ApiKey(key));
        }
        let authorization = authorization.ok_or_else(|| {
            ApiError::unauthorized("Authentication required: send X-API-Key or a bearer token")
        })?;
        authorization
            .strip_prefix("Bearer ")
            .map(Self::Bearer)
            .ok_or_else(|| ApiError::invalid_token("Authorization header must use Bearer scheme"))
    }
}

// ============================================================================
// TOKENS
// ============================================================================

pub fn validate_api_key(config: &AuthConfig, api_key: &str) -> ApiResult<()> {
    if config.is_valid_api_key(api_key) {
        Ok(())
    } else {
        Err(ApiError::unauthorized("Invalid API key"))
    }
}

/// Verify the signature, then check `exp` against `config.clock`.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.required_spec_claims = HashSet::from(["exp".to_string()]);

    let claims = decode::<Claims>(token, &key, &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token(format!("Token rejected: {}", e)),
        })?
        .claims;

    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(now, "host clock is before the Unix epoch");
        return Err(ApiError::internal_error("Server clock is misconfigured"));
    }
    if claims.exp + config.jwt_clock_skew_secs < now {
        return Err(ApiError::token_expired());
    }
    Ok(claims)
}

/// Sign a token for `user_id`, optionally bound to a tenant.
pub fn generate_jwt_token(
    config: &AuthConfig,
    user_id: String,
    tenant_id: Option<TenantId>,
) -> ApiResult<String> {
    let now = config.clock.now_epoch_secs();
    let claims = Claims {
        sub: user_id,
        iat: now,
        exp: now + config.jwt_expiration_secs,
        tenant_id: tenant_id.map(|t| t.to_string()),
    };
    let key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    encode(&Header::new(config.jwt_algorithm), &claims, &key)
        .map_err(|e| ApiError::internal_error(format!("Failed to sign token: {}", e)))
}

/// Parse an `X-Tenant-ID` value.
pub fn extract_tenant_id(header_value: &str) -> ApiResult<TenantId> {
    Uuid::parse_str(header_value.trim())
        .map(TenantId::new)
        .map_err(|_| ApiError::invalid_format("X-Tenant-ID", "valid UUID"))
}

// ============================================================================
// AUTHENTICATION
// ============================================================================

pub fn authenticate_api_key(
    config: &AuthConfig,
    api_key: &str,
    tenant_header: Option<&str>,
) -> ApiResult<AuthContext> {
    validate_api_key(config, api_key)?;
    let prefix: String = api_key.chars().take(8).collect();
    Ok(AuthContext {
        user_id: format!("key:{}", prefix),
        tenant_id: config.resolve_tenant(tenant_header, None)?,
        auth_method: AuthMethod::ApiKey,
    })
}

pub fn authenticate_jwt(
    config: &AuthConfig,
    token: &str,
    tenant_header: Option<&str>,
) -> ApiResult<AuthContext> {
    let claims = validate_jwt_token(config, token)?;
    let tenant_id = config.resolve_tenant(tenant_header, claims.tenant_id())?;
    Ok(AuthContext {
        user_id: claims.sub,
        tenant_id,
        auth_method: AuthMethod::Jwt,
    })
}

/// Authenticate a request from its raw header values.
pub fn authenticate(
    config: &AuthConfig,
    api_key_header: Option<&str>,
    auth_header: Option<&str>,
    tenant_header: Option<&str>,
) -> ApiResult<AuthContext> {
    match Credential::from_headers(api_key_header, auth_header)? {
        Credential::ApiKey(key) => authenticate_api_key(config, key, tenant_header),
        Credential::Bearer(token) => authenticate_jwt(config, token, tenant_header),
    }
}
