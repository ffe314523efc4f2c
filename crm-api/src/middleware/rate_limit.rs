//! Token-bucket rate limiting.
//!
//! Authenticated requests are limited per tenant, everything else per
//! client IP. Both use a keyed `governor` limiter; once a limiter tracks
//! more than `rate_limit_max_keys` keys, the ones whose bucket has fully
//! refilled are dropped.

use crate::auth::AuthContext;
use crate::config::ApiConfig;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::RETRY_AFTER, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use crm_core::TenantId;
use governor::{clock::Clock, clock::DefaultClock, DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::hash::Hash;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");

#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq)]
pub enum RateLimitKey {
    Ip(IpAddr),
    Tenant(TenantId),
}

#[derive(Clone)]
pub struct RateLimitState {
    config: Arc<ApiConfig>,
    by_ip: Arc<DefaultKeyedRateLimiter<IpAddr>>,
    by_tenant: Arc<DefaultKeyedRateLimiter<TenantId>>,
}

impl RateLimitState {
    pub fn new(config: ApiConfig) -> Self {
        let quota = |per_minute: u32| {
            let non_zero = |n: u32| NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN);
            Quota::per_minute(non_zero(per_minute)).allow_burst(non_zero(config.rate_limit_burst))
        };
        Self {
            by_ip: Arc::new(RateLimiter::dashmap(quota(config.rate_limit_unauthenticated))),
            by_tenant: Arc::new(RateLimiter::dashmap(quota(config.rate_limit_authenticated))),
            config: Arc::new(config),
        }
    }

    /// Requests per minute for this kind of key.
    fn per_minute(&self, key: RateLimitKey) -> u32 {
        match key {
            RateLimitKey::Ip(_) => self.config.rate_limit_unauthenticated,
            RateLimitKey::Tenant(_) => self.config.rate_limit_authenticated,
        }
    }

    /// Seconds until `key` may retry, or `None` if the request is admitted.
    fn check(&self, key: RateLimitKey) -> Option<u64> {
        let max_keys = self.config.rate_limit_max_keys;
        match key {
            RateLimitKey::Ip(ip) => check_keyed(&self.by_ip, &ip, max_keys),
            RateLimitKey::Tenant(tenant) => check_keyed(&self.by_tenant, &tenant, max_keys),
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.by_ip.len() + self.by_tenant.len()
    }
}

fn check_keyed<K>(limiter: &DefaultKeyedRateLimiter<K>, key: &K, max_keys: usize) -> Option<u64>
where
    K: Hash + Eq + Clone,
{
    let outcome = limiter.check_key(key);
    if limiter.len() > max_keys {
        limiter.retain_recent();
        limiter.shrink_to_fit();
        tracing::debug!(remaining = limiter.len(), max_keys, "pruned idle rate limit keys");
    }
    outcome.err().map(|not_until| {
        not_until
            .wait_time_from(DefaultClock::default().now())
            .as_secs()
            .max(1)
    })
}

/// 429 carrying a `Retry-After` header.
#[derive(Debug)]
pub struct RateLimitError {
    pub retry_after: u64,
}

impl IntoResponse for RateLimitError {
    fn into_response(self) -> Response {
        let mut response = ApiError::too_many_requests(Some(self.retry_after)).into_response();
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(self.retry_after));
        response
    }
}

/// The socket peer, unless forwarding headers are trusted, in which case
/// the first `X-Forwarded-For` hop or `X-Real-IP` wins.
fn client_ip(request: &Request, peer: Option<SocketAddr>, trust_forwarded: bool) -> IpAddr {
    let peer_ip = || peer.map(|addr| addr.ip());
    if !trust_forwarded {
        return peer_ip().unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    let headers = request.headers();
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next());
    let real_ip = headers.get("x-real-ip").and_then(|v| v.to_str().ok());

    forwarded
        .into_iter()
        .chain(real_ip)
        .find_map(|candidate| candidate.trim().parse().ok())
        .or_else(peer_ip)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn key_for(request: &Request, peer: Option<SocketAddr>, trust_forwarded: bool) -> RateLimitKey {
    match request.extensions().get::<AuthContext>() {
        Some(auth) => RateLimitKey::Tenant(auth.tenant_id),
        None => RateLimitKey::Ip(client_ip(request, peer, trust_forwarded)),
    }
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, RateLimitError> {
    if !state.config.rate_limit_enabled {
        return Ok(next.run(request).await);
    }

    let key = key_for(
        &request,
        connect_info.map(|ConnectInfo(addr)| addr),
        state.config.trust_forwarded_headers,
    );
    if let Some(retry_after) = state.check(key) {
        tracing::debug!(?key, retry_after, "rate limit exceeded");
        return Err(RateLimitError { retry_after });
    }

    let mut response = next.run(request).await;
    response
        .headers_mut()
        .insert(LIMIT_HEADER, HeaderValue::from(state.per_minute(key)));
    Ok(response)
}
