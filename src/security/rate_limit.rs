//! Sliding-window rate limiting backed by a shared key-value store.
//!
//! # Algorithm
//! ```text
//! whitelisted?           → admit, no store access
//! read window[key]       → error: admit iff ignore_errors, else fail
//! missing or now > reset → remaining = total, reset = now + expire
//! remaining -= 1         (floored at -1)
//! write window[key]      (TTL = expire)
//! remaining >= 0         → admit, else Retry-After + rejection handler
//! ```
//!
//! # Design Decisions
//! - Windows reset lazily on the first request after `reset`
//! - Read-modify-write is not atomic; concurrent requests for one key may
//!   under-count slightly, which is accepted in exchange for no locks
//! - Numeric options are hot-reloadable through [`RateLimiter::reload`]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderValue, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::store::{Clock, KeyValueStore};

pub const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
pub const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
pub const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";
pub const RETRY_AFTER: &str = "retry-after";

/// Produces key parts for a request.
pub type LookupFn = Arc<dyn Fn(&Request<Body>) -> Vec<String> + Send + Sync>;
/// Joins key parts into a storage key.
pub type KeyFormatterFn = Arc<dyn Fn(&[String]) -> String + Send + Sync>;
/// Returns true for requests that bypass limiting.
pub type WhitelistFn = Arc<dyn Fn(&Request<Body>) -> bool + Send + Sync>;
/// Builds the response for a limited request.
pub type RateLimitedFn = Arc<dyn Fn(&Request<Body>, &RateLimitWindow) -> Response + Send + Sync>;

/// Per-key counter state, stored as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub total: u64,
    pub remaining: i64,
    /// Window end as Unix milliseconds.
    pub reset: u64,
}

impl RateLimitWindow {
    fn fresh(total: u64, now: u64, expire_ms: u64) -> Self {
        Self {
            total,
            remaining: budget(total),
            reset: now.saturating_add(expire_ms),
        }
    }

    /// Remaining requests as shown to clients.
    pub fn display_remaining(&self) -> u64 {
        self.remaining.max(0) as u64
    }

    /// Reset as Unix seconds, rounded up.
    pub fn reset_secs(&self) -> u64 {
        self.reset.div_ceil(1000)
    }

    /// Whole seconds until the window resets, never negative.
    pub fn retry_after_secs(&self, now: u64) -> u64 {
        self.reset.saturating_sub(now).div_ceil(1000)
    }
}

/// `total` as a signed counter, saturating at `i64::MAX`.
fn budget(total: u64) -> i64 {
    i64::try_from(total).unwrap_or(i64::MAX)
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Whitelisted, or the store failed and errors are ignored.
    Bypass,
    Admit(RateLimitWindow),
    Reject {
        window: RateLimitWindow,
        retry_after: u64,
    },
}

/// Remote address recorded by axum's `ConnectInfo`, if any.
pub fn remote_address(request: &Request<Body>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn default_lookup(request: &Request<Body>) -> Vec<String> {
    vec![
        request.uri().path().to_string(),
        request.method().to_string(),
        remote_address(request)
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string()),
    ]
}

fn default_rejection(_request: &Request<Body>, _window: &RateLimitWindow) -> Response {
    (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded").into_response()
}

/// Admission control per logical key.
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    options: ArcSwap<RateLimitConfig>,
    lookup: Option<LookupFn>,
    key_formatter: Option<KeyFormatterFn>,
    whitelist: Option<WhitelistFn>,
    on_rate_limited: Option<RateLimitedFn>,
}

impl RateLimiter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        options: RateLimitConfig,
    ) -> Self {
        Self {
            store,
            clock,
            options: ArcSwap::from_pointee(options),
            lookup: None,
            key_formatter: None,
            whitelist: None,
            on_rate_limited: None,
        }
    }

    pub fn with_lookup<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request<Body>) -> Vec<String> + Send + Sync + 'static,
    {
        self.lookup = Some(Arc::new(f));
        self
    }

    pub fn with_key_formatter<F>(mut self, f: F) -> Self
    where
        F: Fn(&[String]) -> String + Send + Sync + 'static,
    {
        self.key_formatter = Some(Arc::new(f));
        self
    }

    pub fn with_whitelist<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request<Body>) -> bool + Send + Sync + 'static,
    {
        self.whitelist = Some(Arc::new(f));
        self
    }

    pub fn with_on_rate_limited<F>(mut self, f: F) -> Self
    where
        F: Fn(&Request<Body>, &RateLimitWindow) -> Response + Send + Sync + 'static,
    {
        self.on_rate_limited = Some(Arc::new(f));
        self
    }

    /// Current options.
    pub fn options(&self) -> Arc<RateLimitConfig> {
        self.options.load_full()
    }

    /// Swap in new options; existing windows keep their reset time.
    pub fn reload(&self, options: RateLimitConfig) {
        tracing::info!(
            total = options.total,
            expire_ms = options.expire_ms,
            "Rate limit options reloaded"
        );
        self.options.store(Arc::new(options));
    }

    fn is_whitelisted(&self, request: &Request<Body>, options: &RateLimitConfig) -> bool {
        if let Some(whitelist) = &self.whitelist {
            if whitelist(request) {
                return true;
            }
        }

        match remote_address(request) {
            Some(addr) => {
                let ip = addr.ip().to_string();
                options.whitelist.iter().any(|allowed| *allowed == ip)
            }
            None => false,
        }
    }

    /// Storage key for a request.
    pub fn key_for(&self, request: &Request<Body>) -> String {
        self.key_with(request, &self.options())
    }

    fn key_with(&self, request: &Request<Body>, options: &RateLimitConfig) -> String {
        let parts = match &self.lookup {
            Some(lookup) => lookup(request),
            None => default_lookup(request),
        };
        match &self.key_formatter {
            Some(format) => format(&parts),
            None => format!("{}:{}", options.key_prefix, parts.join(":")),
        }
    }

    /// Storage key for a request, or `None` when it is whitelisted.
    pub fn admission_key(&self, request: &Request<Body>) -> Option<String> {
        let options = self.options();
        if self.is_whitelisted(request, &options) {
            return None;
        }
        Some(self.key_with(request, &options))
    }

    /// Run the window algorithm for one request.
    pub async fn check(&self, request: &Request<Body>) -> GatewayResult<Decision> {
        match self.admission_key(request) {
            Some(key) => self.check_key(key).await,
            None => Ok(Decision::Bypass),
        }
    }

    /// Run the window algorithm for an already derived key.
    pub async fn check_key(&self, key: String) -> GatewayResult<Decision> {
        let options = self.options();
        let stored = match self.store.get(&key).await {
            Ok(stored) => stored,
            Err(e) if options.ignore_errors => {
                tracing::warn!(key = %key, error = %e, "Rate limit store read failed, admitting");
                return Ok(Decision::Bypass);
            }
            Err(e) => return Err(e.into()),
        };

        let now = self.clock.now_millis();
        let mut window = match stored {
            Some(raw) => match serde_json::from_str::<RateLimitWindow>(&raw) {
                Ok(window) => window,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Discarding unreadable rate limit window");
                    RateLimitWindow::fresh(options.total, now, options.expire_ms)
                }
            },
            None => RateLimitWindow::fresh(options.total, now, options.expire_ms),
        };

        if now > window.reset {
            window.reset = now.saturating_add(options.expire_ms);
            window.remaining = budget(options.total);
        }
        window.total = options.total;
        window.remaining = (window.remaining.min(budget(options.total)) - 1).max(-1);

        let serialized = serde_json::to_string(&window)
            .map_err(|e| GatewayError::internal(format!("Failed to encode rate limit window: {}", e)))?;
        if let Err(e) = self
            .store
            .set_with_ttl(&key, serialized, Duration::from_millis(options.expire_ms))
            .await
        {
            if !options.ignore_errors {
                return Err(e.into());
            }
            tracing::warn!(key = %key, error = %e, "Rate limit store write failed");
        }

        if window.remaining >= 0 {
            Ok(Decision::Admit(window))
        } else {
            let retry_after = window.retry_after_secs(now);
            tracing::warn!(key = %key, retry_after = retry_after, "Rate limit exceeded");
            Ok(Decision::Reject {
                window,
                retry_after,
            })
        }
    }

    /// Write the informational headers unless `skip_headers` is set.
    pub fn apply_headers(
        &self,
        headers: &mut HeaderMap,
        window: &RateLimitWindow,
        retry_after: Option<u64>,
    ) {
        if self.options().skip_headers {
            return;
        }

        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(window.total));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(window.display_remaining()));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(window.reset_secs()));
        if let Some(after) = retry_after {
            headers.insert(RETRY_AFTER, HeaderValue::from(after));
        }
    }

    fn rejection(&self, request: &Request<Body>, window: &RateLimitWindow) -> Response {
        match &self.on_rate_limited {
            Some(handler) => handler(request, window),
            None => default_rejection(request, window),
        }
    }
}

/// Middleware applying a [`RateLimiter`] to a route.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let key = limiter.admission_key(&request);
    let decision = match key {
        Some(key) => limiter.check_key(key).await?,
        None => Decision::Bypass,
    };
    match decision {
        Decision::Bypass => Ok(next.run(request).await),
        Decision::Admit(window) => {
            let mut response = next.run(request).await;
            limiter.apply_headers(response.headers_mut(), &window, None);
            Ok(response)
        }
        Decision::Reject {
            window,
            retry_after,
        } => {
            metrics::record_rate_limited();
            let mut response = limiter.rejection(&request, &window);
            limiter.apply_headers(response.headers_mut(), &window, Some(retry_after));
            Ok(response)
        }
    }
}
