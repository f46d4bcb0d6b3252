//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML and every
//! section has defaults, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, request timeout).
    pub listener: ListenerConfig,

    /// Request size limits for the security middleware.
    pub security: SecurityConfig,

    /// Rate limiting; hot reloadable.
    pub rate_limit: RateLimitConfig,

    /// Proof-of-work challenge settings.
    pub pow: PowConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Whole-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Largest body buffered for signature checks, in bytes.
    pub max_body_size: usize,

    /// How long the in-memory nonce ledger remembers a nonce.
    pub nonce_retention_secs: u64,

    /// Seconds between in-memory store cleanup passes.
    pub purge_interval_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024,
            nonce_retention_secs: 24 * 60 * 60,
            purge_interval_secs: 60,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Apply the limiter to rate-limited routes.
    pub enabled: bool,

    /// Requests allowed per window. Zero blocks everything.
    pub total: u64,

    /// Window length in milliseconds.
    pub expire_ms: u64,

    /// Omit the `X-RateLimit-*` headers.
    pub skip_headers: bool,

    /// Admit requests when the store fails.
    pub ignore_errors: bool,

    /// Prefix for storage keys.
    pub key_prefix: String,

    /// Client addresses that are never limited.
    pub whitelist: Vec<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            total: 10,
            expire_ms: 1000 * 60 * 60,
            skip_headers: false,
            ignore_errors: false,
            key_prefix: "rateLimit".to_string(),
            whitelist: Vec::new(),
        }
    }
}

/// Proof-of-work configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PowConfig {
    /// Hex target used before the first retarget.
    pub initial_target: String,

    /// Seconds between retargets.
    pub retarget_period_secs: u64,

    /// Solved challenges wanted per period.
    pub expected_per_period: u64,

    /// Lifetime of an issued challenge in seconds.
    pub challenge_ttl_secs: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            initial_target: "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"
                .to_string(),
            retarget_period_secs: 60 * 10,
            expected_per_period: 10,
            challenge_ttl_secs: 60 * 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
