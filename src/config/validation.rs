//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system, including on reload

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::security::pow::parse_target;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

/// Longest rate-limit window: one year.
pub const MAX_EXPIRE_MS: u64 = 365 * 24 * 60 * 60 * 1000;
/// Longest proof-of-work retarget period: thirty days.
pub const MAX_RETARGET_PERIOD_SECS: u64 = 30 * 24 * 60 * 60;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be > 0"));
    }

    if config.security.max_body_size == 0 {
        errors.push(ValidationError::new("security.max_body_size", "must be > 0"));
    }
    if config.security.nonce_retention_secs == 0 {
        errors.push(ValidationError::new("security.nonce_retention_secs", "must be > 0"));
    }
    if config.security.purge_interval_secs == 0 {
        errors.push(ValidationError::new("security.purge_interval_secs", "must be > 0"));
    }

    let rate_limit = &config.rate_limit;
    if rate_limit.total > i64::MAX as u64 {
        errors.push(ValidationError::new(
            "rate_limit.total",
            format!("must be <= {}", i64::MAX),
        ));
    }
    if rate_limit.expire_ms == 0 || rate_limit.expire_ms > MAX_EXPIRE_MS {
        errors.push(ValidationError::new(
            "rate_limit.expire_ms",
            format!("must be in 1..={}", MAX_EXPIRE_MS),
        ));
    }
    if rate_limit.key_prefix.trim().is_empty() {
        errors.push(ValidationError::new("rate_limit.key_prefix", "must not be empty"));
    }
    for address in &rate_limit.whitelist {
        if address.parse::<IpAddr>().is_err() {
            errors.push(ValidationError::new(
                "rate_limit.whitelist",
                format!("'{}' is not an IP address", address),
            ));
        }
    }

    let pow = &config.pow;
    match parse_target(&pow.initial_target) {
        Some(target) if !target.is_zero() => {}
        _ => errors.push(ValidationError::new(
            "pow.initial_target",
            "must be a non-zero hex value of at most 32 bytes",
        )),
    }
    if pow.retarget_period_secs == 0 || pow.retarget_period_secs > MAX_RETARGET_PERIOD_SECS {
        errors.push(ValidationError::new(
            "pow.retarget_period_secs",
            format!("must be in 1..={}", MAX_RETARGET_PERIOD_SECS),
        ));
    }
    if pow.expected_per_period == 0 {
        errors.push(ValidationError::new("pow.expected_per_period", "must be > 0"));
    }
    if pow.challenge_ttl_secs == 0 {
        errors.push(ValidationError::new("pow.challenge_ttl_secs", "must be > 0"));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if !LOG_FORMATS.contains(&observability.log_format.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format '{}'", observability.log_format),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(validate_config(&GatewayConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.rate_limit.expire_ms = 0;
        config.rate_limit.whitelist = vec!["10.0.0.1".into(), "localhost".into()];
        config.pow.initial_target = "zz".into();
        config.observability.log_format = "xml".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "rate_limit.expire_ms",
                "rate_limit.whitelist",
                "pow.initial_target",
                "observability.log_format",
            ]
        );
    }

    #[test]
    fn test_zero_target_rejected() {
        let mut config = GatewayConfig::default();
        config.pow.initial_target = "00".into();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_window_bounds() {
        let mut config = GatewayConfig::default();
        config.rate_limit.total = i64::MAX as u64;
        config.rate_limit.expire_ms = MAX_EXPIRE_MS;
        config.pow.retarget_period_secs = MAX_RETARGET_PERIOD_SECS;
        assert_eq!(validate_config(&config), Ok(()));

        config.rate_limit.total = u64::MAX;
        config.rate_limit.expire_ms = u64::MAX;
        config.pow.retarget_period_secs = u64::MAX;
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["rate_limit.total", "rate_limit.expire_ms", "pow.retarget_period_secs"]
        );
    }

    #[test]
    fn test_zero_total_allowed() {
        let mut config = GatewayConfig::default();
        config.rate_limit.total = 0;
        assert!(validate_config(&config).is_ok());
    }
}
