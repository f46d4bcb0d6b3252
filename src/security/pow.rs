//! Proof-of-work admission for anonymous contact endpoints.
//!
//! A client asks for a challenge, searches for a nonce whose double SHA-256
//! with the challenge falls under the target, then presents both headers.
//! Challenges are single use and the target retargets toward an expected
//! number of solved challenges per period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::U256;
use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::PowConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::store::{Clock, KeyValueStore};

pub const X_CHALLENGE: &str = "x-challenge";
pub const X_CHALLENGE_NONCE: &str = "x-challenge-nonce";

const CHALLENGE_PREFIX: &str = "contact-";
const STATS_KEY: &str = "contact-stats";
const MAX_ADJUSTMENT: u64 = 4;

/// A freshly issued challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge: String,
    pub target: String,
}

/// `SHA-256(SHA-256(challenge || nonce))` as a big-endian integer.
pub fn work_value(challenge: &[u8], nonce: &[u8]) -> U256 {
    let first = Sha256::new().chain_update(challenge).chain_update(nonce).finalize();
    let second = Sha256::digest(first);
    U256::from_be_bytes::<32>(second.into())
}

pub fn encode_target(target: U256) -> String {
    hex::encode(target.to_be_bytes::<32>())
}

pub fn parse_target(hex_target: &str) -> Option<U256> {
    let bytes = hex::decode(hex_target.trim()).ok()?;
    if bytes.len() > 32 {
        return None;
    }
    U256::try_from_be_slice(&bytes)
}

/// Search nonces `0..max_attempts` for one meeting `target`.
pub fn solve(challenge_hex: &str, target_hex: &str, max_attempts: u64) -> Option<String> {
    let challenge = hex::decode(challenge_hex).ok()?;
    let target = parse_target(target_hex)?;
    (0..max_attempts)
        .map(|n| n.to_be_bytes())
        .find(|nonce| work_value(&challenge, nonce) <= target)
        .map(hex::encode)
}

/// Scale `target` by `expected / observed`, limited to a 4x move either way.
pub fn adjust_target(target: U256, expected: u64, observed: u64) -> U256 {
    let target = target.max(U256::from(1u8));
    let factor = U256::from(MAX_ADJUSTMENT);
    let ceiling = target.saturating_mul(factor);
    let floor = (target / factor).max(U256::from(1u8));

    if observed == 0 {
        return ceiling;
    }

    let expected = U256::from(expected.max(1));
    let observed = U256::from(observed);
    let scaled = match target.checked_mul(expected) {
        Some(product) => product / observed,
        None => (target / observed).saturating_mul(expected),
    };

    scaled.clamp(floor, ceiling).max(U256::from(1u8))
}

pub struct ProofOfWork {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: PowConfig,
}

impl ProofOfWork {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: PowConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    fn initial_target(&self) -> U256 {
        parse_target(&self.config.initial_target).unwrap_or(U256::MAX)
    }

    /// Target for new challenges, retargeting once per period.
    pub async fn current_target(&self) -> GatewayResult<U256> {
        let stats: HashMap<String, String> = self.store.hash_get_all(STATS_KEY).await?;
        let now = self.clock.now_millis();

        let target = stats
            .get("target")
            .and_then(|t| parse_target(t))
            .unwrap_or_else(|| self.initial_target());
        let started = stats.get("timestamp").and_then(|t| t.parse::<u64>().ok());

        let started = match started {
            Some(started) => started,
            None => {
                self.store
                    .hash_set(STATS_KEY, "timestamp", now.to_string())
                    .await?;
                self.store
                    .hash_set(STATS_KEY, "target", encode_target(target))
                    .await?;
                return Ok(target);
            }
        };

        let period_ms = self.config.retarget_period_secs.saturating_mul(1000);
        if now.saturating_sub(started) < period_ms {
            return Ok(target);
        }

        let observed = stats
            .get("count")
            .and_then(|c| c.parse::<u64>().ok())
            .unwrap_or(0);
        let next = adjust_target(target, self.config.expected_per_period, observed);

        tracing::info!(
            observed = observed,
            expected = self.config.expected_per_period,
            target = %encode_target(next),
            "Proof of work retargeted"
        );

        self.store
            .hash_set(STATS_KEY, "target", encode_target(next))
            .await?;
        self.store
            .hash_set(STATS_KEY, "timestamp", now.to_string())
            .await?;
        self.store.hash_set(STATS_KEY, "count", "0".to_string()).await?;
        Ok(next)
    }

    /// Issue a random single-use challenge at the current target.
    pub async fn issue_challenge(&self) -> GatewayResult<Challenge> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let challenge = hex::encode(bytes);
        let target = encode_target(self.current_target().await?);

        self.store
            .set_with_ttl(
                &format!("{}{}", CHALLENGE_PREFIX, challenge),
                target.clone(),
                Duration::from_secs(self.config.challenge_ttl_secs),
            )
            .await?;

        Ok(Challenge { challenge, target })
    }

    /// Check a presented solution and consume the challenge.
    pub async fn verify(&self, challenge: Option<&str>, nonce: Option<&str>) -> GatewayResult<()> {
        let challenge = challenge
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GatewayError::not_authorized("Challenge not found"))?;
        let key = format!("{}{}", CHALLENGE_PREFIX, challenge);

        let target = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| GatewayError::not_authorized("Challenge not found"))?;
        let target = parse_target(&target)
            .ok_or_else(|| GatewayError::internal("Stored challenge target is malformed"))?;

        let challenge_bytes = hex::decode(challenge);
        let nonce_bytes = nonce.map(|n| hex::decode(n.trim()));
        let solved = match (challenge_bytes, nonce_bytes) {
            (Ok(c), Some(Ok(n))) => work_value(&c, &n) <= target,
            _ => false,
        };

        if !solved {
            metrics::record_pow("invalid");
            return Err(GatewayError::not_authorized("Invalid proof of work"));
        }

        self.store.delete(&key).await?;
        self.store.hash_increment(STATS_KEY, "count", 1).await?;
        metrics::record_pow("solved");
        Ok(())
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub async fn pow_middleware(
    State(pow): State<Arc<ProofOfWork>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let challenge = header_value(request.headers(), X_CHALLENGE);
    let nonce = header_value(request.headers(), X_CHALLENGE_NONCE);

    pow.verify(challenge.as_deref(), nonce.as_deref()).await?;
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ManualClock, MemoryKeyValueStore};

    const CHALLENGE: &str = "2db77b11eab714c46febb51a78d56d9b34b306d6fc46aa6e6e25a92b48eff4bf";
    const HARD_TARGET: &str = "00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";
    const EASY_CHALLENGE: &str = "4fccbb094116bf90e8dcea7e2b531b9a52574737a6cab9e77e2e5599fd35eb5b";
    const EASY_TARGET: &str = "ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff";

    fn config() -> PowConfig {
        PowConfig {
            initial_target: HARD_TARGET.to_string(),
            retarget_period_secs: 600,
            expected_per_period: 10,
            challenge_ttl_secs: 3600,
        }
    }

    async fn fixture() -> (ProofOfWork, Arc<MemoryKeyValueStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryKeyValueStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        store
            .set_with_ttl(
                &format!("contact-{}", CHALLENGE),
                HARD_TARGET.into(),
                Duration::from_secs(3600),
            )
            .await
            .unwrap();
        store
            .set_with_ttl(
                &format!("contact-{}", EASY_CHALLENGE),
                EASY_TARGET.into(),
                Duration::from_secs(3600),
            )
            .await
            .unwrap();
        store.hash_set(STATS_KEY, "count", "0".into()).await.unwrap();
        let pow = ProofOfWork::new(store.clone(), clock.clone(), config());
        (pow, store, clock)
    }

    #[tokio::test]
    async fn test_invalid_proof_of_work() {
        let (pow, _, _) = fixture().await;
        let err = pow.verify(Some(CHALLENGE), Some("dd170bf2")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthorized(ref m) if m == "Invalid proof of work"));
    }

    #[tokio::test]
    async fn test_unknown_challenge() {
        let (pow, _, _) = fixture().await;
        let unknown = "328bfdaa0d2bf6c3c6495f06ffc2087e0b092fa534f1dea699b88f11b0082ab2";
        let err = pow.verify(Some(unknown), Some("dd170bf2")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthorized(ref m) if m == "Challenge not found"));

        let err = pow.verify(None, Some("dd170bf2")).await.unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthorized(ref m) if m == "Challenge not found"));
    }

    #[tokio::test]
    async fn test_solution_consumes_challenge_and_counts() {
        let (pow, store, _) = fixture().await;
        pow.verify(Some(EASY_CHALLENGE), Some("dd170bf2")).await.unwrap();

        let stats = store.hash_get_all(STATS_KEY).await.unwrap();
        assert_eq!(stats.get("count").map(String::as_str), Some("1"));
        assert_eq!(
            store.get(&format!("contact-{}", EASY_CHALLENGE)).await.unwrap(),
            None
        );

        // Single use.
        assert!(pow.verify(Some(EASY_CHALLENGE), Some("dd170bf2")).await.is_err());
    }

    #[tokio::test]
    async fn test_issue_and_solve() {
        let store = Arc::new(MemoryKeyValueStore::new());
        let mut cfg = config();
        cfg.initial_target = "0fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff".into();
        let pow = ProofOfWork::new(store.clone(), Arc::new(ManualClock::new(0)), cfg);

        let issued = pow.issue_challenge().await.unwrap();
        assert_eq!(issued.challenge.len(), 64);
        assert_eq!(issued.target, pow_target_hex("0f"));

        let nonce = solve(&issued.challenge, &issued.target, 100_000).unwrap();
        pow.verify(Some(&issued.challenge), Some(&nonce)).await.unwrap();
    }

    fn pow_target_hex(prefix: &str) -> String {
        format!("{}{}", prefix, "f".repeat(64 - prefix.len()))
    }

    #[test]
    fn test_adjust_target_bounds() {
        let target = U256::from(1_000_000u64);
        assert_eq!(adjust_target(target, 10, 10), target);
        assert_eq!(adjust_target(target, 10, 20), U256::from(500_000u64));
        assert_eq!(adjust_target(target, 10, 1000), U256::from(250_000u64));
        assert_eq!(adjust_target(target, 10, 5), U256::from(2_000_000u64));
        assert_eq!(adjust_target(target, 10, 0), U256::from(4_000_000u64));
        assert_eq!(adjust_target(U256::MAX, 10, 1), U256::MAX);
        assert_eq!(adjust_target(U256::from(1u8), 1, 100), U256::from(1u8));
    }

    #[tokio::test]
    async fn test_retarget_after_period() {
        let (pow, store, clock) = fixture().await;
        let initial = parse_target(HARD_TARGET).unwrap();

        assert_eq!(pow.current_target().await.unwrap(), initial);

        // Twice the expected solves within one period halves the target.
        store.hash_set(STATS_KEY, "count", "20".into()).await.unwrap();
        clock.advance(600_000);
        let next = pow.current_target().await.unwrap();
        assert_eq!(next, initial * U256::from(10u8) / U256::from(20u8));

        let stats = store.hash_get_all(STATS_KEY).await.unwrap();
        assert_eq!(stats.get("count").map(String::as_str), Some("0"));

        // Inside the period the target holds.
        clock.advance(1_000);
        assert_eq!(pow.current_target().await.unwrap(), next);
    }
}
