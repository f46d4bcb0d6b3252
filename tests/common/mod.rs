//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header::AUTHORIZATION, HeaderMap, Method, Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use k256::ecdsa::SigningKey;
use serde_json::Value;
use tower::ServiceExt;

use bridge_gateway::config::GatewayConfig;
use bridge_gateway::http::{GatewayServer, Stores};
use bridge_gateway::security::signature::{public_key_hex, sign_request};
use bridge_gateway::store::{
    ManualClock, MemoryBucketStore, MemoryKeyValueStore, MemoryNonceStore, MemoryPublicKeyStore,
    MemoryTokenStore, MemoryUserStore, PublicKeyRecord, User,
};

pub const START_MS: u64 = 1_000_000;
pub const CLIENT: [u8; 4] = [203, 0, 113, 7];

pub const ADMIN: &str = "admin@storj.io";
pub const MEMBER: &str = "member@storj.io";
pub const SECRET: &str = "password";

/// A gateway over in-memory stores with a manual clock.
pub struct TestGateway {
    pub router: Router,
    pub server: GatewayServer,
    pub clock: Arc<ManualClock>,
    pub users: MemoryUserStore,
    pub keys: MemoryPublicKeyStore,
    pub tokens: MemoryTokenStore,
    pub buckets: MemoryBucketStore,
    pub kv: Arc<MemoryKeyValueStore>,
    /// Registered to [`MEMBER`].
    pub member_key: SigningKey,
    /// Registered to [`ADMIN`].
    pub admin_key: SigningKey,
}

pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.rate_limit.total = 100;
    config.pow.initial_target =
        "0fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff".to_string();
    config
}

impl TestGateway {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: GatewayConfig) -> Self {
        let clock = Arc::new(ManualClock::new(START_MS));
        let users = MemoryUserStore::new();
        let keys = MemoryPublicKeyStore::new();
        let tokens = MemoryTokenStore::new();
        let buckets = MemoryBucketStore::new();
        let kv = Arc::new(MemoryKeyValueStore::new());

        let member_key = SigningKey::from_slice(&[7u8; 32]).unwrap();
        let admin_key = SigningKey::from_slice(&[9u8; 32]).unwrap();

        users.insert(User::new(MEMBER), SECRET);
        users.insert(User::new(ADMIN).with_role("admin"), SECRET);
        for (key, user) in [(&member_key, MEMBER), (&admin_key, ADMIN)] {
            keys.insert(PublicKeyRecord {
                key: public_key_hex(key),
                user: user.to_string(),
                label: None,
            });
        }

        let stores = Stores {
            users: Arc::new(users.clone()),
            keys: Arc::new(keys.clone()),
            nonces: Arc::new(MemoryNonceStore::new(clock.clone())),
            tokens: Arc::new(tokens.clone()),
            buckets: Arc::new(buckets.clone()),
            kv: kv.clone(),
            clock: clock.clone(),
        };
        let server = GatewayServer::new(config, stores);

        Self {
            router: server.router(),
            server,
            clock,
            users,
            keys,
            tokens,
            buckets,
            kv,
            member_key,
            admin_key,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send(&self.router, request).await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn error(&self) -> Option<&str> {
        self.body.get("error").and_then(Value::as_str)
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    TestResponse {
        status,
        headers,
        body,
    }
}

/// Request builder carrying the peer address axum would record.
pub fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    request_from(method, uri, CLIENT)
}

pub fn request_from(method: Method, uri: &str, ip: [u8; 4]) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from((ip, 52000))))
}

pub fn basic(method: Method, uri: &str, user: &str, secret: &str) -> Request<Body> {
    let credentials = STANDARD.encode(format!("{}:{}", user, secret));
    request(method, uri)
        .header(AUTHORIZATION, format!("Basic {}", credentials))
        .body(Body::empty())
        .unwrap()
}

/// Signed read request; `query` must already contain the nonce.
pub fn signed_get(key: &SigningKey, path: &str, query: &str) -> Request<Body> {
    let signature = sign_request(key, &Method::GET, path, Some(query), &[]).unwrap();
    request(Method::GET, &format!("{}?{}", path, query))
        .header("x-signature", signature)
        .header("x-pubkey", public_key_hex(key))
        .body(Body::empty())
        .unwrap()
}

/// Signed JSON write request.
pub fn signed_post(key: &SigningKey, path: &str, body: &Value) -> Request<Body> {
    let bytes = serde_json::to_vec(body).unwrap();
    let signature = sign_request(key, &Method::POST, path, None, &bytes).unwrap();
    request(Method::POST, path)
        .header("content-type", "application/json")
        .header("x-signature", signature)
        .header("x-pubkey", public_key_hex(key))
        .body(Body::from(bytes))
        .unwrap()
}
