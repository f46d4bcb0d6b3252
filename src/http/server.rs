//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the gateway's demo routes
//! - Wire the security middleware onto the routes that need it
//! - Wire up tower layers (tracing, request ID, timeout, body limit)
//! - Bind the server and shut down gracefully
//!
//! # Routes
//! ```text
//! GET  /health               no checks
//! GET  /users/me             authenticate → rate limit (POST too)
//! GET  /admin/stats          authenticate → authorize(admin) → rate limit
//! GET  /contacts/challenge   rate limit
//! POST /contacts             proof of work → rate limit
//! GET  /tokens/current       x-token → rate limit
//! POST /buckets/{id}/tokens  public bucket permission → rate limit
//! ```
//! The rate limiter is route-gated and runs after the route's own checks, so
//! rejected credentials never spend a client's budget. `/health` is never
//! limited.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Extension, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::GatewayResult;
use crate::security::pow::Challenge;
use crate::security::{
    authenticate_middleware, authorize_middleware, pow_middleware, public_bucket_middleware,
    rate_limit_middleware, token_middleware, AuthenticateState, Authenticator, Authorized,
    Authorizer, Identity, ProofOfWork, PublicBucket, RateLimiter, RoleGate, TokenAuth,
};
use crate::store::{
    Bucket, BucketStore, Clock, KeyValueStore, MemoryBucketStore, MemoryKeyValueStore,
    MemoryNonceStore, MemoryPublicKeyStore, MemoryTokenStore, MemoryUserStore, NonceStore,
    PublicKeyStore, SystemClock, Token, TokenStore, UserStore,
};

/// Collaborator handles the gateway is built from.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub keys: Arc<dyn PublicKeyStore>,
    pub nonces: Arc<dyn NonceStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub buckets: Arc<dyn BucketStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub clock: Arc<dyn Clock>,
}

impl Stores {
    /// Empty in-memory stores on the system clock.
    pub fn in_memory() -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        Self {
            users: Arc::new(MemoryUserStore::new()),
            keys: Arc::new(MemoryPublicKeyStore::new()),
            nonces: Arc::new(MemoryNonceStore::new(clock.clone())),
            tokens: Arc::new(MemoryTokenStore::new()),
            buckets: Arc::new(MemoryBucketStore::new()),
            kv: Arc::new(MemoryKeyValueStore::new()),
            clock,
        }
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pow: Arc<ProofOfWork>,
    pub kv: Arc<dyn KeyValueStore>,
}

/// UUID v4 request ids.
#[derive(Clone, Copy, Default)]
struct UuidRequestId;

impl MakeRequestId for UuidRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// HTTP server for the gateway.
pub struct GatewayServer {
    router: Router,
    config: GatewayConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl GatewayServer {
    pub fn new(config: GatewayConfig, stores: Stores) -> Self {
        let rate_limiter = Arc::new(RateLimiter::new(
            stores.kv.clone(),
            stores.clock.clone(),
            config.rate_limit.clone(),
        ));
        let router = Self::build_router(&config, &stores, rate_limiter.clone());
        Self {
            router,
            config,
            rate_limiter,
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, stores: &Stores, limiter: Arc<RateLimiter>) -> Router {
        let max_body_size = config.security.max_body_size;
        let auth_state = AuthenticateState {
            authenticator: Arc::new(Authenticator::new(
                stores.users.clone(),
                stores.keys.clone(),
                stores.nonces.clone(),
            )),
            max_body_size,
        };
        let admin_gate = RoleGate::new(Arc::new(Authorizer::new(stores.users.clone())), "admin");
        let pow = Arc::new(ProofOfWork::new(
            stores.kv.clone(),
            stores.clock.clone(),
            config.pow.clone(),
        ));
        let token_auth = TokenAuth::new(stores.tokens.clone(), stores.clock.clone());
        let public_bucket = Arc::new(PublicBucket::new(stores.buckets.clone(), max_body_size));

        let state = AppState {
            pow: pow.clone(),
            kv: stores.kv.clone(),
        };

        // Layers added later run first, so the limiter goes on innermost.
        let limiter = config.rate_limit.enabled.then_some(limiter);
        let limited = |router: Router<AppState>| match &limiter {
            Some(limiter) => {
                router.route_layer(from_fn_with_state(limiter.clone(), rate_limit_middleware))
            }
            None => router,
        };

        let users = limited(Router::new().route("/users/me", get(whoami).post(whoami)))
            .route_layer(from_fn_with_state(auth_state.clone(), authenticate_middleware));

        let admin = limited(Router::new().route("/admin/stats", get(admin_stats)))
            .route_layer(from_fn_with_state(admin_gate, authorize_middleware))
            .route_layer(from_fn_with_state(auth_state, authenticate_middleware));

        let contacts = limited(Router::new().route("/contacts", post(create_contact)))
            .route_layer(from_fn_with_state(pow, pow_middleware));

        let challenges = limited(Router::new().route("/contacts/challenge", get(issue_challenge)));

        let tokens = limited(Router::new().route("/tokens/current", get(current_token)))
            .route_layer(from_fn_with_state(token_auth, token_middleware));

        let buckets = limited(Router::new().route("/buckets/{id}/tokens", post(public_bucket_token)))
            .route_layer(from_fn_with_state(public_bucket, public_bucket_middleware));

        Router::new()
            .route("/health", get(health))
            .merge(users)
            .merge(admin)
            .merge(contacts)
            .merge(challenges)
            .merge(tokens)
            .merge(buckets)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(max_body_size))
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                Duration::from_secs(config.listener.request_timeout_secs),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The assembled router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn rate_limiter(&self) -> Arc<RateLimiter> {
        self.rate_limiter.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            rate_limit_total = self.config.rate_limit.total,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn whoami(Extension(identity): Extension<Identity>) -> Json<Value> {
    Json(json!({
        "user": identity.user.id,
        "role": identity.user.role,
        "public_key": identity.public_key.map(|k| k.key),
    }))
}

async fn admin_stats(
    State(state): State<AppState>,
    Extension(authorized): Extension<Authorized>,
) -> GatewayResult<Json<Value>> {
    let contacts: HashMap<String, String> = state.kv.hash_get_all("contact-stats").await?;
    Ok(Json(json!({
        "role": authorized.role.as_str(),
        "contact_stats": contacts,
    })))
}

async fn issue_challenge(State(state): State<AppState>) -> GatewayResult<Json<Challenge>> {
    Ok(Json(state.pow.issue_challenge().await?))
}

async fn create_contact(Json(contact): Json<Value>) -> (StatusCode, Json<Value>) {
    tracing::info!(contact = %contact, "Contact accepted");
    (StatusCode::CREATED, Json(json!({ "status": "accepted" })))
}

async fn current_token(Extension(token): Extension<Token>) -> Json<Token> {
    Json(token)
}

async fn public_bucket_token(Extension(bucket): Extension<Bucket>) -> Json<Value> {
    Json(json!({ "bucket": bucket.id, "public": true }))
}

/// Wait for shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        return;
    }
    tracing::info!("Shutdown signal received");
}
