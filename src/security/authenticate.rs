//! Authentication middleware.
//!
//! Two paths, chosen by [`detect_strategy`]:
//!
//! ```text
//! BASIC:     credentials → UserStore lookup → activated? → Identity
//! SIGNATURE: verify signature → PublicKeyStore → UserStore → activated?
//!            → NonceStore insert (replay check) → Identity + key
//! ```
//!
//! The signature is checked before any store call so forged requests cost
//! nothing but a hash. The nonce insert runs last, once the account is known
//! to be valid.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::observability::metrics;
use crate::security::signature::{payload_source, verify_request, PayloadSource};
use crate::security::strategy::{basic_credentials, detect_strategy, Strategy, X_PUBKEY};
use crate::security::{AuthRequest, Identity};
use crate::store::{NonceError, NonceStore, PublicKeyStore, User, UserStore};

/// Request parameter carrying the single-use nonce.
pub const NONCE_PARAM: &str = "__nonce";

/// Resolves the caller of a request into an [`Identity`].
#[derive(Clone)]
pub struct Authenticator {
    users: Arc<dyn UserStore>,
    keys: Arc<dyn PublicKeyStore>,
    nonces: Arc<dyn NonceStore>,
}

impl Authenticator {
    pub fn new(
        users: Arc<dyn UserStore>,
        keys: Arc<dyn PublicKeyStore>,
        nonces: Arc<dyn NonceStore>,
    ) -> Self {
        Self { users, keys, nonces }
    }

    /// Authenticate a request with whichever strategy its headers select.
    pub async fn authenticate(&self, request: &AuthRequest<'_>) -> GatewayResult<Identity> {
        let strategy = detect_strategy(request.headers);
        let result = match strategy {
            Strategy::Basic => self.basic(request).await,
            Strategy::Signature => self.signature(request).await,
            Strategy::None => Err(GatewayError::not_authorized(
                "No authentication strategy detected",
            )),
        };

        match &result {
            Ok(identity) => {
                tracing::debug!(
                    strategy = strategy.as_str(),
                    user = %identity.user.id,
                    "Request authenticated"
                );
                metrics::record_auth(strategy.as_str(), "success");
            }
            Err(e) => {
                tracing::debug!(strategy = strategy.as_str(), error = %e, "Authentication failed");
                metrics::record_auth(strategy.as_str(), "failure");
            }
        }

        result
    }

    async fn basic(&self, request: &AuthRequest<'_>) -> GatewayResult<Identity> {
        let credentials = basic_credentials(request.headers).ok_or_else(|| {
            GatewayError::not_authorized("No authentication strategy detected")
        })?;

        let user = match self
            .users
            .lookup_by_credentials(&credentials.name, &credentials.secret)
            .await
        {
            Ok(Some(user)) => user,
            Ok(None) => return Err(GatewayError::not_authorized("Invalid email or password")),
            Err(e) => {
                tracing::warn!(error = %e, "Credential lookup failed");
                return Err(GatewayError::not_authorized("Invalid email or password"));
            }
        };

        ensure_activated(&user)?;

        Ok(Identity {
            user,
            public_key: None,
        })
    }

    async fn signature(&self, request: &AuthRequest<'_>) -> GatewayResult<Identity> {
        if !verify_request(request)? {
            return Err(GatewayError::not_authorized("Invalid signature"));
        }

        let key_id = request
            .header(X_PUBKEY)
            .map(str::trim)
            .ok_or_else(|| GatewayError::not_authorized("Invalid signature"))?;

        let public_key = match self.keys.find_by_id(key_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(GatewayError::not_authorized("Public key not registered")),
            Err(e) => {
                tracing::warn!(error = %e, "Public key lookup failed");
                return Err(GatewayError::not_authorized("Public key not registered"));
            }
        };

        let user = self
            .users
            .find_by_id(&public_key.user)
            .await?
            .ok_or_else(|| GatewayError::not_authorized("User not found"))?;

        ensure_activated(&user)?;

        let nonce = extract_nonce(request)
            .ok_or_else(|| GatewayError::not_authorized("Invalid nonce supplied"))?;

        match self.nonces.insert_unique(&user.id, &nonce).await {
            Ok(()) => {}
            Err(NonceError::Duplicate) => {
                tracing::warn!(user = %user.id, "Nonce reuse rejected");
                return Err(GatewayError::not_authorized("Invalid nonce supplied"));
            }
            Err(NonceError::Store(e)) => return Err(e.into()),
        }

        Ok(Identity {
            user,
            public_key: Some(public_key),
        })
    }
}

fn ensure_activated(user: &User) -> GatewayResult<()> {
    if user.activated {
        Ok(())
    } else {
        Err(GatewayError::not_authorized(
            "User account has not been activated",
        ))
    }
}

/// Read `__nonce` from the signed parameters of a request.
///
/// Body methods carry a JSON object (form-encoded bodies are accepted too);
/// read methods carry it in the query string.
pub fn extract_nonce(request: &AuthRequest<'_>) -> Option<String> {
    let nonce = match payload_source(request.method)? {
        PayloadSource::Body => match serde_json::from_slice::<Value>(request.body) {
            Ok(body) => match body.get(NONCE_PARAM)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            },
            Err(_) => form_param(request.body, NONCE_PARAM)?,
        },
        PayloadSource::Query => form_param(request.query?.as_bytes(), NONCE_PARAM)?,
    };

    if nonce.is_empty() {
        None
    } else {
        Some(nonce)
    }
}

fn form_param(input: &[u8], name: &str) -> Option<String> {
    url::form_urlencoded::parse(input)
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// State for [`authenticate_middleware`].
#[derive(Clone)]
pub struct AuthenticateState {
    pub authenticator: Arc<Authenticator>,
    /// Upper bound on the buffered body.
    pub max_body_size: usize,
}

/// Buffers the body, authenticates, and attaches the [`Identity`].
///
/// The buffered bytes are handed back to the request so handlers can still
/// read the body.
pub async fn authenticate_middleware(
    State(state): State<AuthenticateState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, state.max_body_size)
        .await
        .map_err(|_| GatewayError::bad_request("Request body too large"))?;

    let identity = state
        .authenticator
        .authenticate(&AuthRequest::from_parts(&parts, &bytes))
        .await?;

    parts.extensions.insert(identity);
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
