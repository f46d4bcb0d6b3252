//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → strategy.rs (basic credentials or signature headers?)
//!     → authenticate.rs (credential lookup, or signature.rs + nonce ledger)
//!     → authorize.rs (minimum role rank, route-gated)
//!     → rate_limit.rs (sliding window per key, route-gated)
//!     → pow.rs / token.rs / public_bucket.rs (route-gated)
//!     → handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: every check returns a typed `GatewayError`
//! - Cheap checks first; store calls only once the request looks legitimate
//! - No trust in client input

pub mod authenticate;
pub mod authorize;
pub mod pow;
pub mod public_bucket;
pub mod rate_limit;
pub mod signature;
pub mod strategy;
pub mod token;

use axum::http::{request::Parts, HeaderMap, Method};

use crate::store::{PublicKeyRecord, User};

pub use authenticate::{authenticate_middleware, AuthenticateState, Authenticator};
pub use authorize::{authorize_middleware, Authorized, Authorizer, Role, RoleGate};
pub use pow::{pow_middleware, ProofOfWork};
pub use public_bucket::{public_bucket_middleware, PublicBucket};
pub use rate_limit::{rate_limit_middleware, RateLimiter};
pub use strategy::{detect_strategy, Strategy};
pub use token::{token_middleware, TokenAuth};

/// Borrowed view of the request data the security checks read.
#[derive(Debug, Clone, Copy)]
pub struct AuthRequest<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

impl<'a> AuthRequest<'a> {
    pub fn from_parts(parts: &'a Parts, body: &'a [u8]) -> Self {
        Self {
            method: &parts.method,
            path: parts.uri.path(),
            query: parts.uri.query(),
            headers: &parts.headers,
            body,
        }
    }

    /// Header value as text, if present and valid.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Authenticated caller, attached to request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user: User,
    /// Key used to sign the request, for signature authentication.
    pub public_key: Option<PublicKeyRecord>,
}
