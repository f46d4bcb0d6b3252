//! Authentication strategy detection.
//!
//! Pure function of the request headers. Basic credentials win over a
//! signature when both are present.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine as _};

pub const X_SIGNATURE: &str = "x-signature";
pub const X_PUBKEY: &str = "x-pubkey";

/// Authentication mode selected for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Basic,
    Signature,
    None,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Basic => "basic",
            Strategy::Signature => "signature",
            Strategy::None => "none",
        }
    }
}

/// Name and secret carried by an `Authorization: Basic` header.
#[derive(Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub name: String,
    pub secret: String,
}

impl std::fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Parse basic credentials, returning `None` unless both parts are non-empty.
pub fn basic_credentials(headers: &HeaderMap) -> Option<BasicCredentials> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (name, secret) = decoded.split_once(':')?;
    if name.is_empty() || secret.is_empty() {
        return None;
    }

    Some(BasicCredentials {
        name: name.to_string(),
        secret: secret.to_string(),
    })
}

/// Classify a request by the credentials it carries.
pub fn detect_strategy(headers: &HeaderMap) -> Strategy {
    if basic_credentials(headers).is_some() {
        return Strategy::Basic;
    }

    if headers.contains_key(X_SIGNATURE) && headers.contains_key(X_PUBKEY) {
        return Strategy::Signature;
    }

    Strategy::None
}
