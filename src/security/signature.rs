//! Request canonicalization and secp256k1 signature verification.
//!
//! # Responsibilities
//! - Rebuild the exact payload a client signed: `METHOD\nPATH\nBODY`
//! - Hash it with SHA-256
//! - Verify a DER-encoded ECDSA signature against a SEC1 public key
//!
//! # Design Decisions
//! - Body methods (POST/PATCH/PUT) sign the raw body, read methods
//!   (GET/DELETE/OPTIONS) sign the raw query string
//! - Signatures are normalized to low-S before verification
//! - Malformed hex or DER is a failed verification, not an error

use axum::http::Method;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{GatewayError, GatewayResult};
use crate::security::strategy::{X_PUBKEY, X_SIGNATURE};
use crate::security::AuthRequest;

/// Where the signed body of a request comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSource {
    Body,
    Query,
}

/// Decide which part of the request carries the signed parameters.
pub fn payload_source(method: &Method) -> Option<PayloadSource> {
    match *method {
        Method::POST | Method::PATCH | Method::PUT => Some(PayloadSource::Body),
        Method::GET | Method::DELETE | Method::OPTIONS => Some(PayloadSource::Query),
        _ => None,
    }
}

/// Build the byte string a client must have signed.
pub fn signable_payload(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> GatewayResult<Vec<u8>> {
    let data: &[u8] = match payload_source(method) {
        Some(PayloadSource::Body) => body,
        Some(PayloadSource::Query) => query.unwrap_or_default().as_bytes(),
        None => {
            return Err(GatewayError::not_authorized(
                "Could not extract payload from query or body",
            ))
        }
    };

    let mut payload = Vec::with_capacity(method.as_str().len() + path.len() + data.len() + 2);
    payload.extend_from_slice(method.as_str().as_bytes());
    payload.push(b'\n');
    payload.extend_from_slice(path.as_bytes());
    payload.push(b'\n');
    payload.extend_from_slice(data);
    Ok(payload)
}

/// SHA-256 of the signable payload.
pub fn payload_digest(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> GatewayResult<[u8; 32]> {
    let payload = signable_payload(method, path, query, body)?;
    Ok(Sha256::digest(&payload).into())
}

/// Lowercase hex SHA-256 of the signable payload.
pub fn payload_hash(
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> GatewayResult<String> {
    payload_digest(method, path, query, body).map(hex::encode)
}

fn decode_public_key(public_key_hex: &str) -> Option<VerifyingKey> {
    let bytes = hex::decode(public_key_hex.trim()).ok()?;
    VerifyingKey::from_sec1_bytes(&bytes).ok()
}

fn decode_signature(signature_hex: &str) -> Option<Signature> {
    let bytes = hex::decode(signature_hex.trim()).ok()?;
    let signature = Signature::from_der(&bytes).ok()?;
    Some(signature.normalize_s().unwrap_or(signature))
}

/// Verify a signature over a 32-byte digest.
pub fn verify_digest(public_key_hex: &str, signature_hex: &str, digest: &[u8]) -> bool {
    let (Some(key), Some(signature)) = (
        decode_public_key(public_key_hex),
        decode_signature(signature_hex),
    ) else {
        return false;
    };

    key.verify_prehash(digest, &signature).is_ok()
}

/// Verify the `x-signature` / `x-pubkey` headers of a request.
///
/// Header decoding happens before the payload is hashed, so a malformed
/// header never costs a digest computation. An unsupported method is an
/// error because no payload can be extracted.
pub fn verify_request(request: &AuthRequest<'_>) -> GatewayResult<bool> {
    let (Some(signature_hex), Some(public_key_hex)) =
        (request.header(X_SIGNATURE), request.header(X_PUBKEY))
    else {
        return Ok(false);
    };

    let (Some(key), Some(signature)) = (
        decode_public_key(public_key_hex),
        decode_signature(signature_hex),
    ) else {
        return Ok(false);
    };

    let digest = payload_digest(request.method, request.path, request.query, request.body)?;
    Ok(key.verify_prehash(&digest, &signature).is_ok())
}

/// Sign a request the way clients must, returning hex-encoded DER.
pub fn sign_request(
    key: &SigningKey,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> GatewayResult<String> {
    let digest = payload_digest(method, path, query, body)?;
    let signature: Signature = key
        .sign_prehash(&digest)
        .map_err(|e| GatewayError::internal(format!("Signing failed: {}", e)))?;
    Ok(hex::encode(signature.to_der().as_bytes()))
}

/// Hex-encoded compressed SEC1 public key.
pub fn public_key_hex(key: &SigningKey) -> String {
    hex::encode(key.verifying_key().to_encoded_point(true).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, HeaderValue};

    const DIGEST: &str = "86e663b4892a64c45e804874d59436fbddce2557d1005a2908755fe9e5827636";
    const PUBKEY: &str = "03b3e8d348e97fe395e76532ae6436472d9ae0c38b39484c789314ac4ee8712ec4";
    const GOOD_SIG: &str = "30450221009c0bdfd7dca49c71ae46d1b74511a509442ebbb1987cfe546ab760866edff59302\
                            200948ec9027b630c50d8300a12d32a9e54185c2cb5aa4f657bde46e982d595d22";
    const BAD_SIG: &str = "30450221009c0bdfd7dca49c71ae46d1b74511a509442ebbb1987cfe546ab760866edff59302\
                           200948ec9027b630c50d8300a12d32a9e54185c2cb5aa4f657bde46e982d595d11";

    fn test_key() -> SigningKey {
        SigningKey::from_slice(&[7u8; 32]).unwrap()
    }

    #[test]
    fn test_payload_source_by_method() {
        for m in [Method::POST, Method::PATCH, Method::PUT] {
            assert_eq!(payload_source(&m), Some(PayloadSource::Body));
        }
        for m in [Method::GET, Method::DELETE, Method::OPTIONS] {
            assert_eq!(payload_source(&m), Some(PayloadSource::Query));
        }
        assert_eq!(payload_source(&Method::HEAD), None);
    }

    #[test]
    fn test_payload_uses_body_or_query() {
        let post = signable_payload(&Method::POST, "/buckets", Some("a=b"), b"{\"x\":1}").unwrap();
        assert_eq!(post, b"POST\n/buckets\n{\"x\":1}".to_vec());

        let get = signable_payload(&Method::GET, "/buckets", Some("a=b"), b"ignored").unwrap();
        assert_eq!(get, b"GET\n/buckets\na=b".to_vec());

        let empty = signable_payload(&Method::DELETE, "/buckets/1", None, b"").unwrap();
        assert_eq!(empty, b"DELETE\n/buckets/1\n".to_vec());
    }

    #[test]
    fn test_payload_rejects_other_methods() {
        let err = signable_payload(&Method::HEAD, "/", None, b"").unwrap_err();
        assert!(matches!(err, GatewayError::NotAuthorized(_)));
    }

    #[test]
    fn test_payload_hash_is_stable() {
        let a = payload_hash(&Method::GET, "/", Some("hello=world"), b"").unwrap();
        let b = payload_hash(&Method::GET, "/", Some("hello=world"), b"").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a,
            "622f645b4a0030e87e0419b19950d9bc1cb3202c12cd7819a1c40141edc75b6e"
        );
    }

    #[test]
    fn test_verify_known_signature() {
        let digest = hex::decode(DIGEST).unwrap();
        assert!(verify_digest(PUBKEY, GOOD_SIG, &digest));
        assert!(!verify_digest(PUBKEY, BAD_SIG, &digest));
    }

    #[test]
    fn test_malformed_input_is_false() {
        let digest = hex::decode(DIGEST).unwrap();
        assert!(!verify_digest("03b3e8d34", GOOD_SIG, &digest));
        assert!(!verify_digest(PUBKEY, "30450221009c0bdfd7dca49c71ae46d1b74511a509442ebbb1987cfe5", &digest));
        assert!(!verify_digest("zz", "zz", &digest));
    }

    #[test]
    fn test_high_s_signature_is_normalized() {
        let key = test_key();
        let digest = payload_digest(&Method::GET, "/info", None, b"").unwrap();
        let signature: Signature = key.sign_prehash(&digest).unwrap();

        let r = *signature.r();
        let s = *signature.s();
        let high = Signature::from_scalars(r.to_bytes(), (-s).to_bytes()).unwrap();
        assert!(high.normalize_s().is_some(), "expected a high-S signature");

        let high_hex = hex::encode(high.to_der().as_bytes());
        assert!(verify_digest(&public_key_hex(&key), &high_hex, &digest));
    }

    #[test]
    fn test_verify_request_round_trip() {
        let key = test_key();
        let body = br#"{"__nonce":"1","name":"photos"}"#;
        let signature = sign_request(&key, &Method::POST, "/buckets", None, body).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(X_SIGNATURE, HeaderValue::from_str(&signature).unwrap());
        headers.insert(X_PUBKEY, HeaderValue::from_str(&public_key_hex(&key)).unwrap());

        let request = AuthRequest {
            method: &Method::POST,
            path: "/buckets",
            query: None,
            headers: &headers,
            body,
        };
        assert!(verify_request(&request).unwrap());

        let tampered = AuthRequest {
            body: br#"{"__nonce":"1","name":"other"}"#,
            ..request
        };
        assert!(!verify_request(&tampered).unwrap());
    }

    #[test]
    fn test_verify_request_malformed_headers_skip_hashing() {
        let mut headers = HeaderMap::new();
        headers.insert(X_SIGNATURE, HeaderValue::from_static("nothex"));
        headers.insert(X_PUBKEY, HeaderValue::from_static(PUBKEY));

        // HEAD would fail payload extraction; malformed headers return first.
        let request = AuthRequest {
            method: &Method::HEAD,
            path: "/",
            query: None,
            headers: &headers,
            body: b"",
        };
        assert!(!verify_request(&request).unwrap());
    }
}
