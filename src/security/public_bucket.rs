//! Lets unauthenticated callers through when a bucket grants the requested
//! operation publicly.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use crate::error::{GatewayError, GatewayResult};
use crate::store::{Bucket, BucketStore};

/// Route parameter naming the bucket.
pub const BUCKET_PARAM: &str = "id";

#[derive(Clone)]
pub struct PublicBucket {
    buckets: Arc<dyn BucketStore>,
    max_body_size: usize,
}

impl PublicBucket {
    pub fn new(buckets: Arc<dyn BucketStore>, max_body_size: usize) -> Self {
        Self {
            buckets,
            max_body_size,
        }
    }

    pub async fn check(&self, bucket_id: &str, operation: &str) -> GatewayResult<Bucket> {
        self.buckets
            .find_public(bucket_id, operation)
            .await?
            .ok_or_else(|| GatewayError::not_found("Bucket not found"))
    }
}

/// `operation` field of a JSON body; empty when absent.
fn requested_operation(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.get("operation").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

/// Must run as a route layer so the bucket path parameter is available.
pub async fn public_bucket_middleware(
    State(gate): State<Arc<PublicBucket>>,
    Path(params): Path<HashMap<String, String>>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let bucket_id = params
        .get(BUCKET_PARAM)
        .ok_or_else(|| GatewayError::not_found("Bucket not found"))?;

    let (mut parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, gate.max_body_size)
        .await
        .map_err(|_| GatewayError::bad_request("Request body too large"))?;

    let bucket = gate.check(bucket_id, &requested_operation(&bytes)).await?;
    parts.extensions.insert(bucket);
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryBucketStore;

    fn gate() -> PublicBucket {
        let buckets = MemoryBucketStore::new();
        buckets.insert(Bucket {
            id: "bucket-1".into(),
            user: "dylan@storj.io".into(),
            public_permissions: vec!["PULL".into()],
        });
        PublicBucket::new(Arc::new(buckets), 1024)
    }

    #[test]
    fn test_requested_operation() {
        assert_eq!(requested_operation(br#"{"operation":"PULL"}"#), "PULL");
        assert_eq!(requested_operation(br#"{"operation":5}"#), "");
        assert_eq!(requested_operation(b"not json"), "");
    }

    #[tokio::test]
    async fn test_public_operation_allowed() {
        let bucket = gate().check("bucket-1", "PULL").await.unwrap();
        assert_eq!(bucket.user, "dylan@storj.io");
    }

    #[tokio::test]
    async fn test_private_operation_not_found() {
        for (id, op) in [("bucket-1", "PUSH"), ("bucket-2", "PULL"), ("bucket-1", "")] {
            let err = gate().check(id, op).await.unwrap_err();
            assert!(matches!(err, GatewayError::NotFound(ref m) if m == "Bucket not found"));
        }
    }
}
