//! Terminal error responder.
//!
//! Every [`GatewayError`] that escapes a middleware ends up here. Status
//! resolution:
//!
//! ```text
//! numeric code in 100..=500 → that code
//! other numeric or opaque   → 400
//! no code                   → 500 (logged)
//! ```
//!
//! The body is always `{"error": <message>}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, GatewayError};
use crate::observability::metrics;

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// HTTP status for an optional error code.
pub fn resolve_status(code: Option<&ErrorCode>) -> StatusCode {
    match code {
        None => StatusCode::INTERNAL_SERVER_ERROR,
        Some(ErrorCode::Numeric(n)) if (100..=500).contains(n) => {
            StatusCode::from_u16(*n as u16).unwrap_or(StatusCode::BAD_REQUEST)
        }
        Some(_) => StatusCode::BAD_REQUEST,
    }
}

/// Build the client response for an error, logging server faults.
pub fn error_response(error: &GatewayError) -> Response {
    let status = resolve_status(error.code().as_ref());

    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %error, "Request failed");
    }
    metrics::record_error(status.as_u16());

    let body = ErrorBody {
        error: error.to_string(),
    };
    (status, Json(body)).into_response()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        error_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use tracing::{field::Visit, Level, Subscriber};
    use tracing_subscriber::{layer::Context, layer::SubscriberExt, Layer};

    use crate::error::StoreError;

    #[derive(Clone, Default)]
    struct ErrorCollector {
        events: Arc<Mutex<Vec<String>>>,
    }

    struct MessageVisitor<'a>(&'a mut String);

    impl Visit for MessageVisitor<'_> {
        fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
            if field.name() == "error" {
                *self.0 = format!("{:?}", value);
            }
        }
    }

    impl<S: Subscriber> Layer<S> for ErrorCollector {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::ERROR {
                let mut message = String::new();
                event.record(&mut MessageVisitor(&mut message));
                self.events.lock().unwrap().push(message);
            }
        }
    }

    fn respond_collecting(error: GatewayError) -> (Response, Vec<String>) {
        let collector = ErrorCollector::default();
        let events = collector.events.clone();
        let subscriber = tracing_subscriber::registry().with(collector);
        let response = tracing::subscriber::with_default(subscriber, || error.into_response());
        let logged = events.lock().unwrap().clone();
        (response, logged)
    }

    async fn body_of(response: Response) -> ErrorBody {
        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_resolve_status() {
        assert_eq!(resolve_status(None), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resolve_status(Some(&ErrorCode::Numeric(401))), StatusCode::UNAUTHORIZED);
        assert_eq!(resolve_status(Some(&ErrorCode::Numeric(500))), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resolve_status(Some(&ErrorCode::Numeric(501))), StatusCode::BAD_REQUEST);
        assert_eq!(resolve_status(Some(&ErrorCode::Numeric(11000))), StatusCode::BAD_REQUEST);
        assert_eq!(resolve_status(Some(&ErrorCode::Numeric(42))), StatusCode::BAD_REQUEST);
        assert_eq!(resolve_status(Some(&ErrorCode::parse("E_DUP"))), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_no_code_is_logged_500() {
        let (response, logged) = respond_collecting(GatewayError::internal("Oops!"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(logged.len(), 1);
        assert!(logged[0].contains("Oops!"));
        assert_eq!(body_of(response).await.error, "Oops!");
    }

    #[tokio::test]
    async fn test_client_error_is_not_logged() {
        let error = GatewayError::Store(StoreError::new("Payment required").with_code(402u16));
        let (response, logged) = respond_collecting(error);
        assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
        assert!(logged.is_empty());
        assert_eq!(body_of(response).await.error, "Payment required");
    }

    #[tokio::test]
    async fn test_driver_code_becomes_bad_request() {
        let error = GatewayError::Store(StoreError::new("duplicate key").with_code("11000"));
        let (response, logged) = respond_collecting(error);
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(logged.is_empty());
    }

    #[tokio::test]
    async fn test_variant_statuses() {
        let (response, _) = respond_collecting(GatewayError::not_authorized("Invalid token"));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let (response, _) = respond_collecting(GatewayError::not_found("Bucket not found"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let (response, logged) = respond_collecting(GatewayError::not_implemented("Must specify a role"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(logged.is_empty());
    }
}
