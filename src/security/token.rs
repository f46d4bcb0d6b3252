//! Bucket access tokens presented in the `x-token` header.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::error::{GatewayError, GatewayResult};
use crate::store::{Clock, Token, TokenStore};

pub const X_TOKEN: &str = "x-token";

#[derive(Clone)]
pub struct TokenAuth {
    tokens: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
}

impl TokenAuth {
    pub fn new(tokens: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self { tokens, clock }
    }

    /// Resolve a token that exists and has not expired, consuming it.
    pub async fn resolve(&self, token: Option<&str>) -> GatewayResult<Token> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| GatewayError::not_authorized("Invalid token"))?;

        let record = self
            .tokens
            .lookup(token)
            .await?
            .ok_or_else(|| GatewayError::not_authorized("Invalid token"))?;

        if record.expires <= self.clock.now_millis() {
            tracing::debug!(bucket = %record.bucket, "Token expired");
            return Err(GatewayError::not_authorized("Invalid token"));
        }

        self.tokens.expire(token).await?;
        Ok(record)
    }
}

pub async fn token_middleware(
    State(auth): State<TokenAuth>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let presented = request
        .headers()
        .get(X_TOKEN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let token = auth.resolve(presented.as_deref()).await?;
    request.extensions_mut().insert(token);
    Ok(next.run(request).await)
}
