//! Role-based authorization.
//!
//! Roles map to strictly ordered ranks. A request passes when the caller's
//! rank is at least the rank the route requires. Unknown labels are always
//! rejected; they never fall back to the lowest rank.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use crate::error::{GatewayError, GatewayResult};
use crate::security::Identity;
use crate::store::UserStore;

/// Account role, ordered by rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Moderator,
    Admin,
}

impl Role {
    pub fn rank(&self) -> u32 {
        match self {
            Role::Admin => 3000,
            Role::Moderator => 2000,
            Role::User => 1000,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Moderator => "moderator",
            Role::User => "user",
        }
    }
}

impl PartialOrd for Role {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Role {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Returned for a label that names no role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRole(pub String);

impl fmt::Display for UnknownRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unrecognized role: {}", self.0)
    }
}

impl std::error::Error for UnknownRole {}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "moderator" => Ok(Role::Moderator),
            "user" => Ok(Role::User),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker inserted into request extensions once a role check passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Authorized {
    /// The caller's role at the time of the check.
    pub role: Role,
}

/// Checks callers against a minimum role.
#[derive(Clone)]
pub struct Authorizer {
    users: Arc<dyn UserStore>,
}

impl Authorizer {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Grant access iff the caller's current role ranks at least `required`.
    ///
    /// The user record is read fresh from the store; the role cached on the
    /// identity may be stale.
    pub async fn authorize(
        &self,
        identity: &Identity,
        required: Option<&str>,
    ) -> GatewayResult<Role> {
        let required = match required.map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => return Err(GatewayError::not_implemented("Must specify a role")),
        };
        let required: Role = required
            .parse()
            .map_err(|e: UnknownRole| GatewayError::not_implemented(e.to_string()))?;

        let user = self
            .users
            .find_by_id(&identity.user.id)
            .await
            .map_err(|e| GatewayError::not_found(e.message))?
            .ok_or_else(|| GatewayError::not_found("User not found"))?;

        let actual: Role = user
            .role
            .as_deref()
            .ok_or_else(|| GatewayError::bad_request("User has an unrecognized role"))?
            .parse()
            .map_err(|_| GatewayError::bad_request("User has an unrecognized role"))?;

        if actual >= required {
            Ok(actual)
        } else {
            tracing::debug!(
                user = %user.id,
                role = %actual,
                required = %required,
                "Authorization denied"
            );
            Err(GatewayError::not_authorized("Unauthorized"))
        }
    }
}

/// Per-route state for [`authorize_middleware`].
#[derive(Clone)]
pub struct RoleGate {
    pub authorizer: Arc<Authorizer>,
    pub required: Option<String>,
}

impl RoleGate {
    pub fn new(authorizer: Arc<Authorizer>, required: impl Into<String>) -> Self {
        Self {
            authorizer,
            required: Some(required.into()),
        }
    }
}

/// Requires an [`Identity`] from the authentication layer.
pub async fn authorize_middleware(
    State(gate): State<RoleGate>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, GatewayError> {
    let identity = request
        .extensions()
        .get::<Identity>()
        .cloned()
        .ok_or_else(|| GatewayError::not_authorized("No authentication strategy detected"))?;

    let role = gate
        .authorizer
        .authorize(&identity, gate.required.as_deref())
        .await?;

    request.extensions_mut().insert(Authorized { role });
    Ok(next.run(request).await)
}
