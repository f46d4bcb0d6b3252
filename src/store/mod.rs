//! Collaborator store contracts.
//!
//! # Data Flow
//! ```text
//! Authenticator ──▶ UserStore / PublicKeyStore / NonceStore
//! Authorizer    ──▶ UserStore
//! Token auth    ──▶ TokenStore
//! Public bucket ──▶ BucketStore
//! Rate limiter  ──▶ KeyValueStore (windows)
//! Proof of work ──▶ KeyValueStore (challenges, stats)
//! ```
//!
//! # Design Decisions
//! - Handles are passed as `Arc<dyn Trait>` at construction; no globals
//! - Nonce uniqueness is the store's job, not an in-process lock
//! - In-memory implementations back the demo server and the tests

pub mod clock;
pub mod kv;
pub mod memory;
pub mod retention;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StoreError;

pub use clock::{Clock, ManualClock, SystemClock};
pub use kv::{KeyValueStore, MemoryKeyValueStore};
pub use memory::{
    MemoryBucketStore, MemoryNonceStore, MemoryPublicKeyStore, MemoryTokenStore, MemoryUserStore,
};
pub use retention::StoreSweeper;

/// A gateway account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier (the account email in practice).
    pub id: String,
    /// Whether the account has completed activation.
    pub activated: bool,
    /// Stored role label; validated by the authorizer.
    pub role: Option<String>,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            activated: true,
            role: Some("user".to_string()),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.activated = false;
        self
    }
}

/// A registered signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKeyRecord {
    /// Hex-encoded SEC1 public key; doubles as the record id.
    pub key: String,
    /// Owning user id.
    pub user: String,
    pub label: Option<String>,
}

/// A bucket access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub token: String,
    pub bucket: String,
    pub operation: String,
    /// Expiry as Unix milliseconds.
    pub expires: u64,
}

/// A storage bucket with its public permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub user: String,
    pub public_permissions: Vec<String>,
}

/// Failure inserting a nonce record.
#[derive(Debug, Error)]
pub enum NonceError {
    /// The `(user, nonce)` pair already exists.
    #[error("duplicate nonce")]
    Duplicate,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Find the account matching a name and secret.
    async fn lookup_by_credentials(
        &self,
        name: &str,
        secret: &str,
    ) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait PublicKeyStore: Send + Sync {
    async fn find_by_id(&self, key: &str) -> Result<Option<PublicKeyRecord>, StoreError>;
}

#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Insert a `(user, nonce)` record, failing with [`NonceError::Duplicate`]
    /// if the pair was already recorded.
    async fn insert_unique(&self, user_id: &str, nonce: &str) -> Result<(), NonceError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn lookup(&self, token: &str) -> Result<Option<Token>, StoreError>;

    /// Invalidate a token so it cannot be presented again.
    async fn expire(&self, token: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait BucketStore: Send + Sync {
    /// Find a bucket whose public permissions include `operation`.
    async fn find_public(
        &self,
        bucket_id: &str,
        operation: &str,
    ) -> Result<Option<Bucket>, StoreError>;
}
