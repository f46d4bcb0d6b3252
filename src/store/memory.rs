//! In-memory record stores.
//!
//! Used by the demo server and tests. Secrets are kept as SHA-256 digests,
//! never in plain text.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::error::StoreError;
use crate::store::clock::{Clock, SystemClock};
use crate::store::{
    Bucket, BucketStore, NonceError, NonceStore, PublicKeyRecord, PublicKeyStore, Token,
    TokenStore, User, UserStore,
};

fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// Users keyed by id, with hashed secrets.
#[derive(Clone, Default)]
pub struct MemoryUserStore {
    users: Arc<DashMap<String, (User, String)>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an account.
    pub fn insert(&self, user: User, secret: &str) {
        self.users
            .insert(user.id.clone(), (user, hash_secret(secret)));
    }

    /// Change the stored role of an existing account.
    pub fn set_role(&self, id: &str, role: Option<String>) {
        if let Some(mut entry) = self.users.get_mut(id) {
            entry.0.role = role;
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn lookup_by_credentials(
        &self,
        name: &str,
        secret: &str,
    ) -> Result<Option<User>, StoreError> {
        let hashed = hash_secret(secret);
        Ok(self
            .users
            .get(name)
            .filter(|entry| entry.1 == hashed)
            .map(|entry| entry.0.clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.get(id).map(|entry| entry.0.clone()))
    }
}

#[derive(Clone, Default)]
pub struct MemoryPublicKeyStore {
    keys: Arc<DashMap<String, PublicKeyRecord>>,
}

impl MemoryPublicKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: PublicKeyRecord) {
        self.keys.insert(record.key.to_lowercase(), record);
    }
}

#[async_trait]
impl PublicKeyStore for MemoryPublicKeyStore {
    async fn find_by_id(&self, key: &str) -> Result<Option<PublicKeyRecord>, StoreError> {
        Ok(self.keys.get(&key.to_lowercase()).map(|r| r.value().clone()))
    }
}

/// Nonce ledger with a uniqueness constraint on `(user, nonce)`.
#[derive(Clone)]
pub struct MemoryNonceStore {
    nonces: Arc<DashMap<(String, String), u64>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryNonceStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl MemoryNonceStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            nonces: Arc::new(DashMap::new()),
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    /// Drop records older than `max_age_millis`.
    pub fn purge_older_than(&self, max_age_millis: u64) {
        let cutoff = self.clock.now_millis().saturating_sub(max_age_millis);
        self.nonces.retain(|_, created| *created >= cutoff);
    }
}

#[async_trait]
impl NonceStore for MemoryNonceStore {
    async fn insert_unique(&self, user_id: &str, nonce: &str) -> Result<(), NonceError> {
        match self.nonces.entry((user_id.to_string(), nonce.to_string())) {
            Entry::Occupied(_) => Err(NonceError::Duplicate),
            Entry::Vacant(slot) => {
                slot.insert(self.clock.now_millis());
                Ok(())
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct MemoryTokenStore {
    tokens: Arc<DashMap<String, Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, token: Token) {
        self.tokens.insert(token.token.clone(), token);
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn lookup(&self, token: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.tokens.get(token).map(|t| t.value().clone()))
    }

    async fn expire(&self, token: &str) -> Result<(), StoreError> {
        self.tokens.remove(token);
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct MemoryBucketStore {
    buckets: Arc<DashMap<String, Bucket>>,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, bucket: Bucket) {
        self.buckets.insert(bucket.id.clone(), bucket);
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    async fn find_public(
        &self,
        bucket_id: &str,
        operation: &str,
    ) -> Result<Option<Bucket>, StoreError> {
        Ok(self
            .buckets
            .get(bucket_id)
            .filter(|b| b.public_permissions.iter().any(|p| p == operation))
            .map(|b| b.value().clone()))
    }
}
