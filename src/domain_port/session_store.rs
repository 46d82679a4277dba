use crate::application_port::AuthError;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// Not reachable within the configured timeout, or the connection dropped.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store error: {0}")]
    Backend(String),
}

impl From<StoreError> for AuthError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Unavailable(e) => AuthError::StoreUnavailable(e),
            StoreError::Backend(e) => AuthError::InternalFailure(e),
        }
    }
}

/// Key-value capability with per-key TTL backing refresh-token sessions.
///
/// Every operation except [`SessionStore::put_if_absent`] and
/// [`SessionStore::take`] is safe to retry. Deleting an absent key is not an
/// error.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Atomic conditional write: stores `value` only if `key` is absent.
    /// Returns `true` if this call created the key.
    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration)
    -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Atomically reads and removes `key`. Of several concurrent callers at
    /// most one sees `Some`.
    async fn take(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Remaining lifetime, `None` when the key is absent or already expired.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError>;

    /// Adds `member` and resets the set's TTL to `ttl`.
    async fn add_to_set(&self, set_key: &str, member: &str, ttl: Duration)
    -> Result<(), StoreError>;

    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<(), StoreError>;

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError>;
}
