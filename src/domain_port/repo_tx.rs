use crate::application_port::AuthError;
use crate::domain_port::IdentityRecord;

#[async_trait::async_trait]
pub trait TxManager: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, AuthError>;
}

/// A unit of work over the identity tables.
///
/// Nothing is visible to other readers until [`StorageTx::commit`]. Dropping
/// the box without committing rolls the work back, so an early `?` return,
/// a panic or a cancelled future all leave the store untouched.
#[async_trait::async_trait]
pub trait StorageTx: Send {
    async fn login_exists(&mut self, login: &str) -> Result<bool, AuthError>;

    async fn insert_identity(&mut self, record: &IdentityRecord) -> Result<(), AuthError>;

    async fn commit(self: Box<Self>) -> Result<(), AuthError>;

    async fn rollback(self: Box<Self>) -> Result<(), AuthError>;
}
