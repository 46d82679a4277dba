use super::identity_repo_mysql::{insert_identity, login_exists};
use crate::application_port::AuthError;
use crate::domain_port::{IdentityRecord, StorageTx, TxManager};
use sqlx::{MySql, MySqlConnection, MySqlPool, Transaction};

pub struct MySqlTxManager {
    pool: MySqlPool,
}

impl MySqlTxManager {
    pub fn new(pool: MySqlPool) -> Self {
        MySqlTxManager { pool }
    }
}

#[async_trait::async_trait]
impl TxManager for MySqlTxManager {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, AuthError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AuthError::InternalFailure(format!("begin: {e}")))?;
        Ok(Box::new(MySqlTx::new(tx)))
    }
}

/// sqlx rolls the transaction back when it is dropped uncommitted.
pub struct MySqlTx {
    inner: Transaction<'static, MySql>,
}

impl MySqlTx {
    pub fn new(inner: Transaction<'static, MySql>) -> Self {
        MySqlTx { inner }
    }

    pub fn conn(&mut self) -> &mut MySqlConnection {
        &mut self.inner
    }
}

#[async_trait::async_trait]
impl StorageTx for MySqlTx {
    async fn login_exists(&mut self, login: &str) -> Result<bool, AuthError> {
        login_exists(self.conn(), login).await
    }

    async fn insert_identity(&mut self, record: &IdentityRecord) -> Result<(), AuthError> {
        insert_identity(self.conn(), record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), AuthError> {
        self.inner
            .commit()
            .await
            .map_err(|e| AuthError::InternalFailure(format!("commit: {e}")))
    }

    async fn rollback(self: Box<Self>) -> Result<(), AuthError> {
        self.inner
            .rollback()
            .await
            .map_err(|e| AuthError::InternalFailure(format!("rollback: {e}")))
    }
}
