use crate::application_port::AuthError;
use crate::domain_port::{IdentityRecord, IdentityRepo, StorageTx, TxManager};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Identity table kept in process memory, keyed by login.
#[derive(Debug, Default, Clone)]
pub struct MemoryIdentityStore {
    rows: Arc<DashMap<String, IdentityRecord>>,
}

impl MemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait::async_trait]
impl IdentityRepo for MemoryIdentityStore {
    async fn find_by_login(&self, login: &str) -> Result<Option<IdentityRecord>, AuthError> {
        Ok(self.rows.get(login).map(|row| row.value().clone()))
    }
}

#[async_trait::async_trait]
impl TxManager for MemoryIdentityStore {
    async fn begin(&self) -> Result<Box<dyn StorageTx>, AuthError> {
        Ok(Box::new(MemoryTx {
            rows: self.rows.clone(),
            pending: Vec::new(),
        }))
    }
}

/// Buffers inserts until commit; dropping it discards them.
pub struct MemoryTx {
    rows: Arc<DashMap<String, IdentityRecord>>,
    pending: Vec<IdentityRecord>,
}

#[async_trait::async_trait]
impl StorageTx for MemoryTx {
    async fn login_exists(&mut self, login: &str) -> Result<bool, AuthError> {
        Ok(self.rows.contains_key(login) || self.pending.iter().any(|r| r.login == login))
    }

    async fn insert_identity(&mut self, record: &IdentityRecord) -> Result<(), AuthError> {
        if self.login_exists(&record.login).await? {
            return Err(AuthError::IdentityExists);
        }
        self.pending.push(record.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AuthError> {
        let MemoryTx { rows, pending } = *self;
        let mut applied: Vec<String> = Vec::with_capacity(pending.len());
        for record in pending {
            match rows.entry(record.login.clone()) {
                Entry::Occupied(_) => {
                    for login in &applied {
                        rows.remove(login);
                    }
                    return Err(AuthError::IdentityExists);
                }
                Entry::Vacant(vacant) => {
                    applied.push(record.login.clone());
                    vacant.insert(record);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AuthError> {
        Ok(())
    }
}
