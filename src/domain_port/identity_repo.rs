use crate::application_port::*;
use crate::domain_model::*;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct IdentityRecord {
    pub user_id: UserId,
    pub login: String,
    pub username: String,
    pub role: Role,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            role: self.role.clone(),
        }
    }
}

#[async_trait::async_trait]
pub trait IdentityRepo: Send + Sync {
    /// Fetch the identity owning `login` together with its password hash.
    async fn find_by_login(&self, login: &str) -> Result<Option<IdentityRecord>, AuthError>;
}
