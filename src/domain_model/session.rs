use crate::domain_model::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Correlates one access/refresh pair. A new family id is minted on every
/// login and every rotation.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FamilyId(pub uuid::Uuid);

impl FamilyId {
    pub fn generate() -> Self {
        FamilyId(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for FamilyId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::from_str(s).map(FamilyId)
    }
}

/// Key layout inside the session store. Adapters may add their own prefix.
pub struct SessionKeys;

impl SessionKeys {
    pub fn record(family_id: &FamilyId) -> String {
        format!("token:{}", family_id)
    }

    pub fn used(family_id: &FamilyId) -> String {
        format!("token:{}:used", family_id)
    }

    pub fn user_set(user_id: &UserId) -> String {
        format!("user:{}:tokens", user_id)
    }
}
