use crate::domain_model::{FamilyId, Identity, Role, UserId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("identity not found")]
    IdentityNotFound,
    #[error("identity already exists")]
    IdentityExists,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("token expired")]
    TokenExpired,
    #[error("token replayed")]
    TokenReplayed,
    #[error("token invalid")]
    TokenInvalid,
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("internal failure: {0}")]
    InternalFailure(String),
}

/// Local outcome of the token codec. Callers collapse these into
/// [`AuthError::TokenExpired`] / [`AuthError::TokenInvalid`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("bad signature")]
    BadSignature,
    #[error("expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<TokenError> for AuthError {
    fn from(error: TokenError) -> Self {
        match error {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::BadSignature | TokenError::Malformed => AuthError::TokenInvalid,
            TokenError::Signing(e) => AuthError::InternalFailure(e),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The stored hash could not be parsed. Distinct from a mismatch so that
    /// corrupted rows are not reported as bad passwords.
    #[error("malformed password hash: {0}")]
    MalformedHash(String),
    #[error("hashing failed: {0}")]
    Hashing(String),
}

impl From<CredentialError> for AuthError {
    fn from(error: CredentialError) -> Self {
        AuthError::InternalFailure(error.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RegisterInput {
    pub login: String,
    pub username: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

/// What a caller receives from login and refresh. The raw refresh token
/// stays in the session store; only its family id leaves the service.
#[derive(Debug, Clone, Serialize)]
pub struct SessionTokens {
    pub access_token: AccessToken,
    pub family_id: FamilyId,
    pub access_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct LoginResult {
    pub identity: Identity,
    pub tokens: SessionTokens,
}

/// Claim set shared by access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub user_id: UserId,
    pub role: Role,
    pub family_id: FamilyId,
}

impl TokenClaims {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id,
            role: self.role.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs and verifies bearer tokens. Pure CPU work, safe to share.
pub trait TokenCodec: Send + Sync {
    fn mint(&self, claims: &TokenClaims, ttl: Duration) -> Result<IssuedToken, TokenError>;
    fn parse(&self, token: &str) -> Result<TokenClaims, TokenError>;
}

#[async_trait::async_trait]
pub trait CredentialHasher: Send + Sync {
    async fn hash(&self, secret: &str) -> Result<String, CredentialError>;
    async fn verify(&self, secret: &str, hash: &str) -> Result<bool, CredentialError>;
}

#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    async fn register(&self, request: RegisterInput) -> Result<Identity, AuthError>;
    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError>;
    async fn refresh(&self, family_id: &FamilyId) -> Result<SessionTokens, AuthError>;
    async fn logout(&self, family_id: &FamilyId) -> Result<(), AuthError>;
    /// Stateless: signature and expiry only, no store lookup. Access tokens
    /// therefore stay valid until they expire, even after logout.
    fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError>;
    async fn revoke_all(&self, user_id: UserId) -> Result<usize, AuthError>;
    async fn active_sessions(&self, user_id: UserId) -> Result<Vec<FamilyId>, AuthError>;
    fn refresh_ttl(&self) -> Duration;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_errors_collapse_to_two_outcomes() {
        assert!(matches!(AuthError::from(TokenError::Expired), AuthError::TokenExpired));
        assert!(matches!(AuthError::from(TokenError::BadSignature), AuthError::TokenInvalid));
        assert!(matches!(AuthError::from(TokenError::Malformed), AuthError::TokenInvalid));
        assert!(matches!(
            AuthError::from(TokenError::Signing("x".into())),
            AuthError::InternalFailure(_)
        ));
    }
}
