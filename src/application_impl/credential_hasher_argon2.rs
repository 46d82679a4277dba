use crate::application_port::{CredentialError, CredentialHasher};
use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

/// Argon2id with a configurable cost. Hashing and verification run on the
/// blocking pool since both are deliberately slow.
#[derive(Debug, Clone)]
pub struct Argon2PasswordHasher {
    params: Params,
}

impl Argon2PasswordHasher {
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, CredentialError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| CredentialError::Hashing(format!("invalid argon2 params: {}", e)))?;
        Ok(Argon2PasswordHasher { params })
    }

    fn argon2(params: Params) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
    }
}

impl Default for Argon2PasswordHasher {
    fn default() -> Self {
        Argon2PasswordHasher {
            params: Params::default(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialHasher for Argon2PasswordHasher {
    async fn hash(&self, secret: &str) -> Result<String, CredentialError> {
        let secret = secret.to_owned();
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Self::argon2(params)
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| CredentialError::Hashing(e.to_string()))
        })
        .await
        .map_err(|e| CredentialError::Hashing(e.to_string()))?
    }

    async fn verify(&self, secret: &str, hash: &str) -> Result<bool, CredentialError> {
        // Cost parameters are read back from the PHC string, not from `self`.
        PasswordHash::new(hash).map_err(|e| CredentialError::MalformedHash(e.to_string()))?;

        let secret = secret.to_owned();
        let hash = hash.to_owned();
        let params = self.params.clone();
        tokio::task::spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&hash).map_err(|e| CredentialError::MalformedHash(e.to_string()))?;
            match Self::argon2(params).verify_password(secret.as_bytes(), &parsed) {
                Ok(()) => Ok(true),
                Err(argon2::password_hash::Error::Password) => Ok(false),
                Err(e) => Err(CredentialError::Hashing(format!("verify error: {}", e))),
            }
        })
        .await
        .map_err(|e| CredentialError::Hashing(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> Argon2PasswordHasher {
        Argon2PasswordHasher::new(1024, 1, 1).unwrap()
    }

    #[tokio::test]
    async fn verifies_the_secret_it_hashed() {
        let hasher = cheap();
        let hash = hasher.hash("correct horse").await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("correct horse"));
        assert!(hasher.verify("correct horse", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_secret_is_a_mismatch_not_an_error() {
        let hasher = cheap();
        let hash = hasher.hash("correct horse").await.unwrap();
        assert!(!hasher.verify("battery staple", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn same_secret_hashes_differently() {
        let hasher = cheap();
        let a = hasher.hash("pw-12345678").await.unwrap();
        let b = hasher.hash("pw-12345678").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn malformed_hash_is_reported_distinctly() {
        let hasher = cheap();
        let err = hasher.verify("anything", "not-a-phc-string").await.unwrap_err();
        assert!(matches!(err, CredentialError::MalformedHash(_)));
    }

    #[test]
    fn rejects_impossible_params() {
        assert!(Argon2PasswordHasher::new(1, 0, 0).is_err());
    }
}
