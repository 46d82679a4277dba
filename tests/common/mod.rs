//! Shared wiring for the integration tests: the session manager over the
//! in-memory adapters, plus a store that can be told to fail.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use turnstile::application_impl::*;
use turnstile::application_port::*;
use turnstile::domain_model::*;
use turnstile::domain_port::*;
use turnstile::infra_memory::*;

pub const ISSUER: &str = "turnstile.test";
pub const SECRET: &[u8] = b"integration-test-signing-secret";
pub const PASSWORD: &str = "correct horse battery";

pub fn codec() -> Arc<JwtHs256Codec> {
    Arc::new(
        JwtHs256Codec::new(JwtConfig {
            issuer: ISSUER.to_string(),
            signing_key: SECRET.to_vec(),
        })
        .unwrap(),
    )
}

/// Argon2id with the smallest parameters the crate accepts.
pub fn cheap_hasher() -> Arc<Argon2PasswordHasher> {
    Arc::new(Argon2PasswordHasher::new(1024, 1, 1).unwrap())
}

pub struct Harness {
    pub service: Arc<RealAuthService>,
    pub sessions: Arc<MemorySessionStore>,
    pub identities: MemoryIdentityStore,
    pub events: Arc<MemoryEventPublisher>,
}

impl Harness {
    pub fn new() -> Self {
        Self::wrapping(|store| store as Arc<dyn SessionStore>)
    }

    /// Lets a test put a decorator between the service and the memory store.
    pub fn wrapping<F>(wrap: F) -> Self
    where
        F: FnOnce(Arc<MemorySessionStore>) -> Arc<dyn SessionStore>,
    {
        let sessions = Arc::new(MemorySessionStore::new());
        let identities = MemoryIdentityStore::new();
        let events = Arc::new(MemoryEventPublisher::new());
        let service = service_over(
            wrap(sessions.clone()),
            identities.clone(),
            events.clone(),
            SessionConfig::default(),
        );
        Harness {
            service: Arc::new(service),
            sessions,
            identities,
            events,
        }
    }

    pub async fn register(&self, login: &str) -> Identity {
        self.service
            .register(RegisterInput {
                login: login.to_string(),
                username: "someone".to_string(),
                password: PASSWORD.to_string(),
                role: Role::new("admin"),
            })
            .await
            .unwrap()
    }

    pub async fn login(&self, login: &str) -> LoginResult {
        self.service
            .login(LoginInput {
                login: login.to_string(),
                password: PASSWORD.to_string(),
            })
            .await
            .unwrap()
    }
}

pub fn service_over(
    store: Arc<dyn SessionStore>,
    identities: MemoryIdentityStore,
    publisher: Arc<dyn EventPublisher>,
    cfg: SessionConfig,
) -> RealAuthService {
    RealAuthService::new(
        Arc::new(identities.clone()),
        Arc::new(identities),
        cheap_hasher(),
        codec(),
        store,
        AuditLog::new(publisher, "log-event", Duration::from_millis(200)),
        cfg,
    )
}

/// Delegates to a memory store until told to fail writes.
pub struct FlakyStore {
    inner: Arc<MemorySessionStore>,
    pub fail_put: AtomicBool,
    pub fail_add_to_set: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemorySessionStore>) -> Self {
        FlakyStore {
            inner,
            fail_put: AtomicBool::new(false),
            fail_add_to_set: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected timeout".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait::async_trait]
impl SessionStore for FlakyStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        Self::check(&self.fail_put)?;
        self.inner.put(key, value, ttl).await
    }

    async fn put_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.inner.delete(key).await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.inner.take(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.exists(key).await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        self.inner.ttl(key).await
    }

    async fn add_to_set(&self, set_key: &str, member: &str, ttl: Duration) -> Result<(), StoreError> {
        Self::check(&self.fail_add_to_set)?;
        self.inner.add_to_set(set_key, member, ttl).await
    }

    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        self.inner.remove_from_set(set_key, member).await
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError> {
        self.inner.set_members(set_key).await
    }
}
