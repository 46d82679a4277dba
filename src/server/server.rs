use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_mysql::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::server::*;
use crate::settings::Settings;
use sqlx::{MySql, Pool};
use std::sync::Arc;
use std::time::Duration;

pub struct Server {
    pub auth_service: Arc<dyn AuthService>,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub trust_forwarded_for: bool,
    pub secure_cookie: bool,
    pool: Option<Pool<MySql>>,
}

impl Server {
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        settings.validate()?;

        let credential_hasher: Arc<dyn CredentialHasher> = Arc::new(Argon2PasswordHasher::new(
            settings.auth.hash_memory_kib,
            settings.auth.hash_iterations,
            settings.auth.hash_parallelism,
        )?);
        let token_codec: Arc<dyn TokenCodec> = Arc::new(JwtHs256Codec::new(JwtConfig {
            issuer: settings.auth.issuer.clone(),
            signing_key: settings.auth.signing_secret.clone().into_bytes(),
        })?);
        let session_config = SessionConfig {
            access_ttl: Duration::from_secs(settings.auth.access_ttl_secs),
            refresh_ttl: Duration::from_secs(settings.auth.refresh_ttl_secs),
            used_marker_ttl: Duration::from_secs(settings.auth.used_marker_ttl_secs),
        };

        let publisher: Arc<dyn EventPublisher> = if settings.kafka.enabled {
            Arc::new(KafkaPublisher::new(
                &settings.kafka.brokers,
                &settings.kafka.client_id,
                Duration::from_millis(settings.auth.audit_timeout_ms),
            )?)
        } else {
            Arc::new(MemoryEventPublisher::new())
        };
        let audit = AuditLog::new(
            publisher,
            &settings.kafka.topic,
            Duration::from_millis(settings.auth.audit_timeout_ms),
        );

        let (identity_repo, tx_manager, session_store, pool): (
            Arc<dyn IdentityRepo>,
            Arc<dyn TxManager>,
            Arc<dyn SessionStore>,
            Option<Pool<MySql>>,
        ) = match settings.auth.backend.as_str() {
            "memory" => {
                warn!("memory backend: sessions and identities are lost on restart");
                let identities = Arc::new(MemoryIdentityStore::new());
                let identity_repo: Arc<dyn IdentityRepo> = identities.clone();
                let tx_manager: Arc<dyn TxManager> = identities;
                let session_store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
                (identity_repo, tx_manager, session_store, None)
            }
            "real" => {
                let redis_client = redis::Client::open(settings.redis.dsn.as_str())?;
                let redis_manager = tokio::time::timeout(
                    Duration::from_secs(3),
                    redis_client.get_connection_manager(),
                )
                .await
                .map_err(|_| anyhow::anyhow!("timed out connecting to redis"))??;
                let session_store: Arc<dyn SessionStore> = Arc::new(RedisSessionStore::new(
                    redis_manager,
                    RedisStoreConfig {
                        prefix: settings.redis.prefix.clone(),
                        op_timeout: Duration::from_millis(settings.redis.op_timeout_ms),
                        retry_backoff: Duration::from_millis(settings.redis.retry_backoff_ms),
                    },
                ));

                let pool = Pool::<MySql>::connect(&settings.mysql.dsn).await?;
                let identity_repo: Arc<dyn IdentityRepo> = Arc::new(MySqlIdentityRepo::new(pool.clone()));
                let tx_manager: Arc<dyn TxManager> = Arc::new(MySqlTxManager::new(pool.clone()));
                (identity_repo, tx_manager, session_store, Some(pool))
            }
            other => return Err(anyhow::anyhow!("Unknown auth backend: {}", other)),
        };

        let auth_service: Arc<dyn AuthService> = Arc::new(RealAuthService::new(
            identity_repo,
            tx_manager,
            credential_hasher,
            token_codec,
            session_store,
            audit,
            session_config,
        ));

        let rate_limiter: Arc<dyn RateLimiter> = if settings.http.rate_limit_requests == 0 {
            warn!("rate limiting disabled");
            Arc::new(NoopRateLimiter)
        } else {
            Arc::new(FixedWindowLimiter::new(
                settings.http.rate_limit_requests,
                Duration::from_secs(settings.http.rate_limit_window_secs),
            ))
        };

        info!(backend = %settings.auth.backend, "server started");

        Ok(Self {
            auth_service,
            rate_limiter,
            trust_forwarded_for: settings.http.trust_forwarded_for,
            secure_cookie: settings.http.secure_cookie,
            pool,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");
        if let Some(pool) = &self.pool {
            pool.close().await;
        }
    }
}
