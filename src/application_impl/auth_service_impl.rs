use crate::application_impl::AuditLog;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};

const MIN_USERNAME_LEN: usize = 3;
const MAX_USERNAME_LEN: usize = 50;
const MIN_PASSWORD_LEN: usize = 8;
/// Hashed once with the configured parameters and verified against when the
/// login is unknown.
const DUMMY_PASSWORD: &str = "turnstile-unknown-login";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// How long a consumed family id is remembered for replay detection.
    pub used_marker_ttl: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            used_marker_ttl: Duration::from_secs(5 * 60),
        }
    }
}

struct IssuedPair {
    family_id: FamilyId,
    access: IssuedToken,
    refresh: IssuedToken,
}

/// Session manager: login, rotation on refresh, logout and validation.
///
/// Holds no mutable state of its own. Every transition of a token family
/// goes through the [`SessionStore`]:
///
/// ```text
/// Active   : token:{fid} present, token:{fid}:used absent
/// Consumed : token:{fid}:used present (set once, atomically)
/// Gone     : neither present (logout, rotation cleanup or TTL)
/// ```
///
/// A rotation needs both the marker (`put_if_absent`) and the record
/// (`take`). Losing either means the family was already used.
pub struct RealAuthService {
    identity_repo: Arc<dyn IdentityRepo>,
    tx_manager: Arc<dyn TxManager>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_codec: Arc<dyn TokenCodec>,
    session_store: Arc<dyn SessionStore>,
    audit: AuditLog,
    cfg: SessionConfig,
    dummy_hash: OnceCell<String>,
}

impl RealAuthService {
    pub fn new(
        identity_repo: Arc<dyn IdentityRepo>,
        tx_manager: Arc<dyn TxManager>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_codec: Arc<dyn TokenCodec>,
        session_store: Arc<dyn SessionStore>,
        audit: AuditLog,
        cfg: SessionConfig,
    ) -> Self {
        Self {
            identity_repo,
            tx_manager,
            credential_hasher,
            token_codec,
            session_store,
            audit,
            cfg,
            dummy_hash: OnceCell::new(),
        }
    }

    fn validate_register(request: &RegisterInput) -> Result<(), AuthError> {
        let looks_like_email = request
            .login
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
        if !looks_like_email {
            return Err(AuthError::InvalidInput("login must be an e-mail address".to_string()));
        }
        let username_len = request.username.chars().count();
        if !(MIN_USERNAME_LEN..=MAX_USERNAME_LEN).contains(&username_len) {
            return Err(AuthError::InvalidInput(format!(
                "username must be {}-{} characters",
                MIN_USERNAME_LEN, MAX_USERNAME_LEN
            )));
        }
        if request.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        if !request.role.is_known() {
            return Err(AuthError::InvalidInput(format!("unknown role {}", request.role)));
        }
        Ok(())
    }

    /// Burns one verification so an unknown login takes as long as a wrong
    /// password.
    async fn verify_against_dummy(&self, password: &str) {
        let dummy = self
            .dummy_hash
            .get_or_try_init(|| self.credential_hasher.hash(DUMMY_PASSWORD))
            .await;
        match dummy {
            Ok(hash) => {
                let _ = self.credential_hasher.verify(password, hash).await;
            }
            Err(e) => debug!(error = %e, "dummy password hash unavailable"),
        }
    }

    /// Mints an access/refresh pair under a fresh family id. Pure.
    fn issue_pair(&self, identity: &Identity) -> Result<IssuedPair, AuthError> {
        let family_id = FamilyId::generate();
        let claims = TokenClaims {
            user_id: identity.user_id,
            role: identity.role.clone(),
            family_id,
        };
        let access = self.token_codec.mint(&claims, self.cfg.access_ttl)?;
        let refresh = self.token_codec.mint(&claims, self.cfg.refresh_ttl)?;
        Ok(IssuedPair {
            family_id,
            access,
            refresh,
        })
    }

    /// Writes the SessionRecord and indexes it under the user. Either both
    /// land or the record is removed again.
    async fn persist_session(
        &self,
        user_id: &UserId,
        family_id: &FamilyId,
        refresh_token: &str,
    ) -> Result<(), AuthError> {
        let record_key = SessionKeys::record(family_id);
        self.session_store
            .put(&record_key, refresh_token, self.cfg.refresh_ttl)
            .await?;

        if let Err(e) = self
            .session_store
            .add_to_set(
                &SessionKeys::user_set(user_id),
                &family_id.to_string(),
                self.cfg.refresh_ttl,
            )
            .await
        {
            if let Err(cleanup) = self.session_store.delete(&record_key).await {
                warn!(%family_id, error = %cleanup, "orphaned session record left to expire");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Distinguishes a family that was rotated away from one that simply
    /// does not exist any more.
    async fn gone_or_replayed(&self, family_id: &FamilyId) -> AuthError {
        match self.session_store.exists(&SessionKeys::used(family_id)).await {
            Ok(true) => {
                warn!(%family_id, "refresh replayed");
                AuthError::TokenReplayed
            }
            Ok(false) => {
                debug!(%family_id, "refresh on absent session");
                AuthError::TokenExpired
            }
            Err(e) => e.into(),
        }
    }

    fn session_tokens(pair: IssuedPair) -> SessionTokens {
        SessionTokens {
            access_token: AccessToken(pair.access.token),
            family_id: pair.family_id,
            access_token_expires_at: pair.access.expires_at,
        }
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn register(&self, request: RegisterInput) -> Result<Identity, AuthError> {
        Self::validate_register(&request)?;
        let RegisterInput {
            login,
            username,
            password,
            role,
        } = request;

        // Hashing runs on the blocking pool; no transaction is open meanwhile.
        let password_hash = self.credential_hasher.hash(&password).await?;

        let mut tx = self.tx_manager.begin().await?;
        if tx.login_exists(&login).await? {
            return Err(AuthError::IdentityExists);
        }

        let record = IdentityRecord {
            user_id: UserId::generate(),
            login,
            username,
            role,
            password_hash,
            created_at: Utc::now(),
        };
        tx.insert_identity(&record).await?;
        tx.commit().await?;

        info!(user_id = %record.user_id, "identity registered");
        self.audit
            .emit(AuditEvent::info(format!("user {} registered", record.user_id)))
            .await;

        Ok(record.identity())
    }

    async fn login(&self, request: LoginInput) -> Result<LoginResult, AuthError> {
        let LoginInput { login, password } = request;

        let Some(rec) = self.identity_repo.find_by_login(&login).await? else {
            self.verify_against_dummy(&password).await;
            return Err(AuthError::IdentityNotFound);
        };

        let matches = match self
            .credential_hasher
            .verify(&password, &rec.password_hash)
            .await
        {
            Ok(matches) => matches,
            Err(CredentialError::MalformedHash(e)) => {
                error!(user_id = %rec.user_id, error = %e, "stored password hash is malformed");
                return Err(AuthError::InternalFailure("malformed password hash".to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        if !matches {
            warn!(user_id = %rec.user_id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let identity = rec.identity();
        let pair = self.issue_pair(&identity)?;
        self.persist_session(&identity.user_id, &pair.family_id, &pair.refresh.token)
            .await?;

        info!(user_id = %identity.user_id, family_id = %pair.family_id, "login succeeded");
        self.audit
            .emit(AuditEvent::info(format!("user {} logged in", identity.user_id)))
            .await;

        Ok(LoginResult {
            identity,
            tokens: Self::session_tokens(pair),
        })
    }

    async fn refresh(&self, family_id: &FamilyId) -> Result<SessionTokens, AuthError> {
        let record_key = SessionKeys::record(family_id);
        let used_key = SessionKeys::used(family_id);

        // Fast path only; the put_if_absent below is what settles races.
        if self.session_store.exists(&used_key).await? {
            warn!(%family_id, "refresh replayed");
            return Err(AuthError::TokenReplayed);
        }

        if self.session_store.ttl(&record_key).await?.is_none() {
            return Err(self.gone_or_replayed(family_id).await);
        }
        let stored = match self.session_store.get(&record_key).await? {
            Some(stored) => stored,
            None => return Err(self.gone_or_replayed(family_id).await),
        };

        let claims = self.token_codec.parse(&stored).map_err(|e| {
            warn!(%family_id, error = %e, "stored refresh token rejected");
            AuthError::from(e)
        })?;
        if claims.family_id != *family_id {
            warn!(%family_id, "stored refresh token belongs to another family");
            return Err(AuthError::TokenInvalid);
        }

        let identity = claims.identity();
        let pair = self.issue_pair(&identity)?;

        // Active -> Consumed. Exactly one caller can create the marker.
        let won = self
            .session_store
            .put_if_absent(&used_key, "1", self.cfg.used_marker_ttl)
            .await?;
        if !won {
            warn!(%family_id, "concurrent refresh lost the rotation");
            return Err(AuthError::TokenReplayed);
        }

        // The marker alone does not settle it: a logout between two refreshes
        // clears the marker. Only the caller that removes the record rotates.
        if self.session_store.take(&record_key).await?.is_none() {
            warn!(%family_id, "session record already consumed");
            return Err(AuthError::TokenReplayed);
        }
        if let Err(e) = self
            .session_store
            .remove_from_set(&SessionKeys::user_set(&identity.user_id), &family_id.to_string())
            .await
        {
            debug!(%family_id, error = %e, "user token set not updated");
        }

        if let Err(e) = self
            .persist_session(&identity.user_id, &pair.family_id, &pair.refresh.token)
            .await
        {
            error!(
                user_id = %identity.user_id,
                old_family_id = %family_id,
                error = %e,
                "rotated session could not be stored; client must log in again"
            );
            return Err(e);
        }

        info!(
            user_id = %identity.user_id,
            old_family_id = %family_id,
            family_id = %pair.family_id,
            "session rotated"
        );
        self.audit
            .emit(AuditEvent::info(format!(
                "user {} refreshed tokens",
                identity.user_id
            )))
            .await;

        Ok(Self::session_tokens(pair))
    }

    async fn logout(&self, family_id: &FamilyId) -> Result<(), AuthError> {
        let record_key = SessionKeys::record(family_id);

        let owner = self
            .session_store
            .get(&record_key)
            .await?
            .and_then(|stored| self.token_codec.parse(&stored).ok())
            .map(|claims| claims.user_id);

        self.session_store.delete(&record_key).await?;
        self.session_store
            .delete(&SessionKeys::used(family_id))
            .await?;

        if let Some(user_id) = owner {
            if let Err(e) = self
                .session_store
                .remove_from_set(&SessionKeys::user_set(&user_id), &family_id.to_string())
                .await
            {
                debug!(%family_id, error = %e, "user token set not updated");
            }
        }

        info!(%family_id, "logged out");
        Ok(())
    }

    fn validate_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.token_codec.parse(token).map_err(|e| {
            debug!(error = %e, "access token rejected");
            AuthError::from(e)
        })
    }

    async fn revoke_all(&self, user_id: UserId) -> Result<usize, AuthError> {
        let set_key = SessionKeys::user_set(&user_id);
        let members = self.session_store.set_members(&set_key).await?;

        let mut revoked = 0;
        for member in members {
            let Ok(family_id) = member.parse::<FamilyId>() else {
                warn!(%user_id, %member, "skipping unparsable family id");
                continue;
            };
            let record_key = SessionKeys::record(&family_id);
            if self.session_store.exists(&record_key).await? {
                revoked += 1;
            }
            self.session_store.delete(&record_key).await?;
            self.session_store
                .delete(&SessionKeys::used(&family_id))
                .await?;
        }
        self.session_store.delete(&set_key).await?;

        info!(%user_id, revoked, "all sessions revoked");
        self.audit
            .emit(AuditEvent::info(format!(
                "user {} revoked {} session(s)",
                user_id, revoked
            )))
            .await;

        Ok(revoked)
    }

    async fn active_sessions(&self, user_id: UserId) -> Result<Vec<FamilyId>, AuthError> {
        let members = self
            .session_store
            .set_members(&SessionKeys::user_set(&user_id))
            .await?;

        let mut live = Vec::with_capacity(members.len());
        for member in members {
            let Ok(family_id) = member.parse::<FamilyId>() else {
                continue;
            };
            if self
                .session_store
                .exists(&SessionKeys::record(&family_id))
                .await?
            {
                live.push(family_id);
            }
        }
        Ok(live)
    }

    fn refresh_ttl(&self) -> Duration {
        self.cfg.refresh_ttl
    }
}
