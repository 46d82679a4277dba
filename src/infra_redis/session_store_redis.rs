use crate::domain_port::{SessionStore, StoreError};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, RedisResult};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    pub prefix: String,
    /// Upper bound for a single round trip.
    pub op_timeout: Duration,
    /// Pause before the one retry of an idempotent call.
    pub retry_backoff: Duration,
}

pub struct RedisSessionStore {
    conn: ConnectionManager,
    cfg: RedisStoreConfig,
}

impl RedisSessionStore {
    pub fn new(conn: ConnectionManager, cfg: RedisStoreConfig) -> Self {
        RedisSessionStore { conn, cfg }
    }

    fn key(&self, key: &str) -> String {
        prefixed(&self.cfg.prefix, key)
    }

    async fn run<T, F, Fut>(&self, op: &'static str, idempotent: bool, call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let policy = CallPolicy {
            timeout: self.cfg.op_timeout,
            backoff: self.cfg.retry_backoff,
            idempotent,
        };
        with_retry(op, policy, call).await
    }
}

#[derive(Debug, Clone, Copy)]
struct CallPolicy {
    timeout: Duration,
    backoff: Duration,
    idempotent: bool,
}

/// Runs `call` under the per-operation timeout. Transient failures and
/// timeouts are retried once after the backoff when the call is idempotent.
async fn with_retry<T, F, Fut>(op: &'static str, policy: CallPolicy, mut call: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RedisResult<T>>,
{
    let attempts = if policy.idempotent { 2 } else { 1 };
    let mut last = StoreError::Unavailable(format!("{} not attempted", op));
    for attempt in 0..attempts {
        if attempt > 0 {
            debug!(op, error = %last, "retrying store call");
            tokio::time::sleep(policy.backoff).await;
        }
        match tokio::time::timeout(policy.timeout, call()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) if is_transient(&e) => last = StoreError::Unavailable(e.to_string()),
            Ok(Err(e)) => return Err(StoreError::Backend(e.to_string())),
            Err(_) => last = StoreError::Unavailable(format!("{} timed out", op)),
        }
    }
    Err(last)
}

fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{}:{}", prefix, key)
    }
}

fn is_transient(e: &RedisError) -> bool {
    e.is_io_error() || e.is_timeout() || e.is_connection_dropped() || e.is_connection_refusal()
}

/// PTTL answers -2 for a missing key and -1 for one without expiry; neither
/// is a live session.
fn ttl_from_millis(pttl: i64) -> Option<Duration> {
    if pttl > 0 {
        Some(Duration::from_millis(pttl as u64))
    } else {
        None
    }
}

fn millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

#[async_trait::async_trait]
impl SessionStore for RedisSessionStore {
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let key = self.key(key);
        let ms = millis(ttl);
        self.run("put", true, || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            let value = value.to_owned();
            async move {
                let _: () = conn.pset_ex(&key, &value, ms).await?;
                Ok(())
            }
        })
        .await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let key = self.key(key);
        let ms = millis(ttl);
        // Never retried: a timed-out SET NX may already have applied.
        let reply: Option<String> = self
            .run("put_if_absent", false, || {
                let mut conn = self.conn.clone();
                let key = key.clone();
                let value = value.to_owned();
                async move {
                    let reply: Option<String> = redis::cmd("SET")
                        .arg(&key)
                        .arg(&value)
                        .arg("NX")
                        .arg("PX")
                        .arg(ms)
                        .query_async(&mut conn)
                        .await?;
                    Ok(reply)
                }
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = self.key(key);
        self.run("get", true, || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            async move {
                let value: Option<String> = conn.get(&key).await?;
                Ok(value)
            }
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let key = self.key(key);
        self.run("delete", true, || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            async move {
                let _: () = conn.del(&key).await?;
                Ok(())
            }
        })
        .await
    }

    async fn take(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = self.key(key);
        // GETDEL is not retried: a timed-out attempt may already have removed
        // the key, and a second one would then report it as never present.
        self.run("take", false, || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            async move {
                let value: Option<String> = conn.get_del(&key).await?;
                Ok(value)
            }
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let key = self.key(key);
        self.run("exists", true, || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            async move {
                let found: bool = conn.exists(&key).await?;
                Ok(found)
            }
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let key = self.key(key);
        let pttl: i64 = self
            .run("ttl", true, || {
                let mut conn = self.conn.clone();
                let key = key.clone();
                async move {
                    let pttl: i64 = conn.pttl(&key).await?;
                    Ok(pttl)
                }
            })
            .await?;
        Ok(ttl_from_millis(pttl))
    }

    async fn add_to_set(
        &self,
        set_key: &str,
        member: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let key = self.key(set_key);
        let ms = millis(ttl) as i64;
        self.run("add_to_set", true, || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            let member = member.to_owned();
            async move {
                let _: () = redis::pipe()
                    .atomic()
                    .sadd(&key, &member)
                    .ignore()
                    .pexpire(&key, ms)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok(())
            }
        })
        .await
    }

    async fn remove_from_set(&self, set_key: &str, member: &str) -> Result<(), StoreError> {
        let key = self.key(set_key);
        self.run("remove_from_set", true, || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            let member = member.to_owned();
            async move {
                let _: () = conn.srem(&key, &member).await?;
                Ok(())
            }
        })
        .await
    }

    async fn set_members(&self, set_key: &str) -> Result<Vec<String>, StoreError> {
        let key = self.key(set_key);
        self.run("set_members", true, || {
            let mut conn = self.conn.clone();
            let key = key.clone();
            async move {
                let members: Vec<String> = conn.smembers(&key).await?;
                Ok(members)
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(prefixed("auth", "token:abc"), "auth:token:abc");
        assert_eq!(prefixed("", "token:abc"), "token:abc");
    }

    #[test]
    fn non_positive_pttl_means_absent() {
        assert_eq!(ttl_from_millis(-2), None);
        assert_eq!(ttl_from_millis(-1), None);
        assert_eq!(ttl_from_millis(0), None);
        assert_eq!(ttl_from_millis(1500), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn sub_millisecond_ttl_rounds_up() {
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::from_secs(2)), 2000);
    }

    fn policy(idempotent: bool) -> CallPolicy {
        CallPolicy {
            timeout: Duration::from_millis(50),
            backoff: Duration::from_millis(5),
            idempotent,
        }
    }

    fn connection_reset() -> RedisError {
        RedisError::from(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"))
    }

    fn wrong_type() -> RedisError {
        RedisError::from((redis::ErrorKind::TypeError, "WRONGTYPE"))
    }

    #[tokio::test]
    async fn transient_error_is_retried_once() {
        let calls = AtomicUsize::new(0);
        let result = with_retry("get", policy(true), || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(connection_reset())
                } else {
                    Ok("value")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "value");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn transient_error_gives_up_after_the_retry() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry("get", policy(true), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(connection_reset()) }
        })
        .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn backend_error_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry("get", policy(true), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(wrong_type()) }
        })
        .await;

        assert!(matches!(result, Err(StoreError::Backend(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_call_times_out_as_unavailable() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry("get", policy(true), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;

        match result {
            Err(StoreError::Unavailable(message)) => assert!(message.contains("timed out")),
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_idempotent_call_is_attempted_once() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry("put_if_absent", policy(false), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(connection_reset()) }
        })
        .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let timed_out: Result<(), _> = with_retry("take", policy(false), || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
        })
        .await;
        assert!(matches!(timed_out, Err(StoreError::Unavailable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
