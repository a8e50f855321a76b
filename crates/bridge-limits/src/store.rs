//! Shared Limit Store (spec §4.F).
//!
//! An abstract key/value + sorted-set + scripting interface the rate
//! limiter and budget can run their atomic operations against, backed by
//! Redis. Grounded directly on the teacher's `RedisNonceStorage`
//! (`turbomcp-dpop/src/redis_storage.rs`): a `redis::Client` wrapped in a
//! retry-with-backoff helper, `redis::pipe().atomic()` for multi-key
//! transactions, and `SCAN`-based iteration rather than `KEYS`.
//!
//! Per spec §4.F, a connection failure at startup disables the shared
//! feature and logs a warning instead of failing the bridge — callers get
//! `None` from [`connect`] and fall back to local in-process state.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("shared store error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// The operations the rate limiter and budget need from a shared backend
/// (spec §4.F). Implemented here for Redis; any future backend only needs
/// to satisfy this trait.
#[async_trait]
pub trait SharedLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
    async fn sorted_set_add(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError>;
    async fn sorted_set_remove_by_score(&self, key: &str, max_score: f64) -> Result<u64, StoreError>;
    async fn sorted_set_cardinality(&self, key: &str) -> Result<u64, StoreError>;
    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
    /// Run a Lua script returning an integer; used for the atomic
    /// admit/reserve/commit scripts in the rate limiter and budget.
    async fn eval_i64(&self, script: &str, keys: &[String], args: &[String]) -> Result<i64, StoreError>;
}

/// Redis-backed [`SharedLimitStore`].
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    max_retries: u32,
}

impl RedisStore {
    /// Attempt to connect within `connect_timeout`; on any failure, log a
    /// warning and return `None` so the caller falls back to local state
    /// (spec §4.F: "falls back to local state without error").
    pub async fn connect(url: &str, connect_timeout: Duration) -> Option<Self> {
        let client = match redis::Client::open(url) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "shared limit store: invalid Redis URL, falling back to local state");
                return None;
            }
        };

        let ping = tokio::time::timeout(connect_timeout, async {
            let mut conn = client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<String>(&mut conn).await
        })
        .await;

        match ping {
            Ok(Ok(_)) => Some(Self {
                client,
                max_retries: 3,
            }),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "shared limit store: Redis ping failed, falling back to local state");
                None
            }
            Err(_) => {
                tracing::warn!(timeout_ms = connect_timeout.as_millis() as u64, "shared limit store: Redis connect timed out, falling back to local state");
                None
            }
        }
    }

    async fn with_retries<F, Fut, T>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if attempts >= self.max_retries => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(attempt = attempts, error = %e, "shared limit store operation failed, retrying");
                    tokio::time::sleep(Duration::from_millis(100 * attempts as u64)).await;
                }
            }
        }
    }

    async fn conn(&self) -> redis::RedisResult<redis::aio::MultiplexedConnection> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl SharedLimitStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            conn.get(key).await
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            match ttl {
                Some(ttl) => conn.set_ex(key, value, ttl.as_secs().max(1)).await,
                None => conn.set(key, value).await,
            }
        })
        .await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            conn.incr(key, delta).await
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            conn.expire(key, ttl.as_secs() as i64).await
        })
        .await
    }

    async fn sorted_set_add(&self, key: &str, score: f64, member: &str) -> Result<(), StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            conn.zadd(key, member, score).await
        })
        .await
    }

    async fn sorted_set_remove_by_score(&self, key: &str, max_score: f64) -> Result<u64, StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            conn.zrembyscore(key, f64::NEG_INFINITY, max_score).await
        })
        .await
    }

    async fn sorted_set_cardinality(&self, key: &str) -> Result<u64, StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            conn.zcard(key).await
        })
        .await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            conn.sadd(key, member).await
        })
        .await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            conn.smembers(key).await
        })
        .await
    }

    async fn eval_i64(&self, script: &str, keys: &[String], args: &[String]) -> Result<i64, StoreError> {
        let script = redis::Script::new(script);
        self.with_retries(|| async {
            let mut conn = self.conn().await?;
            let mut invocation = script.prepare_invoke();
            for key in keys {
                invocation.key(key);
            }
            for arg in args {
                invocation.arg(arg);
            }
            invocation.invoke_async(&mut conn).await
        })
        .await
    }
}
