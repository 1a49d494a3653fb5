//! Per-client submission rate limiting.
//!
//! Two backends share one contract, `check(identity) -> allowed`:
//! - [`SlidingWindowLimiter`]: process-local sliding log. Counts reset on
//!   restart and are not shared between instances, so it only bounds
//!   single-instance deployments.
//! - [`RedisLimiter`]: fixed-window counter in Redis (INCR + EXPIRE), shared
//!   by every instance.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::Client as RedisClient;
use tracing::{debug, warn};

use crate::time::Clock;

/// Number of tracked identities above which idle entries are swept.
const SWEEP_THRESHOLD: usize = 10_000;

/// Bounds how often one client may submit within a window.
#[async_trait]
pub trait SubmissionLimiter: Send + Sync {
    /// Record an attempt for `identity`.
    ///
    /// Returns `true` if the attempt is allowed. A rejected attempt is not
    /// recorded.
    async fn check(&self, identity: &str) -> bool;
}

/// In-memory sliding-log limiter.
///
/// Concurrent checks for the same identity serialise on the map shard;
/// different identities never contend.
pub struct SlidingWindowLimiter {
    max: u32,
    window: Duration,
    clock: Arc<dyn Clock>,
    log: DashMap<String, Vec<Instant>>,
}

impl SlidingWindowLimiter {
    pub fn new(max: u32, window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            max,
            window,
            clock,
            log: DashMap::new(),
        }
    }

    /// Drop identities whose attempts have all aged out of the window.
    pub fn purge_expired(&self) {
        let now = self.clock.now();
        let window = self.window;
        self.log
            .retain(|_, attempts| attempts.iter().any(|t| now.duration_since(*t) < window));
    }

    /// Number of identities currently tracked.
    pub fn tracked(&self) -> usize {
        self.log.len()
    }
}

#[async_trait]
impl SubmissionLimiter for SlidingWindowLimiter {
    async fn check(&self, identity: &str) -> bool {
        if self.log.len() > SWEEP_THRESHOLD {
            self.purge_expired();
        }

        let now = self.clock.now();
        let mut attempts = self.log.entry(identity.to_string()).or_default();
        attempts.retain(|t| now.duration_since(*t) < self.window);

        if attempts.len() >= self.max as usize {
            debug!(
                identifier = identity,
                count = attempts.len(),
                limit = self.max,
                "rate limit exceeded"
            );
            return false;
        }

        attempts.push(now);
        true
    }
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("max", &self.max)
            .field("window", &self.window)
            .field("tracked", &self.log.len())
            .finish()
    }
}

/// Rate limiter using Redis for distributed counting.
#[derive(Clone)]
pub struct RedisLimiter {
    redis: RedisClient,
    category: String,
    max: u32,
    window: Duration,
}

impl RedisLimiter {
    pub fn new(redis: RedisClient, category: impl Into<String>, max: u32, window: Duration) -> Self {
        Self {
            redis,
            category: category.into(),
            max,
            window,
        }
    }

    /// Increment the counter and return the new value.
    ///
    /// Uses a Lua script to atomically INCR + EXPIRE, preventing a race
    /// where a crash between the two commands creates an immortal counter.
    async fn increment(&self, key: &str) -> Result<i64, redis::RedisError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let script = redis::Script::new(
            r"local count = redis.call('INCR', KEYS[1])
              if count == 1 then
                redis.call('EXPIRE', KEYS[1], ARGV[1])
              end
              return count",
        );

        let ttl_secs = i64::try_from(self.window.as_secs().max(1)).unwrap_or(i64::MAX);
        let count: i64 = script
            .key(key)
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await?;

        Ok(count)
    }
}

#[async_trait]
impl SubmissionLimiter for RedisLimiter {
    async fn check(&self, identity: &str) -> bool {
        let key = format!("rate:{}:{identity}", self.category);

        let count = match self.increment(&key).await {
            Ok(c) => c,
            Err(e) => {
                // If Redis fails, allow the request (fail open)
                warn!(error = %e, "rate limit check failed, allowing request");
                return true;
            }
        };

        if count > i64::from(self.max) {
            debug!(
                category = %self.category,
                identifier = identity,
                count = count,
                limit = self.max,
                "rate limit exceeded"
            );
            false
        } else {
            true
        }
    }
}

impl std::fmt::Debug for RedisLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisLimiter")
            .field("category", &self.category)
            .field("max", &self.max)
            .field("window", &self.window)
            .finish()
    }
}

/// Get the client identifier (IP address) for rate limiting.
///
/// The first `X-Forwarded-For` entry wins over the socket address, so this is
/// only sound behind a reverse proxy that overwrites that header. Exposed
/// directly, a client can pick a fresh identity per request.
pub fn get_client_id(
    addr: Option<std::net::SocketAddr>,
    headers: &axum::http::HeaderMap,
) -> String {
    // Check X-Forwarded-For header first (for proxied requests)
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(ip) = value.split(',').next().map(str::trim)
        && !ip.is_empty()
    {
        return ip.to_string();
    }

    if let Some(real_ip) = headers.get("x-real-ip")
        && let Ok(value) = real_ip.to_str()
        && !value.trim().is_empty()
    {
        return value.trim().to_string();
    }

    // Fall back to connection address
    addr.map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
