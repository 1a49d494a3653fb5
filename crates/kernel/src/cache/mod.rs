//! Tag-based cache invalidation against the shared Redis cache.
//!
//! The rendering layer stores each cached page under a key and registers the
//! key in one Redis set per tag (`tag:<tag>`). Invalidating a tag deletes
//! every member key and then the set itself. Dropping a tag that has no
//! members is a no-op, so invalidation is idempotent.

use async_trait::async_trait;
use redis::Client as RedisClient;
use thiserror::Error;
use tracing::debug;

/// Cache backend failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Something that can drop every cache entry carrying a tag.
///
/// Implementations must be idempotent.
#[async_trait]
pub trait TagInvalidator: Send + Sync {
    async fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError>;
}

/// Handle on the shared tag-indexed cache.
///
/// Without Redis there is no shared cache to invalidate and every call is a
/// logged no-op.
#[derive(Clone)]
pub struct CacheLayer {
    redis: Option<RedisClient>,
}

impl CacheLayer {
    pub fn new(redis: Option<RedisClient>) -> Self {
        Self { redis }
    }

    /// Invalidate all cache keys associated with a tag.
    ///
    /// Runs as one Lua script so the tag set and its members disappear
    /// together.
    pub async fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError> {
        let Some(redis) = self.redis.as_ref() else {
            debug!(tag = %tag, "no shared cache configured; tag invalidation skipped");
            return Ok(());
        };

        let tag_key = tag_key(tag);
        let mut conn = redis.get_multiplexed_async_connection().await?;

        let script = redis::Script::new(INVALIDATE_TAG_SCRIPT);
        let dropped: i64 = script.key(&tag_key).invoke_async(&mut conn).await?;

        debug!(tag = %tag, keys_invalidated = dropped, "tag invalidated");
        Ok(())
    }

    /// Whether Redis is reachable. `None` when no Redis is configured.
    pub async fn redis_healthy(&self) -> Option<bool> {
        let redis = self.redis.as_ref()?;
        let Ok(mut conn) = redis.get_multiplexed_async_connection().await else {
            return Some(false);
        };
        let pong: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        Some(pong.is_ok())
    }
}

#[async_trait]
impl TagInvalidator for CacheLayer {
    async fn invalidate_tag(&self, tag: &str) -> Result<(), CacheError> {
        CacheLayer::invalidate_tag(self, tag).await
    }
}

fn tag_key(tag: &str) -> String {
    format!("tag:{tag}")
}

/// Lua script for atomic tag invalidation.
///
/// Gets all keys in the tag set, deletes them, then deletes the tag set.
const INVALIDATE_TAG_SCRIPT: &str = r#"
local keys = redis.call("SMEMBERS", KEYS[1])
if #keys > 0 then
    redis.call("DEL", unpack(keys))
end
redis.call("DEL", KEYS[1])
return #keys
"#;

impl std::fmt::Debug for CacheLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheLayer")
            .field("redis", &self.redis.is_some())
            .finish()
    }
}
