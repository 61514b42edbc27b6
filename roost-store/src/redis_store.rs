use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::backend::{EventQueue, LockStore, ReadModelCache};
use crate::error::StoreError;

/// Release only when the caller still owns the lock. Doing the check and the
/// delete in one script keeps a delayed release from clearing a lock that was
/// re-acquired after lease expiry.
const RELEASE_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, redis::RedisError> {
        self.client.get_multiplexed_async_connection().await
    }
}

#[async_trait]
impl LockStore for RedisClient {
    async fn try_acquire(&self, key: &str, owner: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        // SET NX EX: only set if the key does not exist, with a lease
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(owner)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;

        Ok(result.is_some())
    }

    async fn release(&self, key: &str, owner: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}

#[async_trait]
impl EventQueue for RedisClient {
    async fn push_back(&self, queue: &str, payload: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.rpush::<_, _, ()>(queue, payload).await?;
        Ok(())
    }

    async fn pop_front(&self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        // BLPOP returns (list, value) or nil on timeout
        let popped: Option<(String, String)> = conn.blpop(queue, timeout.as_secs_f64()).await?;
        Ok(popped.map(|(_, value)| value))
    }

    async fn try_pop_front(&self, queue: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.lpop(queue, None).await?)
    }

    async fn len(&self, queue: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(queue).await?)
    }

    async fn range(&self, queue: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.lrange(queue, 0, -1).await?)
    }

    async fn clear(&self, queue: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(queue).await?;
        Ok(())
    }
}

#[async_trait]
impl ReadModelCache for RedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(key, field, value).await?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn hash_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.hgetall(key).await?)
    }

    async fn hash_delete(&self, key: &str, field: &str) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        conn.hdel::<_, _, ()>(key, field).await?;
        Ok(())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn().await?;
        Ok(conn.keys(format!("{prefix}*")).await?)
    }
}
