use redis::{AsyncCommands, Client, aio::ConnectionManager};
use serde::{de::DeserializeOwned, Serialize};

use crate::{AppError, RedisConfig};

/// Read-through cache wrapper over `redis::aio::ConnectionManager`, grounded
/// in the teacher's `RedisService` (`shared/common/src/redis.rs`). Used by
/// the scheduling core's `AvailabilityCache` (spec §4.3) as the transport;
/// the scheduling-specific key shapes and TTL policy live in the
/// `aba-scheduling` crate.
#[derive(Clone)]
pub struct CacheClient {
    manager: ConnectionManager,
}

impl CacheClient {
    pub async fn connect(config: &RedisConfig) -> Result<Self, AppError> {
        let client = Client::open(config.connection_string()).map_err(AppError::Redis)?;
        let manager = ConnectionManager::new(client).await.map_err(AppError::Redis)?;
        Ok(Self { manager })
    }

    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, AppError>
    where
        T: DeserializeOwned,
    {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn.get(key).await.map_err(AppError::Redis)?;
        match raw {
            Some(data) => {
                let value = serde_json::from_str(&data)
                    .map_err(|e| AppError::Internal(format!("cache deserialize error: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub async fn set<T>(&self, key: &str, value: &T, ttl_seconds: u64) -> Result<(), AppError>
    where
        T: Serialize,
    {
        let mut conn = self.manager.clone();
        let serialized = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("cache serialize error: {e}")))?;
        conn.set_ex(key, serialized, ttl_seconds)
            .await
            .map_err(AppError::Redis)
    }

    pub async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        conn.del(key).await.map_err(AppError::Redis)
    }

    /// Deletes every key matching a glob `pattern`. Used for invalidating a
    /// whole namespace (e.g. every available-RBT entry touching a given
    /// RBT) rather than one logical key.
    pub async fn delete_by_pattern(&self, pattern: &str) -> Result<u64, AppError> {
        let mut conn = self.manager.clone();
        let keys: Vec<String> = conn.keys(pattern).await.map_err(AppError::Redis)?;
        if keys.is_empty() {
            return Ok(0);
        }
        let deleted: u64 = conn.del(&keys).await.map_err(AppError::Redis)?;
        Ok(deleted)
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(AppError::Redis)?;
        Ok(())
    }

    /// Publishes a JSON-serialized value to a pub/sub channel, grounded in
    /// the teacher's `RedisService::publish_json` helper. Used by the
    /// scheduling core's update broadcast (spec §6) as its default
    /// transport.
    pub async fn publish_json<T>(&self, channel: &str, value: &T) -> Result<(), AppError>
    where
        T: Serialize,
    {
        let mut conn = self.manager.clone();
        let serialized = serde_json::to_string(value)
            .map_err(|e| AppError::Internal(format!("publish serialize error: {e}")))?;
        let _: i64 = conn
            .publish(channel, serialized)
            .await
            .map_err(AppError::Redis)?;
        Ok(())
    }
}
