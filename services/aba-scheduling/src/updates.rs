use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use aba_common::{AppError, CacheClient};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateType {
    SessionCreated,
    SessionCancelled,
    SessionRescheduled,
    RbtUnavailable,
}

/// The broadcast contract's wire shape (spec §6): `{ type, sessionId?,
/// clientId?, rbtId?, data, timestamp }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleUpdate {
    #[serde(rename = "type")]
    pub update_type: UpdateType,
    pub session_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub rbt_id: Option<Uuid>,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Publisher interface for the update broadcast (spec §6). The core routes
/// updates through this trait; delivery, subscriber auth, and fan-out are
/// the publisher's concern, not the scheduling core's.
#[async_trait]
pub trait UpdatePublisher: Send + Sync {
    async fn publish(&self, update: ScheduleUpdate) -> Result<(), AppError>;
}

/// Default transport: one Redis pub/sub channel per `(entity, id)` plus a
/// global channel, reusing `CacheClient::publish_json`.
pub struct RedisUpdatePublisher {
    client: CacheClient,
}

impl RedisUpdatePublisher {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl UpdatePublisher for RedisUpdatePublisher {
    async fn publish(&self, update: ScheduleUpdate) -> Result<(), AppError> {
        if let Err(err) = self.client.publish_json("aba:updates:global", &update).await {
            tracing::warn!(error = %err, "failed to publish to global update channel");
        }
        if let Some(client_id) = update.client_id {
            let channel = format!("aba:updates:client:{client_id}");
            if let Err(err) = self.client.publish_json(&channel, &update).await {
                tracing::warn!(error = %err, %client_id, "failed to publish to client update channel");
            }
        }
        if let Some(rbt_id) = update.rbt_id {
            let channel = format!("aba:updates:rbt:{rbt_id}");
            if let Err(err) = self.client.publish_json(&channel, &update).await {
                tracing::warn!(error = %err, %rbt_id, "failed to publish to rbt update channel");
            }
        }
        Ok(())
    }
}
