use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use aba_common::CacheClient;

use crate::config::CacheTtlConfig;

/// Cache key builders for the three read-through shapes spec §4.3 names.
/// Kept separate from `CacheClient` (the transport, owned by `aba-common`)
/// so the scheduling-specific namespaces live next to the code that uses
/// them.
pub struct CacheKeys;

impl CacheKeys {
    pub fn client_schedule(client_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "aba:schedule:client:{client_id}:{}:{}",
            start.timestamp(),
            end.timestamp()
        )
    }

    pub fn rbt_daily(rbt_id: Uuid, date: chrono::NaiveDate) -> String {
        format!("aba:schedule:rbt:{rbt_id}:{date}")
    }

    pub fn team_available_rbts(team_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> String {
        format!(
            "aba:available-rbts:{team_id}:{}:{}",
            start.timestamp(),
            end.timestamp()
        )
    }

    pub fn rbt_daily_pattern(rbt_id: Uuid) -> String {
        format!("aba:schedule:rbt:{rbt_id}:*")
    }

    pub fn client_schedule_pattern(client_id: Uuid) -> String {
        format!("aba:schedule:client:{client_id}:*")
    }

    pub fn team_available_rbts_pattern(team_id: Uuid) -> String {
        format!("aba:available-rbts:{team_id}:*")
    }
}

/// Read-through wrapper over `CacheClient` implementing the three TTL
/// tiers and the invalidation protocol of spec §4.3. Cache failures are
/// logged and swallowed — they must never fail the caller's mutation.
#[derive(Clone)]
pub struct AvailabilityCache {
    client: CacheClient,
    ttl: CacheTtlConfig,
}

impl AvailabilityCache {
    pub fn new(client: CacheClient, ttl: CacheTtlConfig) -> Self {
        Self { client, ttl }
    }

    pub async fn get_client_schedule<T: DeserializeOwned>(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<T> {
        self.get(&CacheKeys::client_schedule(client_id, start, end)).await
    }

    pub async fn set_client_schedule<T: Serialize>(
        &self,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        value: &T,
    ) {
        self.set(
            &CacheKeys::client_schedule(client_id, start, end),
            value,
            self.ttl.schedule_minutes * 60,
        )
        .await
    }

    pub async fn get_rbt_daily<T: DeserializeOwned>(
        &self,
        rbt_id: Uuid,
        date: chrono::NaiveDate,
    ) -> Option<T> {
        self.get(&CacheKeys::rbt_daily(rbt_id, date)).await
    }

    pub async fn set_rbt_daily<T: Serialize>(&self, rbt_id: Uuid, date: chrono::NaiveDate, value: &T) {
        self.set(
            &CacheKeys::rbt_daily(rbt_id, date),
            value,
            self.ttl.rbt_daily_minutes * 60,
        )
        .await
    }

    pub async fn get_team_available_rbts<T: DeserializeOwned>(
        &self,
        team_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Option<T> {
        self.get(&CacheKeys::team_available_rbts(team_id, start, end)).await
    }

    pub async fn set_team_available_rbts<T: Serialize>(
        &self,
        team_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        value: &T,
    ) {
        self.set(
            &CacheKeys::team_available_rbts(team_id, start, end),
            value,
            self.ttl.availability_minutes * 60,
        )
        .await
    }

    /// Invalidates everything touched by a mutation on `(client_id, rbt_id)`
    /// spanning `[start, end]`, per the invalidation protocol: the client's
    /// schedule range, the RBT's daily schedule, and any available-RBT
    /// entries for the RBT's teams. Errors are logged, never propagated.
    pub async fn invalidate_for_mutation(
        &self,
        client_id: Uuid,
        rbt_id: Uuid,
        team_id: Option<Uuid>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) {
        if let Err(err) = self
            .client
            .delete_by_pattern(&CacheKeys::client_schedule_pattern(client_id))
            .await
        {
            tracing::warn!(error = %err, %client_id, "failed to invalidate client schedule cache");
        }
        if let Err(err) = self
            .client
            .delete_by_pattern(&CacheKeys::rbt_daily_pattern(rbt_id))
            .await
        {
            tracing::warn!(error = %err, %rbt_id, "failed to invalidate rbt daily cache");
        }
        if let Some(team_id) = team_id {
            if let Err(err) = self
                .client
                .delete_by_pattern(&CacheKeys::team_available_rbts_pattern(team_id))
                .await
            {
                tracing::warn!(error = %err, %team_id, "failed to invalidate available-rbt cache");
            }
        }
        let _ = (start, end);
    }

    async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.client.get(key).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(error = %err, key, "cache read failed, falling through to source");
                None
            }
        }
    }

    async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_seconds: u64) {
        if let Err(err) = self.client.set(key, value, ttl_seconds).await {
            tracing::warn!(error = %err, key, "cache write failed");
        }
    }
}
