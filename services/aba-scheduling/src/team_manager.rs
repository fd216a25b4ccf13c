use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use aba_common::{AppError, Clock};
use aba_database::{ClientRepository, EventType, RbtRepository, Team, TeamRepository};

use crate::event_log::EventLog;

/// Per-rbt missing qualifications found while assigning a team — warnings,
/// never failures (spec §4.6).
#[derive(Debug, Clone, Serialize)]
pub struct TeamAssignmentResult {
    pub team: Team,
    pub qualification_warnings: HashMap<Uuid, Vec<String>>,
}

/// Team CRUD and member operations (spec §4.6). Every successful mutation
/// appends a `ScheduleEvent` with old/new values and reason, matching the
/// `docpat` appointment service's "commit then audit" ordering.
#[derive(Clone)]
pub struct TeamManager {
    teams: Arc<dyn TeamRepository>,
    rbts: Arc<dyn RbtRepository>,
    clients: Arc<dyn ClientRepository>,
    events: EventLog,
    clock: Arc<dyn Clock>,
}

impl TeamManager {
    pub fn new(
        teams: Arc<dyn TeamRepository>,
        rbts: Arc<dyn RbtRepository>,
        clients: Arc<dyn ClientRepository>,
        events: EventLog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            teams,
            rbts,
            clients,
            events,
            clock,
        }
    }

    pub async fn assign_team(
        &self,
        client_id: Uuid,
        rbt_ids: Vec<Uuid>,
        primary_rbt_id: Uuid,
        effective_date: DateTime<Utc>,
        required_qualifications: &[String],
        actor: Uuid,
    ) -> Result<TeamAssignmentResult, AppError> {
        let client = self
            .clients
            .find_by_id(client_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("client {client_id} not found")))?;
        if !client.active {
            return Err(AppError::Conflict(format!("client {client_id} is not active")));
        }

        if self.teams.find_active_by_client_id(client_id).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "client {client_id} already has an active team"
            )));
        }

        if !rbt_ids.contains(&primary_rbt_id) {
            return Err(AppError::Validation(
                "primary rbt must be included in the member list".to_string(),
            ));
        }

        let mut warnings = HashMap::new();
        for &rbt_id in &rbt_ids {
            let rbt = self
                .rbts
                .find_by_id(rbt_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("rbt {rbt_id} not found")))?;
            if !rbt.active {
                return Err(AppError::Conflict(format!("rbt {rbt_id} is not active")));
            }
            let missing = rbt.has_qualifications(required_qualifications);
            if !missing.is_empty() {
                warnings.insert(rbt_id, missing);
            }
        }

        let team = self
            .teams
            .create(client_id, rbt_ids, primary_rbt_id, effective_date)
            .await?;

        self.events
            .append(
                EventType::TeamCreated,
                None,
                None,
                Some(client_id),
                None,
                Some(serde_json::to_value(&team).unwrap_or(serde_json::Value::Null)),
                Some("team assigned".to_string()),
                actor,
            )
            .await?;

        Ok(TeamAssignmentResult {
            team,
            qualification_warnings: warnings,
        })
    }

    pub async fn add_rbt(&self, team_id: Uuid, rbt_id: Uuid, actor: Uuid) -> Result<Team, AppError> {
        let before = self.teams.find_by_id(team_id).await?;
        let team = self.teams.add_rbt(team_id, rbt_id).await?;
        self.events
            .append(
                EventType::RbtAdded,
                None,
                Some(rbt_id),
                Some(team.client_id),
                before.and_then(|t| serde_json::to_value(t).ok()),
                serde_json::to_value(&team).ok(),
                Some("rbt added to team".to_string()),
                actor,
            )
            .await?;
        Ok(team)
    }

    pub async fn remove_rbt(&self, team_id: Uuid, rbt_id: Uuid, actor: Uuid) -> Result<Team, AppError> {
        let before = self.teams.find_by_id(team_id).await?;
        let team = self.teams.remove_rbt(team_id, rbt_id).await?;
        self.events
            .append(
                EventType::RbtRemoved,
                None,
                Some(rbt_id),
                Some(team.client_id),
                before.and_then(|t| serde_json::to_value(t).ok()),
                serde_json::to_value(&team).ok(),
                Some("rbt removed from team".to_string()),
                actor,
            )
            .await?;
        Ok(team)
    }

    pub async fn change_primary_rbt(
        &self,
        team_id: Uuid,
        rbt_id: Uuid,
        actor: Uuid,
    ) -> Result<Team, AppError> {
        let before = self.teams.find_by_id(team_id).await?;
        let team = self.teams.change_primary_rbt(team_id, rbt_id).await?;
        self.events
            .append(
                EventType::PrimaryChanged,
                None,
                Some(rbt_id),
                Some(team.client_id),
                before.and_then(|t| serde_json::to_value(t).ok()),
                serde_json::to_value(&team).ok(),
                Some("primary rbt changed".to_string()),
                actor,
            )
            .await?;
        Ok(team)
    }

    /// Idempotent: ending an already-ended team just returns it unchanged.
    pub async fn end_team(
        &self,
        team_id: Uuid,
        end_date: DateTime<Utc>,
        actor: Uuid,
    ) -> Result<Team, AppError> {
        let team = self
            .teams
            .find_by_id(team_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("team {team_id} not found")))?;
        if !team.active {
            return Ok(team);
        }

        let ended = self.teams.end_team(team_id, end_date).await?;
        self.events
            .append(
                EventType::TeamEnded,
                None,
                None,
                Some(ended.client_id),
                serde_json::to_value(&team).ok(),
                serde_json::to_value(&ended).ok(),
                Some("team ended".to_string()),
                actor,
            )
            .await?;
        Ok(ended)
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}
