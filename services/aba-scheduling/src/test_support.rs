//! In-memory fakes for the Persistence Ports, shared by the service test
//! modules. Never compiled outside `#[cfg(test)]`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use aba_common::{AppError, CacheClient, RedisConfig};
use aba_database::{
    AvailabilityRepository, AvailabilitySlot, Client, ClientRepository, EventLogFilter,
    EventLogRepository, NewScheduleEvent, Rbt, RbtRepository, ScheduleEvent, Session,
    SessionPatch, SessionRepository, Team, TeamRepository,
};

use crate::availability_cache::AvailabilityCache;
use crate::config::CacheTtlConfig;
use crate::updates::{ScheduleUpdate, UpdatePublisher};

#[derive(Default)]
pub struct MockTeamRepository {
    pub teams: Mutex<HashMap<Uuid, Team>>,
}

impl MockTeamRepository {
    pub fn with(team: Team) -> Self {
        let mut teams = HashMap::new();
        teams.insert(team.team_id, team);
        Self {
            teams: Mutex::new(teams),
        }
    }
}

#[async_trait]
impl TeamRepository for MockTeamRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Team>, AppError> {
        Ok(self.teams.lock().unwrap().get(&id).cloned())
    }

    async fn find_active_by_client_id(&self, client_id: Uuid) -> Result<Option<Team>, AppError> {
        Ok(self
            .teams
            .lock()
            .unwrap()
            .values()
            .find(|t| t.client_id == client_id && t.active)
            .cloned())
    }

    async fn find_by_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Team>, AppError> {
        Ok(self
            .teams
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.is_member(rbt_id))
            .cloned()
            .collect())
    }

    async fn find_by_primary_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Team>, AppError> {
        Ok(self
            .teams
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.primary_rbt_id == rbt_id)
            .cloned()
            .collect())
    }

    async fn create(
        &self,
        client_id: Uuid,
        rbt_ids: Vec<Uuid>,
        primary_rbt_id: Uuid,
        effective_date: DateTime<Utc>,
    ) -> Result<Team, AppError> {
        let team = Team {
            team_id: Uuid::new_v4(),
            client_id,
            rbt_ids,
            primary_rbt_id,
            effective_date,
            end_date: None,
            active: true,
            created_at: effective_date,
            updated_at: effective_date,
        };
        self.teams.lock().unwrap().insert(team.team_id, team.clone());
        Ok(team)
    }

    async fn update(&self, team: Team) -> Result<Team, AppError> {
        self.teams.lock().unwrap().insert(team.team_id, team.clone());
        Ok(team)
    }

    async fn end_team(&self, team_id: Uuid, end_date: DateTime<Utc>) -> Result<Team, AppError> {
        let mut teams = self.teams.lock().unwrap();
        let team = teams
            .get_mut(&team_id)
            .ok_or_else(|| AppError::NotFound(format!("team {team_id} not found")))?;
        team.end_date = Some(end_date);
        team.active = false;
        Ok(team.clone())
    }

    async fn add_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError> {
        let mut teams = self.teams.lock().unwrap();
        let team = teams
            .get_mut(&team_id)
            .ok_or_else(|| AppError::NotFound(format!("team {team_id} not found")))?;
        if !team.rbt_ids.contains(&rbt_id) {
            team.rbt_ids.push(rbt_id);
        }
        Ok(team.clone())
    }

    async fn remove_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError> {
        let mut teams = self.teams.lock().unwrap();
        let team = teams
            .get_mut(&team_id)
            .ok_or_else(|| AppError::NotFound(format!("team {team_id} not found")))?;
        team.rbt_ids.retain(|&id| id != rbt_id);
        Ok(team.clone())
    }

    async fn change_primary_rbt(&self, team_id: Uuid, rbt_id: Uuid) -> Result<Team, AppError> {
        let mut teams = self.teams.lock().unwrap();
        let team = teams
            .get_mut(&team_id)
            .ok_or_else(|| AppError::NotFound(format!("team {team_id} not found")))?;
        team.primary_rbt_id = rbt_id;
        Ok(team.clone())
    }
}

#[derive(Default)]
pub struct MockRbtRepository {
    pub rbts: Mutex<HashMap<Uuid, Rbt>>,
}

impl MockRbtRepository {
    pub fn with(rbts: Vec<Rbt>) -> Self {
        Self {
            rbts: Mutex::new(rbts.into_iter().map(|r| (r.user_id, r)).collect()),
        }
    }
}

#[async_trait]
impl RbtRepository for MockRbtRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Rbt>, AppError> {
        Ok(self.rbts.lock().unwrap().get(&id).cloned())
    }

    async fn find_active(&self) -> Result<Vec<Rbt>, AppError> {
        Ok(self
            .rbts
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.active)
            .cloned()
            .collect())
    }

    async fn find_by_qualification(&self, qualification: &str) -> Result<Vec<Rbt>, AppError> {
        Ok(self
            .rbts
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.qualifications.iter().any(|q| q == qualification))
            .cloned()
            .collect())
    }

    async fn find_available_for_time_slot(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
        exclude_ids: &[Uuid],
    ) -> Result<Vec<Rbt>, AppError> {
        Ok(self
            .rbts
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.active && !exclude_ids.contains(&r.user_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockClientRepository {
    pub clients: Mutex<HashMap<Uuid, Client>>,
}

impl MockClientRepository {
    pub fn with(client: Client) -> Self {
        let mut clients = HashMap::new();
        clients.insert(client.user_id, client);
        Self {
            clients: Mutex::new(clients),
        }
    }
}

#[async_trait]
impl ClientRepository for MockClientRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Client>, AppError> {
        Ok(self.clients.lock().unwrap().get(&id).cloned())
    }
}

#[derive(Default)]
pub struct MockEventLogRepository {
    pub events: Mutex<Vec<ScheduleEvent>>,
}

#[async_trait]
impl EventLogRepository for MockEventLogRepository {
    async fn append(&self, event: NewScheduleEvent) -> Result<ScheduleEvent, AppError> {
        let stored = ScheduleEvent {
            event_id: event.event_id,
            event_type: event.event_type,
            session_id: event.session_id,
            rbt_id: event.rbt_id,
            client_id: event.client_id,
            old_values: event.old_values,
            new_values: event.new_values,
            reason: event.reason,
            metadata: event.metadata,
            created_by: event.created_by,
            created_at: event.created_at,
        };
        self.events.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn query(&self, filter: EventLogFilter) -> Result<Vec<ScheduleEvent>, AppError> {
        Ok(self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| filter.event_type.map_or(true, |t| t == e.event_type))
            .filter(|e| filter.session_id.map_or(true, |id| Some(id) == e.session_id))
            .filter(|e| filter.rbt_id.map_or(true, |id| Some(id) == e.rbt_id))
            .filter(|e| filter.client_id.map_or(true, |id| Some(id) == e.client_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockSessionRepository {
    pub sessions: Mutex<HashMap<Uuid, Session>>,
}

impl MockSessionRepository {
    pub fn with(sessions: Vec<Session>) -> Self {
        Self {
            sessions: Mutex::new(sessions.into_iter().map(|s| (s.session_id, s)).collect()),
        }
    }
}

#[async_trait]
impl SessionRepository for MockSessionRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        Ok(self.sessions.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_client_id(&self, client_id: Uuid) -> Result<Vec<Session>, AppError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn find_by_rbt_id(&self, rbt_id: Uuid) -> Result<Vec<Session>, AppError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.rbt_id == rbt_id)
            .cloned()
            .collect())
    }

    async fn find_active_by_date_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Session>, AppError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| !s.status.is_cancelled_or_no_show() && s.overlaps(start, end))
            .cloned()
            .collect())
    }

    async fn create_checking_conflicts(&self, session: Session) -> Result<Session, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        let conflict = sessions.values().any(|s| {
            !s.status.is_cancelled_or_no_show()
                && (s.rbt_id == session.rbt_id || s.client_id == session.client_id)
                && s.overlaps(session.start_time, session.end_time)
        });
        if conflict {
            return Err(AppError::Conflict(
                "rbt or client already has a session overlapping this time".to_string(),
            ));
        }
        sessions.insert(session.session_id, session.clone());
        Ok(session)
    }

    async fn update(&self, id: Uuid, patch: SessionPatch) -> Result<Session, AppError> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?;
        if let Some(start) = patch.start_time {
            session.start_time = start;
        }
        if let Some(end) = patch.end_time {
            session.end_time = end;
        }
        if let Some(rbt_id) = patch.rbt_id {
            session.rbt_id = rbt_id;
        }
        if let Some(status) = patch.status {
            session.status = status;
        }
        if patch.notes.is_some() {
            session.notes = patch.notes;
        }
        if patch.cancellation_reason.is_some() {
            session.cancellation_reason = patch.cancellation_reason;
        }
        if patch.completion_notes.is_some() {
            session.completion_notes = patch.completion_notes;
        }
        session.updated_by = patch.updated_by;
        Ok(session.clone())
    }

    async fn check_conflicts(
        &self,
        client_id: Uuid,
        rbt_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude_session_id: Option<Uuid>,
    ) -> Result<Vec<Session>, AppError> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| {
                !s.status.is_cancelled_or_no_show()
                    && (s.rbt_id == rbt_id || s.client_id == client_id)
                    && s.overlaps(start, end)
                    && Some(s.session_id) != exclude_session_id
            })
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MockAvailabilityRepository {
    pub slots: Mutex<HashMap<Uuid, Vec<AvailabilitySlot>>>,
}

impl MockAvailabilityRepository {
    pub fn with(slots: HashMap<Uuid, Vec<AvailabilitySlot>>) -> Self {
        Self {
            slots: Mutex::new(slots),
        }
    }
}

#[async_trait]
impl AvailabilityRepository for MockAvailabilityRepository {
    async fn find_by_rbt(&self, rbt_id: Uuid) -> Result<Vec<AvailabilitySlot>, AppError> {
        Ok(self.slots.lock().unwrap().get(&rbt_id).cloned().unwrap_or_default())
    }
}

/// Records every publish rather than sending it anywhere; assertions just
/// check the log rather than a real subscriber.
#[derive(Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<ScheduleUpdate>>,
}

#[async_trait]
impl UpdatePublisher for RecordingPublisher {
    async fn publish(&self, update: ScheduleUpdate) -> Result<(), AppError> {
        self.published.lock().unwrap().push(update);
        Ok(())
    }
}

/// Builds a real `AvailabilityCache` against `REDIS_URL` when set, mirroring
/// `aba-common`'s own cache test precedent; returns `None` to skip the test
/// on machines without a redis instance available.
pub async fn cache_or_skip(ttl: CacheTtlConfig) -> Option<AvailabilityCache> {
    let url = std::env::var("REDIS_URL").ok()?;
    let config = RedisConfig {
        host: url,
        port: 6379,
        password: None,
        database: 0,
    };
    let client = CacheClient::connect(&config).await.ok()?;
    Some(AvailabilityCache::new(client, ttl))
}

pub fn default_ttl() -> CacheTtlConfig {
    CacheTtlConfig {
        schedule_minutes: 30,
        availability_minutes: 5,
        rbt_daily_minutes: 30,
    }
}
