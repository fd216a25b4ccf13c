use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use aba_common::{AppError, Clock};
use aba_database::{
    AvailabilityRepository, EventType, RbtRepository, Session, SessionPatch, SessionRepository,
    SessionStatus, Team, TeamRepository,
};

use crate::availability_cache::AvailabilityCache;
use crate::business_calendar::BusinessCalendar;
use crate::config::ReassignmentStrategyConfig;
use crate::constraint_engine::{CandidateSession, ConstraintEngine, SchedulingConstraints, SchedulingContext};
use crate::continuity_scorer::ContinuityScorer;
use crate::event_log::EventLog;
use crate::models::{ProcessUnavailabilityRequest, ReassignmentStatus, SessionReassignmentResult, UnavailabilityOutcome};
use crate::updates::{ScheduleUpdate, UpdatePublisher, UpdateType};

/// Hourly search bands scanned when a straight reassignment at the original
/// time fails and the strategy allows moving the time (spec §4.9).
const SEARCH_HOURS: [u32; 3] = [9, 13, 16];

/// Handles an RBT going unavailable: flags affected sessions and, when
/// requested, reassigns them to another team member at the same time or,
/// failing that, a nearby business day (spec §4.9).
#[derive(Clone)]
pub struct UnavailabilityService {
    sessions: Arc<dyn SessionRepository>,
    teams: Arc<dyn TeamRepository>,
    rbts: Arc<dyn RbtRepository>,
    availability: Arc<dyn AvailabilityRepository>,
    cache: AvailabilityCache,
    events: EventLog,
    publisher: Arc<dyn UpdatePublisher>,
    engine: ConstraintEngine,
    scorer: ContinuityScorer,
    calendar: BusinessCalendar,
    constraints: SchedulingConstraints,
    reassignment: ReassignmentStrategyConfig,
    clock: Arc<dyn Clock>,
}

impl UnavailabilityService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        teams: Arc<dyn TeamRepository>,
        rbts: Arc<dyn RbtRepository>,
        availability: Arc<dyn AvailabilityRepository>,
        cache: AvailabilityCache,
        events: EventLog,
        publisher: Arc<dyn UpdatePublisher>,
        scorer: ContinuityScorer,
        calendar: BusinessCalendar,
        constraints: SchedulingConstraints,
        reassignment: ReassignmentStrategyConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            teams,
            rbts,
            availability,
            cache,
            events,
            publisher,
            engine: ConstraintEngine::new(),
            scorer,
            calendar,
            constraints,
            reassignment,
            clock,
        }
    }

    pub async fn process_rbt_unavailability(
        &self,
        request: ProcessUnavailabilityRequest,
        actor: Uuid,
    ) -> Result<UnavailabilityOutcome, AppError> {
        let rbt = self
            .rbts
            .find_by_id(request.rbt_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("rbt {} not found", request.rbt_id)))?;
        if !rbt.active {
            return Err(AppError::Conflict(format!("rbt {} is not active", request.rbt_id)));
        }

        let affected: Vec<Session> = self
            .sessions
            .find_by_rbt_id(request.rbt_id)
            .await?
            .into_iter()
            .filter(|s| matches!(s.status, SessionStatus::Scheduled | SessionStatus::Confirmed))
            .filter(|s| s.overlaps(request.start_date, request.end_date))
            .collect();

        self.events
            .append(
                EventType::RbtUnavailable,
                None,
                Some(request.rbt_id),
                None,
                None,
                serde_json::to_value(&affected).ok(),
                Some(request.reason.clone()),
                actor,
            )
            .await?;

        let mut reassignments = Vec::new();
        if request.auto_reassign {
            for session in &affected {
                reassignments.push(self.reassign_session(session, request.rbt_id, actor).await?);
            }
        }

        Ok(UnavailabilityOutcome {
            affected_sessions: affected,
            reassignments,
        })
    }

    async fn reassign_session(
        &self,
        session: &Session,
        unavailable_rbt_id: Uuid,
        actor: Uuid,
    ) -> Result<SessionReassignmentResult, AppError> {
        let Some(team) = self.teams.find_active_by_client_id(session.client_id).await? else {
            return Ok(failed(session.session_id, "client has no active team"));
        };

        let client_sessions = self
            .sessions
            .find_by_client_id(session.client_id)
            .await?
            .into_iter()
            .filter(|s| s.session_id != session.session_id)
            .collect::<Vec<_>>();

        let candidates = self.active_candidates(&team, unavailable_rbt_id).await?;

        if let Some((rbt_id, score)) = self
            .best_candidate_at(
                &team,
                &candidates,
                &client_sessions,
                session.session_id,
                session.client_id,
                session.start_time,
                session.end_time,
            )
            .await?
        {
            return self
                .apply_reassignment(session, rbt_id, session.start_time, session.end_time, score, actor)
                .await;
        }

        if !self.reassignment.allow_time_changes {
            return Ok(failed(
                session.session_id,
                "no other team member is free at the original time",
            ));
        }

        let now = self.clock.now();
        for day_offset in 1..=self.reassignment.max_days_to_reschedule as i64 {
            let date = (now + Duration::days(day_offset)).date_naive();
            let probe = date.and_hms_opt(12, 0, 0).unwrap().and_utc();
            if !self.calendar.is_business_day(probe) {
                continue;
            }

            for hour in SEARCH_HOURS {
                let Some(start) = date.and_hms_opt(hour, 0, 0).and_then(|n| n.and_local_timezone(Utc).single())
                else {
                    continue;
                };
                let end = start + self.constraints.session_duration;

                if let Some((rbt_id, score)) = self
                    .best_candidate_at(
                        &team,
                        &candidates,
                        &client_sessions,
                        session.session_id,
                        session.client_id,
                        start,
                        end,
                    )
                    .await?
                {
                    return self
                        .apply_reassignment(session, rbt_id, start, end, score, actor)
                        .await;
                }
            }
        }

        Ok(failed(
            session.session_id,
            "no viable reassignment found within the reschedule window",
        ))
    }

    /// Team members except the unavailable RBT, filtered to currently
    /// active employment (spec §4.9's "candidate pool ... filter to
    /// actives").
    async fn active_candidates(&self, team: &Team, unavailable_rbt_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let mut candidates = Vec::new();
        for &rbt_id in &team.rbt_ids {
            if rbt_id == unavailable_rbt_id {
                continue;
            }
            if let Some(rbt) = self.rbts.find_by_id(rbt_id).await? {
                if rbt.active {
                    candidates.push(rbt_id);
                }
            }
        }
        Ok(candidates)
    }

    /// Ranks `candidates` at `[start, end]` through the constraint engine and
    /// continuity scorer, returning the best valid choice if any.
    #[allow(clippy::too_many_arguments)]
    async fn best_candidate_at(
        &self,
        team: &Team,
        candidates: &[Uuid],
        client_sessions: &[Session],
        exclude_session_id: Uuid,
        client_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Option<(Uuid, u8)>, AppError> {
        let mut sessions_by_rbt = HashMap::new();
        let mut availability_by_rbt = HashMap::new();
        for &rbt_id in candidates {
            sessions_by_rbt.insert(rbt_id, self.sessions.find_by_rbt_id(rbt_id).await?);
            availability_by_rbt.insert(rbt_id, self.availability.find_by_rbt(rbt_id).await?);
        }

        let context = SchedulingContext {
            team: Some(team.clone()),
            sessions_by_rbt,
            client_sessions: client_sessions.to_vec(),
            availability_by_rbt,
            now: self.clock.now(),
            exclude_session_id: Some(exclude_session_id),
        };

        let valid: Vec<Uuid> = candidates
            .iter()
            .copied()
            .filter(|&rbt_id| {
                let candidate = CandidateSession {
                    client_id,
                    rbt_id,
                    start,
                    end,
                    location: String::new(),
                };
                self.engine
                    .validate(&candidate, &context, &self.constraints, 0)
                    .valid
            })
            .collect();

        Ok(self
            .scorer
            .select(&valid, team, client_sessions, self.clock.now())
            .map(|selection| (selection.chosen_rbt_id, selection.score)))
    }

    async fn apply_reassignment(
        &self,
        session: &Session,
        new_rbt_id: Uuid,
        new_start: DateTime<Utc>,
        new_end: DateTime<Utc>,
        continuity_score: u8,
        actor: Uuid,
    ) -> Result<SessionReassignmentResult, AppError> {
        let patch = SessionPatch {
            start_time: Some(new_start),
            end_time: Some(new_end),
            rbt_id: Some(new_rbt_id),
            updated_by: actor,
            ..Default::default()
        };
        let updated = self.sessions.update(session.session_id, patch).await?;

        self.cache
            .invalidate_for_mutation(
                session.client_id,
                session.rbt_id,
                None,
                session.start_time,
                session.end_time,
            )
            .await;
        self.cache
            .invalidate_for_mutation(session.client_id, new_rbt_id, None, new_start, new_end)
            .await;

        self.events
            .append(
                EventType::SessionRescheduled,
                Some(session.session_id),
                Some(new_rbt_id),
                Some(session.client_id),
                serde_json::to_value(session).ok(),
                serde_json::to_value(&updated).ok(),
                Some("reassigned after rbt unavailability".to_string()),
                actor,
            )
            .await?;

        self.publisher
            .publish(ScheduleUpdate {
                update_type: UpdateType::SessionRescheduled,
                session_id: Some(session.session_id),
                client_id: Some(session.client_id),
                rbt_id: Some(new_rbt_id),
                data: serde_json::to_value(&updated).unwrap_or(Value::Null),
                timestamp: self.clock.now(),
            })
            .await?;

        Ok(SessionReassignmentResult {
            session_id: session.session_id,
            status: ReassignmentStatus::Successful,
            new_rbt_id: Some(new_rbt_id),
            new_start: Some(new_start),
            new_end: Some(new_end),
            reason: Some("reassigned to another team member".to_string()),
            error_message: None,
            continuity_score: Some(continuity_score),
        })
    }
}

fn failed(session_id: Uuid, message: &str) -> SessionReassignmentResult {
    SessionReassignmentResult {
        session_id,
        status: ReassignmentStatus::Failed,
        new_rbt_id: None,
        new_start: None,
        new_end: None,
        reason: None,
        error_message: Some(message.to_string()),
        continuity_score: None,
    }
}
