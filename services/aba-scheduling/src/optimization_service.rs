use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Datelike, Duration, Timelike, Utc};
use uuid::Uuid;

use aba_common::{AppError, Clock};
use aba_database::{AvailabilityRepository, SessionRepository, SessionStatus, TeamRepository};

use crate::business_calendar::BusinessCalendar;
use crate::constraint_engine::{CandidateSession, ConstraintEngine, SchedulingConstraints, SchedulingContext};
use crate::continuity_scorer::ContinuityScorer;
use crate::models::{
    ImpactAnalysis, OptimizationMetrics, OptimizationResult, RescheduleOption, ReschedulingConstraints,
    ReschedulingPreferences,
};

const SLOT_STEP_MINUTES: i64 = 30;
const NUMBER_OF_CONSTRAINT_RULES: u32 = 10;
const TOP_OPTIONS: usize = 10;

/// Ranked rescheduling search and disruption estimation (spec §4.10): unlike
/// `ConstraintEngine::validate`'s binary accept/reject, this layers a
/// weighted optimization score on top to rank multiple valid candidates.
#[derive(Clone)]
pub struct OptimizationService {
    sessions: Arc<dyn SessionRepository>,
    teams: Arc<dyn TeamRepository>,
    availability: Arc<dyn AvailabilityRepository>,
    engine: ConstraintEngine,
    scorer: ContinuityScorer,
    calendar: BusinessCalendar,
    constraints: SchedulingConstraints,
    clock: Arc<dyn Clock>,
}

impl OptimizationService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        teams: Arc<dyn TeamRepository>,
        availability: Arc<dyn AvailabilityRepository>,
        scorer: ContinuityScorer,
        calendar: BusinessCalendar,
        constraints: SchedulingConstraints,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            sessions,
            teams,
            availability,
            engine: ConstraintEngine::new(),
            scorer,
            calendar,
            constraints,
            clock,
        }
    }

    pub async fn find_optimal_rescheduling_options(
        &self,
        session_id: Uuid,
        preferences: ReschedulingPreferences,
        constraints: ReschedulingConstraints,
    ) -> Result<OptimizationResult, AppError> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;

        let team = self
            .teams
            .find_active_by_client_id(session.client_id)
            .await?
            .ok_or_else(|| AppError::Conflict(format!("client {} has no active team", session.client_id)))?;

        let candidate_rbts: Vec<Uuid> = if preferences.allow_different_rbt {
            team.rbt_ids.clone()
        } else {
            vec![session.rbt_id]
        };

        let client_sessions: Vec<_> = self
            .sessions
            .find_by_client_id(session.client_id)
            .await?
            .into_iter()
            .filter(|s| s.session_id != session_id)
            .collect();

        let mut sessions_by_rbt = HashMap::new();
        let mut availability_by_rbt = HashMap::new();
        for &rbt_id in &candidate_rbts {
            sessions_by_rbt.insert(rbt_id, self.sessions.find_by_rbt_id(rbt_id).await?);
            availability_by_rbt.insert(rbt_id, self.availability.find_by_rbt(rbt_id).await?);
        }

        let now = self.clock.now();
        let context = SchedulingContext {
            team: Some(team.clone()),
            sessions_by_rbt,
            client_sessions: client_sessions.clone(),
            availability_by_rbt,
            now,
            exclude_session_id: Some(session_id),
        };

        let max_days = constraints.max_days_from_original.max(1);
        let business_start = self.constraints.business_hours.start_minutes as i64;
        let business_end = self.constraints.business_hours.end_minutes as i64;
        let slot_count = ((business_end - business_start) / SLOT_STEP_MINUTES).max(1);

        let original_minutes = (session.start_time.hour() * 60 + session.start_time.minute()) as i64;
        let max_minute_span = (business_end - business_start).max(1) as f64;

        let mut total_evaluated = 0u32;
        let mut candidates = Vec::new();

        for day_offset in 0..=max_days {
            let date = (session.start_time + Duration::days(day_offset)).date_naive();
            let probe = date.and_hms_opt(12, 0, 0).unwrap().and_utc();
            if !self.calendar.is_business_day(probe) {
                continue;
            }

            for step in 0..slot_count {
                let minute_of_day = business_start + step * SLOT_STEP_MINUTES;
                let Some(start) = date
                    .and_hms_opt((minute_of_day / 60) as u32, (minute_of_day % 60) as u32, 0)
                    .and_then(|n| n.and_local_timezone(Utc).single())
                else {
                    continue;
                };
                let end = start + self.constraints.session_duration;

                if let Some(preferred) = &preferences.preferred_times {
                    if !preferred.is_empty() && !preferred.iter().any(|p| (p.signed_duration_since(start)).num_minutes().abs() < 30) {
                        continue;
                    }
                }

                for &rbt_id in &candidate_rbts {
                    total_evaluated += 1;
                    let candidate = CandidateSession {
                        client_id: session.client_id,
                        rbt_id,
                        start,
                        end,
                        location: session.location.clone(),
                    };
                    let validation = self.engine.validate(&candidate, &context, &self.constraints, 0);
                    if !validation.valid {
                        continue;
                    }

                    let continuity_score = self.scorer.score(rbt_id, &team, &client_sessions, now);
                    let time_proximity =
                        1.0 - ((minute_of_day - original_minutes).unsigned_abs() as f64 / max_minute_span).min(1.0);
                    let day_proximity = 1.0 - (day_offset as f64 / max_days as f64);
                    let slot_centrality = {
                        let midpoint = (business_start + business_end) / 2;
                        let half_span = ((business_end - business_start) / 2).max(1) as f64;
                        1.0 - ((minute_of_day - midpoint).unsigned_abs() as f64 / half_span).min(1.0)
                    };

                    let optimization_score = 0.45 * (continuity_score as f64 / 100.0)
                        + 0.25 * time_proximity
                        + 0.20 * day_proximity
                        + 0.10 * slot_centrality;

                    candidates.push(RescheduleOption {
                        rank: 0,
                        start,
                        end,
                        rbt_id,
                        optimization_score,
                        continuity_score,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.optimization_score
                .partial_cmp(&a.optimization_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(TOP_OPTIONS);
        for (index, option) in candidates.iter_mut().enumerate() {
            option.rank = (index + 1) as u32;
        }

        let search_space_size = ((max_days + 1) * slot_count * candidate_rbts.len() as i64).max(0) as u32;

        Ok(OptimizationResult {
            options: candidates,
            metrics: OptimizationMetrics {
                total_options_evaluated: total_evaluated,
                considered_constraints: NUMBER_OF_CONSTRAINT_RULES,
                search_space_size,
            },
        })
    }

    /// Evaluates the impact of a specific proposed reschedule (spec §4.10:
    /// `analyzeReschedulingImpact(sessionId, newStart, newRbtId?)`), not an
    /// auto-selected alternate: `continuity_disruption` is 0 whenever
    /// `new_rbt_id` is absent or equal to the session's current RBT.
    pub async fn analyze_rescheduling_impact(
        &self,
        session_id: Uuid,
        new_start: DateTime<Utc>,
        new_rbt_id: Option<Uuid>,
    ) -> Result<ImpactAnalysis, AppError> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;

        let team = self.teams.find_active_by_client_id(session.client_id).await?;
        let now = self.clock.now();
        let proposed_rbt_id = new_rbt_id.unwrap_or(session.rbt_id);
        let needs_different_rbt = new_rbt_id.map_or(false, |id| id != session.rbt_id);

        let rbt_cohort = self
            .sessions
            .find_by_rbt_id(proposed_rbt_id)
            .await?
            .into_iter()
            .filter(|s| {
                s.session_id != session_id
                    && !s.status.is_cancelled_or_no_show()
                    && s.start_time.date_naive() == new_start.date_naive()
            })
            .count() as u32;

        let client_history = self
            .sessions
            .find_by_client_id(session.client_id)
            .await?
            .into_iter()
            .filter(|s| s.session_id != session_id && s.status == SessionStatus::Completed)
            .collect::<Vec<_>>();

        let continuity_disruption = if needs_different_rbt {
            match &team {
                Some(team) => {
                    let current_score = self.scorer.score(session.rbt_id, team, &client_history, now);
                    let proposed_score = self.scorer.score(proposed_rbt_id, team, &client_history, now);
                    current_score.saturating_sub(proposed_score)
                }
                None => 0,
            }
        } else {
            0
        };

        let cascading_changes = rbt_cohort;
        let notification_count = rbt_cohort + 1;
        let operational_complexity = ((rbt_cohort as u32 * 15) + if needs_different_rbt { 25 } else { 0 })
            .min(100) as u8;

        Ok(ImpactAnalysis {
            affected_sessions: rbt_cohort,
            cascading_changes,
            notification_count,
            continuity_disruption,
            operational_complexity,
        })
    }
}

#[cfg(test)]
mod tests {
    use aba_common::FixedClock;
    use aba_database::{AvailabilitySlot, Session, Team};
    use chrono::{DateTime, TimeZone};

    use crate::config::{BusinessHoursConfig, SchedulingPolicyConfig};
    use crate::test_support::{self, MockAvailabilityRepository, MockSessionRepository, MockTeamRepository};

    use super::*;

    fn monday_10am() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap()
    }

    fn policy() -> SchedulingPolicyConfig {
        SchedulingPolicyConfig {
            business_hours: BusinessHoursConfig {
                start_minutes: 540,
                end_minutes: 1140,
            },
            valid_days: vec![1, 2, 3, 4, 5],
            session_duration_minutes: 180,
            max_sessions_per_day: 2,
            min_break_between_sessions_minutes: 30,
            continuity_recency_window_days: 30,
            reassignment: crate::config::ReassignmentStrategyConfig {
                prioritize_team_members: true,
                maintain_continuity: true,
                allow_time_changes: false,
                max_days_to_reschedule: 7,
                notification_lead_time_hours: 2,
            },
            cache_ttl: test_support::default_ttl(),
        }
    }

    fn slot_for(rbt_id: Uuid) -> AvailabilitySlot {
        AvailabilitySlot {
            slot_id: Uuid::new_v4(),
            rbt_id,
            day_of_week: 1,
            start_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            recurring: true,
            effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            active: true,
        }
    }

    fn session(client_id: Uuid, rbt_id: Uuid, start: DateTime<Utc>) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            client_id,
            rbt_id,
            start_time: start,
            end_time: start + Duration::hours(3),
            status: SessionStatus::Scheduled,
            location: "Clinic A".to_string(),
            notes: None,
            cancellation_reason: None,
            completion_notes: None,
            created_by: Uuid::new_v4(),
            updated_by: Uuid::new_v4(),
            created_at: start,
            updated_at: start,
        }
    }

    fn service(team: Team, sessions: Vec<Session>, availability: HashMap<Uuid, Vec<AvailabilitySlot>>) -> OptimizationService {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(monday_10am() - Duration::days(1)));
        let policy = policy();
        OptimizationService::new(
            Arc::new(MockSessionRepository::with(sessions)),
            Arc::new(MockTeamRepository::with(team)),
            Arc::new(MockAvailabilityRepository::with(availability)),
            ContinuityScorer::new(30),
            BusinessCalendar::new(clock.clone(), policy.clone()),
            SchedulingConstraints::from_policy(&policy),
            clock,
        )
    }

    #[tokio::test]
    async fn optimal_rescheduling_options_rank_the_free_slot_first_and_report_the_search_space() {
        let client_id = Uuid::new_v4();
        let rbt_id = Uuid::new_v4();
        let team = Team {
            team_id: Uuid::new_v4(),
            client_id,
            rbt_ids: vec![rbt_id],
            primary_rbt_id: rbt_id,
            effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            active: true,
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        };
        let session = session(client_id, rbt_id, monday_10am());
        let session_id = session.session_id;
        let mut availability = HashMap::new();
        availability.insert(rbt_id, vec![slot_for(rbt_id)]);

        let service = service(team, vec![session], availability);

        let result = service
            .find_optimal_rescheduling_options(
                session_id,
                ReschedulingPreferences::default(),
                ReschedulingConstraints::default(),
            )
            .await
            .unwrap();

        assert!(!result.options.is_empty());
        assert_eq!(result.options[0].rank, 1);
        assert!(result.options.windows(2).all(|w| w[0].optimization_score >= w[1].optimization_score));
        assert!(result.metrics.search_space_size > 0);
        assert_eq!(result.metrics.considered_constraints, NUMBER_OF_CONSTRAINT_RULES);
    }

    #[tokio::test]
    async fn impact_analysis_counts_same_day_cohort_sessions_and_adds_one_notification() {
        let client_id = Uuid::new_v4();
        let rbt_id = Uuid::new_v4();
        let team = Team {
            team_id: Uuid::new_v4(),
            client_id,
            rbt_ids: vec![rbt_id],
            primary_rbt_id: rbt_id,
            effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            active: true,
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        };
        let target = session(client_id, rbt_id, monday_10am());
        let target_id = target.session_id;
        let other_client = Uuid::new_v4();
        let same_day_other_session = session(other_client, rbt_id, monday_10am() + Duration::hours(4));

        let service = service(team, vec![target, same_day_other_session], HashMap::new());

        let impact = service
            .analyze_rescheduling_impact(target_id, monday_10am(), None)
            .await
            .unwrap();

        assert_eq!(impact.affected_sessions, 1);
        assert_eq!(impact.cascading_changes, 1);
        assert_eq!(impact.notification_count, 2);
        assert_eq!(impact.continuity_disruption, 0);
    }

    #[tokio::test]
    async fn impact_analysis_scores_continuity_disruption_against_the_proposed_rbt() {
        let client_id = Uuid::new_v4();
        let current_rbt = Uuid::new_v4();
        let proposed_rbt = Uuid::new_v4();
        let team = Team {
            team_id: Uuid::new_v4(),
            client_id,
            rbt_ids: vec![current_rbt, proposed_rbt],
            primary_rbt_id: current_rbt,
            effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            active: true,
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        };
        let target = session(client_id, current_rbt, monday_10am());
        let target_id = target.session_id;
        let mut completed = session(client_id, current_rbt, monday_10am() - Duration::days(7));
        completed.status = SessionStatus::Completed;

        let service = service(team, vec![target, completed], HashMap::new());

        let unchanged = service
            .analyze_rescheduling_impact(target_id, monday_10am(), Some(current_rbt))
            .await
            .unwrap();
        assert_eq!(unchanged.continuity_disruption, 0);

        let changed = service
            .analyze_rescheduling_impact(target_id, monday_10am(), Some(proposed_rbt))
            .await
            .unwrap();
        assert!(changed.continuity_disruption > 0);
    }
}
