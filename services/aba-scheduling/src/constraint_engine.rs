use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use aba_common::{ConstraintViolation, ViolationType};
use aba_database::{AvailabilitySlot, Session, Team};

use crate::config::{BusinessHoursConfig, SchedulingPolicyConfig};

/// A not-yet-persisted placement under evaluation (spec §4.4).
///
/// Timestamps are treated as facility-local: this deployment runs in one
/// fixed time zone and the teacher's stack carries no `chrono-tz`/IANA
/// dependency, so "local" reduces to the `DateTime<Utc>` wall-clock value.
#[derive(Debug, Clone)]
pub struct CandidateSession {
    pub client_id: Uuid,
    pub rbt_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub location: String,
}

/// Everything the engine needs to judge one candidate, assembled by
/// `SchedulingService` from the Persistence Ports (spec §4.2/§4.4).
#[derive(Debug, Clone, Default)]
pub struct SchedulingContext {
    pub team: Option<Team>,
    pub sessions_by_rbt: HashMap<Uuid, Vec<Session>>,
    pub client_sessions: Vec<Session>,
    pub availability_by_rbt: HashMap<Uuid, Vec<AvailabilitySlot>>,
    pub now: DateTime<Utc>,
    /// The session being moved, excluded from its own conflict checks
    /// (reschedule, spec §4.7.4).
    pub exclude_session_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct SchedulingConstraints {
    pub session_duration: Duration,
    pub business_hours: BusinessHoursConfig,
    pub valid_days: Vec<i16>,
    pub max_sessions_per_day: u32,
    pub min_break_between_sessions: Duration,
}

impl SchedulingConstraints {
    pub fn from_policy(policy: &SchedulingPolicyConfig) -> Self {
        Self {
            session_duration: Duration::minutes(policy.session_duration_minutes),
            business_hours: policy.business_hours,
            valid_days: policy.valid_days.clone(),
            max_sessions_per_day: policy.max_sessions_per_day,
            min_break_between_sessions: Duration::minutes(
                policy.min_break_between_sessions_minutes,
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ConstraintViolation>,
    pub score: u8,
}

fn minutes_of_day(instant: DateTime<Utc>) -> u32 {
    instant.hour() * 60 + instant.minute()
}

fn overlaps(a_start: DateTime<Utc>, a_end: DateTime<Utc>, b_start: DateTime<Utc>, b_end: DateTime<Utc>) -> bool {
    a_start < b_end && b_start < a_end
}

fn is_active_session(session: &Session) -> bool {
    !session.status.is_cancelled_or_no_show()
}

/// Deterministic yes/no + score over a candidate session (spec §4.4).
/// Holds no I/O handle — every input arrives by reference, so the same
/// candidate and context always produce the same `ValidationResult`
/// (spec §8, "ConstraintEngine is deterministic").
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstraintEngine;

impl ConstraintEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(
        &self,
        candidate: &CandidateSession,
        context: &SchedulingContext,
        constraints: &SchedulingConstraints,
        continuity_score: u8,
    ) -> ValidationResult {
        let mut violations = Vec::new();

        // 1. duration
        if candidate.end - candidate.start != constraints.session_duration {
            violations.push(ConstraintViolation::new(
                ViolationType::Duration,
                format!(
                    "session duration must be exactly {} minutes",
                    constraints.session_duration.num_minutes()
                ),
            ));
        }

        // 2. business hours
        let start_minutes = minutes_of_day(candidate.start);
        let end_minutes = if candidate.end.date_naive() == candidate.start.date_naive() {
            minutes_of_day(candidate.end)
        } else {
            // crossed midnight: treat as past the window close.
            24 * 60 + minutes_of_day(candidate.end)
        };
        if start_minutes < constraints.business_hours.start_minutes
            || end_minutes > constraints.business_hours.end_minutes
        {
            violations.push(
                ConstraintViolation::new(
                    ViolationType::BusinessHours,
                    "session falls outside business hours".to_string(),
                )
                .with_resolution(format!(
                    "keep start/end within {:02}:{:02}-{:02}:{:02}",
                    constraints.business_hours.start_minutes / 60,
                    constraints.business_hours.start_minutes % 60,
                    constraints.business_hours.end_minutes / 60,
                    constraints.business_hours.end_minutes % 60
                )),
            );
        }

        // 3. business day
        let weekday = candidate.start.weekday().number_from_monday() as i16;
        if !constraints.valid_days.contains(&weekday) {
            violations.push(ConstraintViolation::new(
                ViolationType::BusinessDay,
                "session does not fall on a configured business day".to_string(),
            ));
        }

        // 4. not in past
        if candidate.start <= context.now {
            violations.push(ConstraintViolation::new(
                ViolationType::NotInPast,
                "cannot be scheduled in the past".to_string(),
            ));
        }

        // 5. team membership
        match &context.team {
            Some(team) if team.active && team.is_member(candidate.rbt_id) => {}
            Some(_) => violations.push(ConstraintViolation::new(
                ViolationType::TeamMembership,
                "rbt is not a current member of the client's active team".to_string(),
            )),
            None => violations.push(ConstraintViolation::new(
                ViolationType::TeamMembership,
                "client has no active team".to_string(),
            )),
        }

        let rbt_sessions: Vec<&Session> = context
            .sessions_by_rbt
            .get(&candidate.rbt_id)
            .into_iter()
            .flatten()
            .filter(|s| is_active_session(s) && Some(s.session_id) != context.exclude_session_id)
            .collect();

        // 6. rbt conflict
        if rbt_sessions
            .iter()
            .any(|s| overlaps(s.start_time, s.end_time, candidate.start, candidate.end))
        {
            violations.push(ConstraintViolation::new(
                ViolationType::RbtConflict,
                "rbt already has a session overlapping this time".to_string(),
            ));
        }

        // 7. client conflict
        if context
            .client_sessions
            .iter()
            .filter(|s| is_active_session(s) && Some(s.session_id) != context.exclude_session_id)
            .any(|s| overlaps(s.start_time, s.end_time, candidate.start, candidate.end))
        {
            violations.push(ConstraintViolation::new(
                ViolationType::ClientConflict,
                "client already has a session overlapping this time".to_string(),
            ));
        }

        // 8. rbt availability
        let fits_availability = context
            .availability_by_rbt
            .get(&candidate.rbt_id)
            .into_iter()
            .flatten()
            .filter(|slot| slot.active && slot.day_of_week == weekday)
            .filter(|slot| {
                slot.effective_date.date_naive() <= candidate.start.date_naive()
                    && slot
                        .end_date
                        .map(|d| d.date_naive() >= candidate.start.date_naive())
                        .unwrap_or(true)
            })
            .any(|slot| {
                slot.start_time <= candidate.start.time() && slot.end_time >= candidate.end.time()
            });
        if !fits_availability {
            violations.push(ConstraintViolation::new(
                ViolationType::RbtAvailability,
                "session does not fit within any active availability slot".to_string(),
            ));
        }

        // 9. daily cap
        let date = candidate.start.date_naive();
        let same_day_count = rbt_sessions
            .iter()
            .filter(|s| s.start_time.date_naive() == date)
            .count() as u32;
        if same_day_count >= constraints.max_sessions_per_day {
            violations.push(ConstraintViolation::new(
                ViolationType::DailyCap,
                format!(
                    "rbt already has {same_day_count} session(s) on this date, at or above the daily cap"
                ),
            ));
        }

        // 10. rest gap
        let min_break = constraints.min_break_between_sessions;
        let violates_rest_gap = rbt_sessions
            .iter()
            .filter(|s| s.start_time.date_naive() == date)
            .any(|s| {
                let gap_after = candidate.start - s.end_time;
                let gap_before = s.start_time - candidate.end;
                (gap_after >= Duration::zero() && gap_after < min_break)
                    || (gap_before >= Duration::zero() && gap_before < min_break)
            });
        if violates_rest_gap {
            violations.push(ConstraintViolation::new(
                ViolationType::RestGap,
                format!(
                    "gap to an adjacent session is below the required {} minute break",
                    min_break.num_minutes()
                ),
            ));
        }

        let valid = violations.is_empty();
        let score = self.score(&violations, valid, continuity_score, candidate, constraints);

        ValidationResult {
            valid,
            violations,
            score,
        }
    }

    fn score(
        &self,
        violations: &[ConstraintViolation],
        valid: bool,
        continuity_score: u8,
        candidate: &CandidateSession,
        constraints: &SchedulingConstraints,
    ) -> u8 {
        if !valid {
            let penalty = (violations.len() as i32) * 15;
            return (100 - penalty).clamp(0, 100) as u8;
        }

        let window_start = constraints.business_hours.start_minutes as i64;
        let window_end = constraints.business_hours.end_minutes as i64;
        let midpoint = (window_start + window_end) / 2;
        let start_minutes = minutes_of_day(candidate.start) as i64;
        let half_span = ((window_end - window_start) / 2).max(1);
        let distance_from_center = (start_minutes - midpoint).unsigned_abs() as i64;
        let centrality_bonus = (10 - (distance_from_center * 10 / half_span)).clamp(0, 10);

        let continuity_bonus = (continuity_score as i64 * 10) / 100;

        (90 + centrality_bonus + continuity_bonus).clamp(0, 100) as u8
    }

    /// Enumerates every team member's availability window on `date` in
    /// 30-minute increments and filters through rules 1-10 (spec §4.4).
    pub fn find_available_time_slots(
        &self,
        client_id: Uuid,
        date: NaiveDate,
        team_member_ids: &[Uuid],
        context: &SchedulingContext,
        constraints: &SchedulingConstraints,
    ) -> HashMap<Uuid, Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let mut result: HashMap<Uuid, Vec<(DateTime<Utc>, DateTime<Utc>)>> = HashMap::new();

        for &rbt_id in team_member_ids {
            let Some(slots) = context.availability_by_rbt.get(&rbt_id) else {
                continue;
            };
            let weekday = date.weekday().number_from_monday() as i16;
            let mut candidates = Vec::new();
            for slot in slots.iter().filter(|s| s.active && s.day_of_week == weekday) {
                let mut cursor = slot.start_time;
                while cursor + constraints.session_duration <= slot.end_time {
                    let Some(start) = date.and_time(cursor).and_local_timezone(Utc).single() else {
                        break;
                    };
                    let end = start + constraints.session_duration;
                    candidates.push((start, end));
                    cursor += Duration::minutes(30);
                }
            }

            let mut valid_slots = Vec::new();
            for (start, end) in candidates {
                let candidate = CandidateSession {
                    client_id,
                    rbt_id,
                    start,
                    end,
                    location: String::new(),
                };
                let validation = self.validate(&candidate, context, constraints, 0);
                if validation.valid {
                    valid_slots.push((start, end));
                }
            }

            if !valid_slots.is_empty() {
                result.insert(rbt_id, valid_slots);
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aba_database::SessionStatus;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn constraints() -> SchedulingConstraints {
        SchedulingConstraints {
            session_duration: Duration::hours(3),
            business_hours: BusinessHoursConfig {
                start_minutes: 540,
                end_minutes: 1140,
            },
            valid_days: vec![1, 2, 3, 4, 5],
            max_sessions_per_day: 2,
            min_break_between_sessions: Duration::minutes(30),
        }
    }

    fn active_team(client_id: Uuid, rbt_id: Uuid) -> Team {
        Team {
            team_id: Uuid::new_v4(),
            client_id,
            rbt_ids: vec![rbt_id],
            primary_rbt_id: rbt_id,
            effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            active: true,
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn base_context(client_id: Uuid, rbt_id: Uuid, now: DateTime<Utc>) -> SchedulingContext {
        let slot = AvailabilitySlot {
            slot_id: Uuid::new_v4(),
            rbt_id,
            day_of_week: 1,
            start_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
            recurring: true,
            effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            active: true,
        };
        let mut availability_by_rbt = HashMap::new();
        availability_by_rbt.insert(rbt_id, vec![slot]);

        SchedulingContext {
            team: Some(active_team(client_id, rbt_id)),
            sessions_by_rbt: HashMap::new(),
            client_sessions: Vec::new(),
            availability_by_rbt,
            now,
            exclude_session_id: None,
        }
    }

    fn monday_10am() -> DateTime<Utc> {
        // 2026-08-03 is a Monday.
        Utc.with_ymd_and_hms(2026, 8, 3, 10, 0, 0).unwrap()
    }

    #[test]
    fn a_valid_placement_passes_with_no_violations() {
        let client_id = Uuid::new_v4();
        let rbt_id = Uuid::new_v4();
        let now = monday_10am() - Duration::days(1);
        let context = base_context(client_id, rbt_id, now);
        let candidate = CandidateSession {
            client_id,
            rbt_id,
            start: monday_10am(),
            end: monday_10am() + Duration::hours(3),
            location: "Clinic A".to_string(),
        };

        let result = ConstraintEngine::new().validate(&candidate, &context, &constraints(), 0);
        assert!(result.valid, "{:?}", result.violations);
        assert!(result.score > 0);
    }

    #[test]
    fn boundary_nine_am_start_noon_end_passes_eight_fifty_nine_fails() {
        let client_id = Uuid::new_v4();
        let rbt_id = Uuid::new_v4();
        let now = monday_10am() - Duration::days(1);
        let context = base_context(client_id, rbt_id, now);
        let engine = ConstraintEngine::new();
        let c = constraints();

        let nine = CandidateSession {
            client_id,
            rbt_id,
            start: monday_10am().date_naive().and_hms_opt(9, 0, 0).unwrap().and_utc(),
            end: monday_10am().date_naive().and_hms_opt(12, 0, 0).unwrap().and_utc(),
            location: "x".to_string(),
        };
        assert!(engine.validate(&nine, &context, &c, 0).valid);

        let late = CandidateSession {
            client_id,
            rbt_id,
            start: monday_10am().date_naive().and_hms_opt(8, 59, 0).unwrap().and_utc(),
            end: monday_10am().date_naive().and_hms_opt(11, 59, 0).unwrap().and_utc(),
            location: "x".to_string(),
        };
        let result = engine.validate(&late, &context, &c, 0);
        assert!(!result.valid);
        assert!(result
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::BusinessHours));
    }

    #[test]
    fn saturday_fails_business_day() {
        let client_id = Uuid::new_v4();
        let rbt_id = Uuid::new_v4();
        let saturday = Utc.with_ymd_and_hms(2026, 8, 8, 10, 0, 0).unwrap();
        let now = saturday - Duration::days(1);
        let context = base_context(client_id, rbt_id, now);
        let candidate = CandidateSession {
            client_id,
            rbt_id,
            start: saturday,
            end: saturday + Duration::hours(3),
            location: "x".to_string(),
        };
        let result = ConstraintEngine::new().validate(&candidate, &context, &constraints(), 0);
        assert!(!result.valid);
        assert!(result
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::BusinessDay));
    }

    #[test]
    fn thirty_minute_gap_passes_twenty_nine_minutes_fails() {
        let client_id = Uuid::new_v4();
        let rbt_id = Uuid::new_v4();
        let now = monday_10am() - Duration::days(1);
        let mut context = base_context(client_id, rbt_id, now);
        let existing = Session {
            session_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            rbt_id,
            start_time: monday_10am(),
            end_time: monday_10am() + Duration::hours(3),
            status: SessionStatus::Scheduled,
            location: "x".to_string(),
            notes: None,
            cancellation_reason: None,
            completion_notes: None,
            created_by: Uuid::new_v4(),
            updated_by: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
        };
        context
            .sessions_by_rbt
            .insert(rbt_id, vec![existing.clone()]);

        let engine = ConstraintEngine::new();
        let c = constraints();

        let thirty_min_gap = CandidateSession {
            client_id,
            rbt_id,
            start: existing.end_time + Duration::minutes(30),
            end: existing.end_time + Duration::minutes(30) + Duration::hours(3),
            location: "x".to_string(),
        };
        let result = engine.validate(&thirty_min_gap, &context, &c, 0);
        assert!(!result
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::RestGap));

        let twenty_nine_min_gap = CandidateSession {
            client_id,
            rbt_id,
            start: existing.end_time + Duration::minutes(29),
            end: existing.end_time + Duration::minutes(29) + Duration::hours(3),
            location: "x".to_string(),
        };
        let result = engine.validate(&twenty_nine_min_gap, &context, &c, 0);
        assert!(result
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::RestGap));
    }

    #[test]
    fn validation_is_deterministic() {
        let client_id = Uuid::new_v4();
        let rbt_id = Uuid::new_v4();
        let now = monday_10am() - Duration::days(1);
        let context = base_context(client_id, rbt_id, now);
        let candidate = CandidateSession {
            client_id,
            rbt_id,
            start: monday_10am(),
            end: monday_10am() + Duration::hours(3),
            location: "Clinic A".to_string(),
        };
        let engine = ConstraintEngine::new();
        let first = engine.validate(&candidate, &context, &constraints(), 42);
        let second = engine.validate(&candidate, &context, &constraints(), 42);
        assert_eq!(first.valid, second.valid);
        assert_eq!(first.score, second.score);
        assert_eq!(
            first.violations.iter().map(|v| v.violation_type.clone()).collect::<Vec<_>>(),
            second.violations.iter().map(|v| v.violation_type.clone()).collect::<Vec<_>>()
        );
    }

    proptest::proptest! {
        #[test]
        fn duration_violation_iff_not_exactly_three_hours(minutes in 1i64..400) {
            let client_id = Uuid::new_v4();
            let rbt_id = Uuid::new_v4();
            let now = monday_10am() - Duration::days(1);
            let context = base_context(client_id, rbt_id, now);
            let candidate = CandidateSession {
                client_id,
                rbt_id,
                start: monday_10am(),
                end: monday_10am() + Duration::minutes(minutes),
                location: "x".to_string(),
            };
            let result = ConstraintEngine::new().validate(&candidate, &context, &constraints(), 0);
            let has_duration_violation = result
                .violations
                .iter()
                .any(|v| v.violation_type == ViolationType::Duration);
            prop_assert_eq!(has_duration_violation, minutes != 180);
        }
    }
}
