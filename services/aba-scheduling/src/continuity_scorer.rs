use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use aba_database::{Session, Team};

/// One candidate considered by `ContinuityScorer::select`, kept for
/// auditability (spec §4.5, "Emits an RBTSelectionResult ... runner-ups").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub rbt_id: Uuid,
    pub score: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbtSelectionResult {
    pub chosen_rbt_id: Uuid,
    pub score: u8,
    pub runner_ups: Vec<RankedCandidate>,
}

/// Ranks (rbt, client) pairs by continuity of care from completed session
/// history (spec §4.5). Pure and deterministic: the same history and team
/// always produce the same score, and score is monotone non-decreasing as
/// completed sessions accrue (spec §8).
#[derive(Debug, Clone, Copy)]
pub struct ContinuityScorer {
    recency_window: Duration,
}

impl ContinuityScorer {
    pub fn new(recency_window_days: i64) -> Self {
        Self {
            recency_window: Duration::days(recency_window_days),
        }
    }

    /// Score 0..100. Zero iff the rbt has never served this client
    /// (spec §4.5: "0 if the RBT has never served the client") — the
    /// primary-team bonus only applies once there is at least one
    /// completed session together, so an untouched pair can still be
    /// chosen on the tie-break alone without inflating its raw score.
    pub fn score(&self, rbt_id: Uuid, team: &Team, client_history: &[Session], now: DateTime<Utc>) -> u8 {
        let served: Vec<&Session> = client_history
            .iter()
            .filter(|s| s.rbt_id == rbt_id && s.status == aba_database::SessionStatus::Completed)
            .collect();

        if served.is_empty() {
            return 0;
        }

        let total = served.len() as u32;
        let total_points = (total.min(20) * 3).min(60);

        let recent = served
            .iter()
            .filter(|s| now.signed_duration_since(s.start_time) <= self.recency_window)
            .count() as u32;
        let recency_points = (recent.min(10) * 3).min(30);

        let primary_bonus = if team.primary_rbt_id == rbt_id { 10 } else { 0 };

        (total_points + recency_points + primary_bonus).min(100) as u8
    }

    /// Picks the best of an already-available candidate pool (spec §4.5).
    /// Ties break by (primary flag, lexicographic rbt id) so the result is
    /// reproducible across runs given the same inputs.
    pub fn select(
        &self,
        candidates: &[Uuid],
        team: &Team,
        client_history: &[Session],
        now: DateTime<Utc>,
    ) -> Option<RbtSelectionResult> {
        if candidates.is_empty() {
            return None;
        }

        let mut ranked: Vec<RankedCandidate> = candidates
            .iter()
            .map(|&rbt_id| RankedCandidate {
                rbt_id,
                score: self.score(rbt_id, team, client_history, now),
            })
            .collect();

        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then_with(|| {
                    let a_primary = a.rbt_id == team.primary_rbt_id;
                    let b_primary = b.rbt_id == team.primary_rbt_id;
                    b_primary.cmp(&a_primary)
                })
                .then_with(|| a.rbt_id.cmp(&b.rbt_id))
        });

        let chosen = ranked.remove(0);
        Some(RbtSelectionResult {
            chosen_rbt_id: chosen.rbt_id,
            score: chosen.score,
            runner_ups: ranked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aba_database::SessionStatus;
    use chrono::TimeZone;

    fn team(rbt_ids: Vec<Uuid>, primary: Uuid) -> Team {
        Team {
            team_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            rbt_ids,
            primary_rbt_id: primary,
            effective_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            end_date: None,
            active: true,
            created_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            updated_at: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn completed_session(rbt_id: Uuid, client_id: Uuid, start: DateTime<Utc>) -> Session {
        Session {
            session_id: Uuid::new_v4(),
            client_id,
            rbt_id,
            start_time: start,
            end_time: start + Duration::hours(3),
            status: SessionStatus::Completed,
            location: "Clinic".to_string(),
            notes: None,
            cancellation_reason: None,
            completion_notes: None,
            created_by: Uuid::new_v4(),
            updated_by: Uuid::new_v4(),
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn no_history_scores_zero_regardless_of_primary() {
        let rbt_a = Uuid::new_v4();
        let scorer = ContinuityScorer::new(30);
        let team = team(vec![rbt_a], rbt_a);
        let score = scorer.score(rbt_a, &team, &[], Utc::now());
        assert_eq!(score, 0);
    }

    #[test]
    fn tie_breaks_to_the_primary_rbt_when_both_have_no_history() {
        let rbt_a = Uuid::new_v4();
        let rbt_b = Uuid::new_v4();
        let team = team(vec![rbt_a, rbt_b], rbt_a);
        let scorer = ContinuityScorer::new(30);
        let result = scorer
            .select(&[rbt_a, rbt_b], &team, &[], Utc::now())
            .unwrap();
        assert_eq!(result.chosen_rbt_id, rbt_a);
    }

    #[test]
    fn loyal_rbt_is_chosen_over_a_stranger() {
        let client_id = Uuid::new_v4();
        let rbt_a = Uuid::new_v4();
        let rbt_b = Uuid::new_v4();
        let team = team(vec![rbt_a, rbt_b], rbt_a);
        let now = Utc::now();
        let history: Vec<Session> = (0..10)
            .map(|i| completed_session(rbt_b, client_id, now - Duration::days(i * 7)))
            .collect();
        let scorer = ContinuityScorer::new(30);
        let result = scorer
            .select(&[rbt_a, rbt_b], &team, &history, now)
            .unwrap();
        assert_eq!(result.chosen_rbt_id, rbt_b);
    }

    proptest::proptest! {
        #[test]
        fn adding_a_completed_session_never_decreases_the_score(existing_count in 0u32..15) {
            let rbt_id = Uuid::new_v4();
            let client_id = Uuid::new_v4();
            let team = team(vec![rbt_id], rbt_id);
            let now = Utc::now();
            let scorer = ContinuityScorer::new(30);

            let mut history: Vec<Session> = (0..existing_count)
                .map(|i| completed_session(rbt_id, client_id, now - Duration::days(i as i64)))
                .collect();
            let before = scorer.score(rbt_id, &team, &history, now);

            history.push(completed_session(rbt_id, client_id, now));
            let after = scorer.score(rbt_id, &team, &history, now);

            prop_assert!(after >= before);
        }
    }
}
