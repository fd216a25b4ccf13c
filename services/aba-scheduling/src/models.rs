use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use aba_common::ConstraintViolation;
use aba_database::Session;

use crate::constraint_engine::ValidationResult;
use crate::continuity_scorer::RbtSelectionResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityTier {
    Preferred,
    Available,
    Possible,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeSlot {
    pub rbt_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub continuity_score: u8,
    pub tier: AvailabilityTier,
}

/// Structured failure shape every mutator returns instead of raising
/// (spec §7: `{ message, violations?, conflicts?, alternatives? }`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OperationFailure {
    pub message: String,
    pub violations: Vec<ConstraintViolation>,
    pub conflicts: Vec<Session>,
    pub alternatives: Vec<AlternativeSlot>,
}

impl OperationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_violations(mut self, violations: Vec<ConstraintViolation>) -> Self {
        self.violations = violations;
        self
    }

    pub fn with_alternatives(mut self, alternatives: Vec<AlternativeSlot>) -> Self {
        self.alternatives = alternatives;
        self
    }

    pub fn with_conflicts(mut self, conflicts: Vec<Session>) -> Self {
        self.conflicts = conflicts;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingSuccess {
    pub session: Session,
    pub validation: ValidationResult,
    pub selection: Option<RbtSelectionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SchedulingOutcome {
    Success(SchedulingSuccess),
    Failure(OperationFailure),
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScheduleSessionRequest {
    pub client_id: Uuid,
    pub rbt_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    /// Informational only per the duration Open Question resolution; the
    /// engine always checks the fixed `session_duration` constraint.
    pub duration_minutes: Option<i64>,
    #[validate(length(min = 1, max = 200))]
    pub location: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub allow_alternatives: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreferredTime {
    pub day_of_week: i16,
    pub time: NaiveTime,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkScheduleRequest {
    pub client_id: Uuid,
    pub rbt_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub preferred_times: Vec<PreferredTime>,
    pub sessions_per_week: u32,
    #[validate(length(min = 1, max = 200))]
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkScheduleFailure {
    pub date: NaiveDate,
    pub reason: String,
    pub conflicts: Vec<Session>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkScheduleResult {
    pub scheduled: Vec<Session>,
    pub failures: Vec<BulkScheduleFailure>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleSessionRequest {
    pub new_start_time: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelSessionRequest {
    pub reason: String,
    #[serde(default)]
    pub find_alternatives: bool,
    pub max_alternatives: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Opportunity {
    pub client_id: Uuid,
    pub rbt_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub continuity_score: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancellationOutcome {
    pub session: Session,
    pub opportunities: Vec<Opportunity>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CancellationStats {
    pub total: u64,
    pub by_reason: std::collections::HashMap<String, u64>,
    pub by_rbt: std::collections::HashMap<Uuid, u64>,
    pub average_notice_hours: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProcessUnavailabilityRequest {
    pub rbt_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub reason: String,
    pub unavailability_type: String,
    #[serde(default)]
    pub auto_reassign: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReassignmentStatus {
    Successful,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionReassignmentResult {
    pub session_id: Uuid,
    pub status: ReassignmentStatus,
    pub new_rbt_id: Option<Uuid>,
    pub new_start: Option<DateTime<Utc>>,
    pub new_end: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub error_message: Option<String>,
    pub continuity_score: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnavailabilityOutcome {
    pub affected_sessions: Vec<Session>,
    pub reassignments: Vec<SessionReassignmentResult>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ReschedulingPreferences {
    pub preferred_times: Option<Vec<DateTime<Utc>>>,
    #[serde(default)]
    pub allow_different_rbt: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReschedulingConstraints {
    pub max_days_from_original: i64,
}

impl Default for ReschedulingConstraints {
    fn default() -> Self {
        Self {
            max_days_from_original: 7,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RescheduleImpactRequest {
    pub new_start: DateTime<Utc>,
    #[serde(default)]
    pub new_rbt_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescheduleOption {
    pub rank: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub rbt_id: Uuid,
    pub optimization_score: f64,
    pub continuity_score: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationMetrics {
    pub total_options_evaluated: u32,
    pub considered_constraints: u32,
    pub search_space_size: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub options: Vec<RescheduleOption>,
    pub metrics: OptimizationMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactAnalysis {
    pub affected_sessions: u32,
    pub cascading_changes: u32,
    pub notification_count: u32,
    pub continuity_disruption: u8,
    pub operational_complexity: u8,
}
