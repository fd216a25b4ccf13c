use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// Base `User` row (spec §3). RBT and client profiles are specializations
/// joined in by `user_id`, mirroring the teacher's `User`/`MentorProfile`/
/// `MenteeProfile` split.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub user_id: Uuid,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub phone: Option<String>,
    pub role: String,
    pub active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RbtProfileRow {
    pub user_id: Uuid,
    pub license_number: String,
    pub qualifications: Vec<String>,
    pub hourly_rate_cents: i64,
    pub hire_date: DateTime<Utc>,
    pub termination_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClientProfileRow {
    pub user_id: Uuid,
    pub date_of_birth: DateTime<Utc>,
    pub guardian_contact: String,
    pub special_needs: Vec<String>,
    pub enrollment_date: DateTime<Utc>,
    pub discharge_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TeamRow {
    pub team_id: Uuid,
    pub client_id: Uuid,
    pub rbt_ids: Vec<Uuid>,
    pub primary_rbt_id: Uuid,
    pub effective_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AvailabilitySlotRow {
    pub slot_id: Uuid,
    pub rbt_id: Uuid,
    pub day_of_week: i16,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub recurring: bool,
    pub effective_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub client_id: Uuid,
    pub rbt_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub location: String,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
    pub completion_notes: Option<String>,
    pub created_by: Uuid,
    pub updated_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScheduleEventRow {
    pub event_id: Uuid,
    pub event_type: String,
    pub session_id: Option<Uuid>,
    pub rbt_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub old_values: Option<Value>,
    pub new_values: Option<Value>,
    pub reason: Option<String>,
    pub metadata: Option<Value>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}
